//! Whitespace compaction for `Strip` regions.
//!
//! Inside `{{Strip}}...{{/Strip}}` the markup is compacted: whitespace runs
//! between tags are removed, runs of blank lines collapse into a single
//! newline and the region is trimmed. `<pre>` elements keep their content
//! byte for byte. Outside Strip regions nothing changes.
//!
//! In debug mode only the Strip tags themselves are removed, so the served
//! markup lines up with the files on disk.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::scanner::TagScanner;

static PRE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<pre[^>]*>.*?</pre>").expect("valid <pre> pattern"));

static BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n(\s*\r?\n)+").expect("valid blank-line pattern"));

const PRE_MARK: char = '\u{0}';

/// Applies Strip handling to `src`.
pub fn compact(scanner: &TagScanner, src: &str, debug: bool) -> String {
    if debug {
        let syntax = scanner.syntax();
        let open = format!(
            "{}{}{}",
            syntax.delim_left, syntax.strip_tag, syntax.delim_right
        );
        let close = format!(
            "{}/{}{}",
            syntax.delim_left, syntax.strip_tag, syntax.delim_right
        );
        return src.replace(&open, "").replace(&close, "");
    }

    scanner
        .strip_pattern()
        .replace_all(src, |caps: &Captures| compact_region(scanner, &caps[1]))
        .into_owned()
}

fn compact_region(scanner: &TagScanner, region: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    let protected = PRE_BLOCK.replace_all(region, |caps: &Captures| {
        kept.push(caps[0].to_string());
        format!("<{PRE_MARK}{}{PRE_MARK}>", kept.len() - 1)
    });

    let squeezed = scanner
        .inner_blank_pattern()
        .replace_all(&protected, "${1}${2}");
    let squeezed = BLANK_LINES.replace_all(&squeezed, "\n");
    let mut out = squeezed.trim().to_string();

    for (i, pre) in kept.iter().enumerate() {
        out = out.replacen(&format!("<{PRE_MARK}{i}{PRE_MARK}>"), pre, 1);
    }
    out
}
