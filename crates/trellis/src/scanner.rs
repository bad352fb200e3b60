//! Directive recognition.
//!
//! [`TagScanner`] turns a [`Syntax`] into the set of regular expressions that
//! find composition directives in raw markup. Matching is textual: the
//! scanner never looks inside the evaluator's own expressions, and argument
//! text after a directive keyword is treated as opaque.
//!
//! With the default syntax the recognized forms are:
//!
//! | Directive | Form |
//! |-----------|------|
//! | Include | `{{Include "path"}}`, `{{Include "path" expr}}` |
//! | Function | `{{Function "name"}}`, `{{Function "name" args}}` |
//! | Extend | `{{Extend "layout"}}` at the very start of a document |
//! | Block | `{{Block "name"}}body{{/Block}}` |
//! | Placeholder | `{{Block "name"/}}` |
//! | Super | `{{Super}}` or `{{Super/}}` inside a block body |
//! | Strip | `{{Strip}}body{{/Strip}}` |
//!
//! Delimiters and keywords are escaped before they are spliced into patterns,
//! so any literal text can be used for either.

use regex::{Captures, NoExpand, Regex};

use crate::config::Syntax;
use crate::error::RenderError;

/// Which call-style directive produced a [`TagMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Include,
    Function,
    Extend,
}

/// One occurrence of a call-style directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch {
    pub kind: TagKind,
    /// The quoted argument (template path or function name).
    pub argument: String,
    /// Optional trailing text, forwarded as-is.
    pub pass_object: Option<String>,
    /// The full directive text as it appears in the source.
    pub raw: String,
}

/// One paired `Block` definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMatch {
    pub name: String,
    pub body: String,
    pub raw: String,
}

/// Compiled directive patterns for one [`Syntax`].
#[derive(Debug, Clone)]
pub struct TagScanner {
    syntax: Syntax,
    include: Regex,
    function: Regex,
    extend: Regex,
    block: Regex,
    placeholder: Regex,
    super_marker: Option<Regex>,
    strip: Regex,
    inner_blank: Regex,
}

impl TagScanner {
    /// Builds every pattern from `syntax`.
    pub fn new(syntax: &Syntax) -> Result<Self, RenderError> {
        syntax.validate()?;
        let l = regex::escape(&syntax.delim_left);
        let r = regex::escape(&syntax.delim_right);
        let r_first = syntax
            .delim_right
            .chars()
            .next()
            .map(|c| regex::escape(&c.to_string()))
            .unwrap_or_default();
        let call = |keyword: &str| {
            format!(
                r#"{l}{kw}\s+"([^"]+)"(?:\s+([^{rf}]+?))?\s*/?{r}"#,
                l = l,
                kw = regex::escape(keyword),
                rf = r_first,
                r = r,
            )
        };
        let block_kw = regex::escape(&syntax.block_tag);
        let strip_kw = regex::escape(&syntax.strip_tag);

        let super_marker = if syntax.super_tag.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(
                r"{l}{kw}\s*/?{r}",
                kw = regex::escape(&syntax.super_tag)
            ))?)
        };

        Ok(Self {
            include: Regex::new(&call(&syntax.include_tag))?,
            function: Regex::new(&call(&syntax.function_tag))?,
            extend: Regex::new(&format!(r"\A\s*{}", call(&syntax.extend_tag)))?,
            block: Regex::new(&format!(
                r#"(?s){l}{block_kw}\s+"([^"]+)"\s*{r}(.*?){l}/{block_kw}{r}"#
            ))?,
            placeholder: Regex::new(&format!(r#"{l}{block_kw}\s+"([^"]+)"\s*/{r}"#))?,
            super_marker,
            strip: Regex::new(&format!(r"(?s){l}{strip_kw}{r}(.*?){l}/{strip_kw}{r}"))?,
            inner_blank: Regex::new(&format!(r"({r}|>)\s{{2,}}({l}|<)"))?,
            syntax: syntax.clone(),
        })
    }

    /// The syntax this scanner was built from.
    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    /// Every Include directive, in source order.
    pub fn includes(&self, src: &str) -> Vec<TagMatch> {
        collect_calls(&self.include, TagKind::Include, src)
    }

    /// Every Function directive, in source order.
    pub fn functions(&self, src: &str) -> Vec<TagMatch> {
        collect_calls(&self.function, TagKind::Function, src)
    }

    /// The Extend directive, if the document starts with one.
    ///
    /// Only a directive at the very start (after optional whitespace) counts;
    /// later Extend-looking text is inert.
    pub fn extend(&self, src: &str) -> Option<TagMatch> {
        self.extend
            .captures(src)
            .map(|caps| call_match(TagKind::Extend, &caps))
    }

    /// Every paired Block definition, in source order.
    pub fn blocks(&self, src: &str) -> Vec<BlockMatch> {
        self.block
            .captures_iter(src)
            .map(|caps| BlockMatch {
                raw: caps[0].to_string(),
                name: caps[1].to_string(),
                body: caps[2].to_string(),
            })
            .collect()
    }

    /// Removes every self-closing Block placeholder.
    pub fn strip_placeholders(&self, src: &str) -> String {
        self.placeholder.replace_all(src, "").into_owned()
    }

    /// Replaces every placeholder with `fill(name)`.
    pub fn replace_placeholders<F>(&self, src: &str, mut fill: F) -> String
    where
        F: FnMut(&str) -> String,
    {
        self.placeholder
            .replace_all(src, |caps: &Captures| fill(&caps[1]))
            .into_owned()
    }

    /// Returns true if `body` contains a Super marker.
    pub fn has_super(&self, body: &str) -> bool {
        self.super_marker
            .as_ref()
            .is_some_and(|re| re.is_match(body))
    }

    /// Replaces the first Super marker in `body` with `ancestor`.
    pub fn replace_super(&self, body: &str, ancestor: &str) -> String {
        match &self.super_marker {
            Some(re) => re.replacen(body, 1, NoExpand(ancestor)).into_owned(),
            None => body.to_string(),
        }
    }

    /// Renders a paired Block definition in this syntax.
    pub fn paired_block(&self, name: &str, body: &str) -> String {
        let s = &self.syntax;
        format!(
            "{l}{kw} \"{name}\"{r}{body}{l}/{kw}{r}",
            l = s.delim_left,
            r = s.delim_right,
            kw = s.block_tag,
        )
    }

    pub(crate) fn strip_pattern(&self) -> &Regex {
        &self.strip
    }

    pub(crate) fn inner_blank_pattern(&self) -> &Regex {
        &self.inner_blank
    }
}

fn collect_calls(re: &Regex, kind: TagKind, src: &str) -> Vec<TagMatch> {
    re.captures_iter(src)
        .map(|caps| call_match(kind, &caps))
        .collect()
}

fn call_match(kind: TagKind, caps: &Captures) -> TagMatch {
    // The extend pattern swallows leading whitespace; keep only the directive.
    let raw = caps[0].trim_start().to_string();
    TagMatch {
        kind,
        argument: caps[1].to_string(),
        pass_object: caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty()),
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> TagScanner {
        TagScanner::new(&Syntax::default()).unwrap()
    }

    #[test]
    fn test_include_forms() {
        let found = scanner().includes(
            r#"<nav>{{Include "partials/nav"}}</nav>{{Include "row" .Item }}{{Include "foot"/}}"#,
        );
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].argument, "partials/nav");
        assert_eq!(found[0].pass_object, None);
        assert_eq!(found[0].raw, r#"{{Include "partials/nav"}}"#);
        assert_eq!(found[1].argument, "row");
        assert_eq!(found[1].pass_object.as_deref(), Some(".Item"));
        assert_eq!(found[2].argument, "foot");
        assert_eq!(found[2].pass_object, None);
    }

    #[test]
    fn test_include_pass_object_before_self_close() {
        let found = scanner().includes(r#"{{Include "row" user /}}"#);
        assert_eq!(found[0].pass_object.as_deref(), Some("user"));
    }

    #[test]
    fn test_function_matches() {
        let found = scanner().functions(r#"a {{Function "menu" main}} b {{Function "year"}}"#);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, TagKind::Function);
        assert_eq!(found[0].argument, "menu");
        assert_eq!(found[0].pass_object.as_deref(), Some("main"));
        assert_eq!(found[1].pass_object, None);
    }

    #[test]
    fn test_extend_anchored_at_start() {
        let s = scanner();
        let found = s.extend("\n  {{Extend \"layout\"}}{{Extend \"other\"}}").unwrap();
        assert_eq!(found.argument, "layout");
        assert_eq!(found.raw, r#"{{Extend "layout"}}"#);

        assert!(s.extend("<p>{{Extend \"layout\"}}</p>").is_none());
    }

    #[test]
    fn test_blocks_are_non_greedy_and_multiline() {
        let found = scanner().blocks(
            "{{Block \"a\"}}one\ntwo{{/Block}} mid {{Block \"b\" }}three{{/Block}}",
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "a");
        assert_eq!(found[0].body, "one\ntwo");
        assert_eq!(found[1].name, "b");
        assert_eq!(found[1].body, "three");
    }

    #[test]
    fn test_placeholder_is_not_a_block() {
        let s = scanner();
        let src = r#"<div>{{Block "x"/}}</div>{{Block "y" /}}"#;
        assert!(s.blocks(src).is_empty());
        assert_eq!(s.strip_placeholders(src), "<div></div>");
        assert_eq!(
            s.replace_placeholders(src, |name| name.to_uppercase()),
            "<div>X</div>Y"
        );
    }

    #[test]
    fn test_super_forms() {
        let s = scanner();
        assert!(s.has_super("hi {{Super}}!"));
        assert!(s.has_super("hi {{Super/}}!"));
        assert!(!s.has_super("hi {{ super() }}!"));
        assert_eq!(s.replace_super("a{{Super/}}b{{Super}}", "$1"), "a$1b{{Super}}");
    }

    #[test]
    fn test_disabled_super() {
        let s = TagScanner::new(&Syntax {
            super_tag: String::new(),
            ..Syntax::default()
        })
        .unwrap();
        assert!(!s.has_super("{{Super}}"));
        assert_eq!(s.replace_super("{{Super}}", "x"), "{{Super}}");
    }

    #[test]
    fn test_custom_syntax_is_escaped() {
        let syntax = Syntax {
            delim_left: "[%".into(),
            delim_right: "%]".into(),
            include_tag: "inc".into(),
            block_tag: "blk.".into(),
            ..Syntax::default()
        };
        let s = TagScanner::new(&syntax).unwrap();

        assert_eq!(s.includes(r#"[%inc "a"%]"#).len(), 1);
        assert!(s.includes(r#"{{Include "a"}}"#).is_empty());
        assert_eq!(s.blocks(r#"[%blk. "t"%]x[%/blk.%]"#).len(), 1);
        assert!(s.blocks(r#"[%blkX "t"%]x[%/blkX%]"#).is_empty());
        assert_eq!(s.paired_block("t", "x"), r#"[%blk. "t"%]x[%/blk.%]"#);
    }

    #[test]
    fn test_evaluator_expressions_are_ignored() {
        let s = scanner();
        let src = "{{ title }} {% if user %}{{ user.name }}{% endif %}";
        assert!(s.includes(src).is_empty());
        assert!(s.functions(src).is_empty());
        assert!(s.extend(src).is_none());
        assert!(s.blocks(src).is_empty());
    }
}
