//! Layout inheritance: Extend and Block resolution.
//!
//! One hop of inheritance takes the blocks defined by a descendant and
//! applies them to its layout:
//!
//! - placeholders (`{{Block "name"/}}`) receive the descendant body verbatim;
//! - paired blocks the descendant overrides take the descendant body, with
//!   a Super marker spliced with the layout's own content;
//! - paired blocks nobody overrides keep the layout content.
//!
//! If the layout itself extends another one, overridden blocks are re-emitted
//! as paired blocks so the next hop can harvest them. In the terminal layout
//! they become references to block definitions instead.

use std::collections::HashMap;

use crate::compose::include::expand_includes;
use crate::compose::{block_template_name, reference, BlockSet, SubTemplatePool};
use crate::context::RenderContext;
use crate::loader::Loader;
use crate::scanner::TagMatch;

/// Maximum number of Extend hops followed for one document.
pub const MAX_EXTEND_DEPTH: usize = 10;

/// Adds every paired block of `content` to `blocks`, include-expanded.
pub fn harvest_blocks(
    loader: &Loader,
    ctx: &dyn RenderContext,
    content: &str,
    pool: &mut SubTemplatePool,
    blocks: &mut BlockSet,
) {
    for block in loader.scanner().blocks(content) {
        let body = expand_includes(loader, ctx, &block.body, pool);
        blocks.insert(block.name, body);
    }
}

/// Applies `blocks` to one layout.
///
/// Returns the rewritten layout and its own Extend directive, if any. On
/// return `blocks` only holds names the layout actually defines (plus the
/// `name.N` entries created for repeated blocks).
pub fn apply_layout(
    loader: &Loader,
    ctx: &dyn RenderContext,
    layout: &str,
    blocks: &mut BlockSet,
    pass_object: Option<&str>,
    pool: &mut SubTemplatePool,
) -> (String, Option<TagMatch>) {
    let scanner = loader.scanner();
    let next = scanner.extend(layout);
    let has_parent = next.is_some();

    let mut content =
        scanner.replace_placeholders(layout, |name| blocks.get(name).cloned().unwrap_or_default());

    // Occurrence counter per block name; also the set of names that survive.
    let mut seen: HashMap<String, usize> = HashMap::new();
    // Descendant bodies that carry a Super marker, before any splicing.
    let mut with_super: HashMap<String, String> = HashMap::new();

    for block in scanner.blocks(&content) {
        let Some(mut body) = blocks.get(&block.name).cloned() else {
            if !has_parent {
                content = content.replacen(&block.raw, &block.body, 1);
            }
            continue;
        };

        let suffix = match seen.get_mut(&block.name) {
            Some(count) => {
                *count += 1;
                format!(".{}", count)
            }
            None => {
                seen.insert(block.name.clone(), 0);
                String::new()
            }
        };

        let original = match with_super.get(&block.name) {
            Some(original) => Some(original.clone()),
            None if scanner.has_super(&body) => {
                with_super.insert(block.name.clone(), body.clone());
                Some(body.clone())
            }
            None => None,
        };
        if let Some(original) = original {
            let ancestor = expand_includes(loader, ctx, &block.body, pool);
            body = scanner.replace_super(&original, &ancestor);
            if suffix.is_empty() {
                blocks.insert(block.name.clone(), body.clone());
            }
        }

        let bound = format!("{}{}", block.name, suffix);
        if !suffix.is_empty() {
            blocks.insert(bound.clone(), body.clone());
            seen.insert(bound.clone(), 0);
        }

        let replacement = if has_parent {
            scanner.paired_block(&block.name, &body)
        } else {
            reference(&block_template_name(&bound), pass_object)
        };
        content = content.replacen(&block.raw, &replacement, 1);
    }

    blocks.retain(|name, _| seen.contains_key(name));
    (content, next)
}
