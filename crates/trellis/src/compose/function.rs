//! Function clips.
//!
//! `{{Function "name" arg}}` is replaced at compile time with the string
//! returned by the context's `name` callback, called as
//! `callback(template_name, arg)`. Results are memoized per `name:arg` in a
//! [`ClipSet`] that lives for one top-level compile, so a clip used in the
//! page, its layouts and its fragments is computed once.

use crate::compose::ClipSet;
use crate::context::FunctionRegistry;
use crate::scanner::TagScanner;

/// Replaces every Function directive in `body` with its clip.
///
/// An unregistered function yields an empty clip.
pub fn resolve_functions(
    scanner: &TagScanner,
    registry: &dyn FunctionRegistry,
    template_name: &str,
    body: &str,
    clips: &mut ClipSet,
) -> String {
    let mut content = body.to_string();
    for tag in scanner.functions(body) {
        let arg = tag.pass_object.as_deref().unwrap_or_default();
        let key = format!("{}:{}", tag.argument, arg);
        let clip = clips.entry(key).or_insert_with(|| {
            registry
                .lookup(&tag.argument)
                .map(|callback| callback(template_name, arg))
                .unwrap_or_default()
        });
        content = content.replace(&tag.raw, clip);
    }
    content
}
