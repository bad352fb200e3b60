//! Include expansion.

use crate::compose::{reference, SubTemplatePool};
use crate::context::RenderContext;
use crate::loader::Loader;

/// Expands every Include directive in `body`.
///
/// Each included path is loaded once per pool: the key is registered with an
/// empty body before its own includes are expanded, so a cycle ends at the
/// first repeated path. Every occurrence of a directive is replaced by a
/// reference to the fragment.
///
/// A fragment that cannot be read replaces the *whole* body being expanded
/// with `RenderTemplate <path> read err: <error>`.
pub fn expand_includes(
    loader: &Loader,
    ctx: &dyn RenderContext,
    body: &str,
    pool: &mut SubTemplatePool,
) -> String {
    let mut content = body.to_string();
    for tag in loader.scanner().includes(body) {
        let path = loader.resolve(ctx, &tag.argument);
        if !pool.contains_key(&path) {
            let raw = match loader.load(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::error!(path = %path, error = %err, "include failed");
                    return format!("RenderTemplate {} read err: {}", path, err);
                }
            };
            pool.insert(path.clone(), String::new());
            let expanded = expand_includes(loader, ctx, &raw, pool);
            pool.insert(path.clone(), expanded);
        }
        content = content.replace(&tag.raw, &reference(&path, tag.pass_object.as_deref()));
    }
    content
}
