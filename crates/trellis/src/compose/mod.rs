//! Composition: turning a page and its layouts into one document.
//!
//! [`compose`] loads a page, walks its Extend chain (at most
//! [`MAX_EXTEND_DEPTH`] hops), applies blocks at every hop and expands
//! includes. The result is a [`Composition`]: the final document plus the
//! fragments and block definitions it references. Function clips are not
//! resolved here; the engine resolves them while compiling so that cached
//! fragments can skip the work.
//!
//! References between the parts use the evaluator's include syntax:
//!
//! ```text
//! {% include "views/partials/nav.html" %}
//! {% with value = user %}{% include "block:card" %}{% endwith %}
//! ```

pub mod extend;
pub mod function;
pub mod include;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::loader::Loader;

pub use extend::{apply_layout, harvest_blocks, MAX_EXTEND_DEPTH};
pub use function::resolve_functions;
pub use include::expand_includes;

/// Included fragment bodies by resolved path. An empty body marks a path
/// whose expansion is in progress.
pub type SubTemplatePool = BTreeMap<String, String>;

/// Block bodies by name.
pub type BlockSet = BTreeMap<String, String>;

/// Function results by `name:argument`.
pub type ClipSet = HashMap<String, String>;

/// Prefix of the evaluator template names used for block definitions.
pub const BLOCK_PREFIX: &str = "block:";

/// A fully composed page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Composition {
    /// Cache key: the resolved path of the page.
    pub key: String,
    /// The page after inheritance and include expansion.
    pub document: String,
    /// Included fragments by resolved path.
    pub fragments: SubTemplatePool,
    /// Block definitions referenced by the document.
    pub blocks: BlockSet,
    /// Resolved layout paths, nearest first.
    pub parents: Vec<String>,
}

/// Composes the page `name`.
///
/// Load failures of the page or of a layout are returned as errors. Missing
/// fragments are reported inline (see [`expand_includes`]).
pub fn compose(
    loader: &Loader,
    ctx: &dyn RenderContext,
    name: &str,
) -> Result<Composition, RenderError> {
    let scanner = loader.scanner();
    let key = loader.resolve(ctx, name);
    let page = loader.load(&key)?;

    let mut pool = SubTemplatePool::new();
    let mut blocks = BlockSet::new();
    let mut parents = Vec::new();

    let mut next = scanner.extend(&page);
    let mut content = scanner.strip_placeholders(&page);

    for _ in 0..MAX_EXTEND_DEPTH {
        let Some(tag) = next.take() else { break };
        harvest_blocks(loader, ctx, &content, &mut pool, &mut blocks);

        let parent = loader.resolve(ctx, &tag.argument);
        let layout = loader.load(&parent)?;
        let (applied, following) = apply_layout(
            loader,
            ctx,
            &layout,
            &mut blocks,
            tag.pass_object.as_deref(),
            &mut pool,
        );
        content = applied;
        next = following;

        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }
    if next.is_some() {
        tracing::warn!(template = %key, "extend chain exceeds {} hops", MAX_EXTEND_DEPTH);
    }

    let document = expand_includes(loader, ctx, &content, &mut pool);
    Ok(Composition {
        key,
        document,
        fragments: pool,
        blocks,
        parents,
    })
}

/// Evaluator template name of the block `name`.
pub fn block_template_name(name: &str) -> String {
    format!("{}{}", BLOCK_PREFIX, name)
}

/// Reference construct that renders template `name` with `pass_object`.
///
/// No pass object, or `.`, keeps the current data context.
pub fn reference(name: &str, pass_object: Option<&str>) -> String {
    let quoted = quote(name);
    match pass_object.map(str::trim) {
        None | Some("") | Some(".") => format!("{{% include {} %}}", quoted),
        Some(expr) => format!(
            "{{% with value = {} %}}{{% include {} %}}{{% endwith %}}",
            expr, quoted
        ),
    }
}

fn quote(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for c in name.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
