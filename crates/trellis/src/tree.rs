//! Compiled trees: composed documents handed to MiniJinja.
//!
//! A [`CompiledTree`] is either a MiniJinja environment holding the page, its
//! fragments and its block definitions, or a literal diagnostic string that
//! renders verbatim. Trees are immutable once built; per-call data and
//! functions are bound at execution time, so one cached tree serves every
//! request.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use trellis::tree::{CompiledTree, TreeBuilder};
//! use trellis::context::FunctionMap;
//!
//! let mut builder = TreeBuilder::new("page.html");
//! builder.block("title", "Hello, {{ name }}").unwrap();
//! builder.document(r#"<h1>{% include "block:title" %}</h1>"#).unwrap();
//! let tree: CompiledTree = builder.finish();
//!
//! let out = tree.execute(&json!({"name": "World"}), FunctionMap::new()).unwrap();
//! assert_eq!(out, "<h1>Hello, World</h1>");
//! assert!(tree.has_block("title"));
//! ```

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

use minijinja::value::Rest;
use minijinja::{default_auto_escape_callback, Environment, Value};

use crate::compose::block_template_name;
use crate::context::FunctionMap;
use crate::error::RenderError;

/// Template-callable helpers bound on every execution.
pub const HAS_BLOCK: &str = "hasBlock";
pub const HAS_ANY_BLOCK: &str = "hasAnyBlock";

#[derive(Debug)]
enum Body {
    Template(Environment<'static>),
    Literal(String),
}

/// An executable page.
#[derive(Debug)]
pub struct CompiledTree {
    name: String,
    blocks: Arc<BTreeSet<String>>,
    body: Body,
}

impl CompiledTree {
    /// A tree that renders `text` and ignores its data.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            blocks: Arc::default(),
            body: Body::Literal(text.into()),
        }
    }

    /// Evaluator name of the page (its cache key). Empty for literals.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.body, Body::Literal(_))
    }

    /// Block names defined for this page.
    pub fn blocks(&self) -> &BTreeSet<String> {
        &self.blocks
    }

    pub fn has_block(&self, name: &str) -> bool {
        self.blocks.contains(name)
    }

    /// Renders the tree to a string.
    pub fn execute(
        &self,
        data: &serde_json::Value,
        funcs: FunctionMap,
    ) -> Result<String, RenderError> {
        match &self.body {
            Body::Literal(text) => Ok(text.clone()),
            Body::Template(env) => {
                let template = env.get_template(&self.name)?;
                Ok(template.render(self.bind(data, funcs))?)
            }
        }
    }

    /// Renders the tree into `writer`.
    pub fn execute_to(
        &self,
        writer: &mut dyn Write,
        data: &serde_json::Value,
        funcs: FunctionMap,
    ) -> Result<(), RenderError> {
        match &self.body {
            Body::Literal(text) => {
                writer.write_all(text.as_bytes())?;
                Ok(())
            }
            Body::Template(env) => {
                let template = env.get_template(&self.name)?;
                template.render_to_write(self.bind(data, funcs), writer)?;
                Ok(())
            }
        }
    }

    /// Builds the evaluator context: data first, then functions over it,
    /// then the block helpers.
    fn bind(&self, data: &serde_json::Value, funcs: FunctionMap) -> FunctionMap {
        let mut combined = FunctionMap::new();
        match data {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    combined.insert(key.clone(), Value::from_serialize(value));
                }
            }
            other => {
                combined.insert("value".to_string(), Value::from_serialize(other));
            }
        }
        combined.extend(funcs);

        let all = Arc::clone(&self.blocks);
        combined.insert(
            HAS_BLOCK.to_string(),
            Value::from_function(move |names: Rest<String>| {
                names.iter().all(|name| all.contains(name))
            }),
        );
        let any = Arc::clone(&self.blocks);
        combined.insert(
            HAS_ANY_BLOCK.to_string(),
            Value::from_function(move |names: Rest<String>| {
                names.iter().any(|name| any.contains(name))
            }),
        );
        combined
    }
}

/// Assembles a [`CompiledTree`] part by part.
///
/// Every part is compiled as it is added, so syntax errors surface at the
/// part that caused them.
pub struct TreeBuilder {
    name: String,
    env: Environment<'static>,
    blocks: BTreeSet<String>,
}

impl TreeBuilder {
    /// Starts a tree for the page `name`. Autoescaping follows the page name
    /// for every part.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        let escape = default_auto_escape_callback(&name);
        env.set_auto_escape_callback(move |_| escape.clone());
        Self {
            name,
            env,
            blocks: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds the page document.
    pub fn document(&mut self, source: &str) -> Result<(), RenderError> {
        let name = self.name.clone();
        self.add(name, source)
    }

    /// Adds an included fragment under its resolved path.
    pub fn fragment(&mut self, path: &str, source: &str) -> Result<(), RenderError> {
        self.add(path.to_string(), source)
    }

    /// Adds the definition of block `name`.
    pub fn block(&mut self, name: &str, source: &str) -> Result<(), RenderError> {
        self.add(block_template_name(name), source)?;
        self.blocks.insert(name.to_string());
        Ok(())
    }

    pub fn finish(self) -> CompiledTree {
        CompiledTree {
            name: self.name,
            blocks: Arc::new(self.blocks),
            body: Body::Template(self.env),
        }
    }

    fn add(&mut self, name: String, source: &str) -> Result<(), RenderError> {
        self.env
            .add_template_owned(name.clone(), source.to_string())
            .map_err(|err| RenderError::parse(name, err))
    }
}
