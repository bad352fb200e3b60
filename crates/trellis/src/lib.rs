//! # Trellis - Template Composition and Caching
//!
//! `trellis` composes HTML (or any text) templates out of layouts, blocks,
//! fragments and function clips, compiles the composed document with
//! MiniJinja and caches the result per template file until the file changes.
//!
//! The composition directives are resolved textually before MiniJinja sees
//! the document; everything else in a template is ordinary MiniJinja.
//!
//! ## Core Concepts
//!
//! - [`Engine`]: Composes, compiles, caches and renders templates
//! - [`EngineConfig`]: Serializable settings (template dir, extension, syntax)
//! - [`Syntax`]: Delimiters and keywords of the directives
//! - [`RenderContext`]: Per-call function registry and key/value store
//! - [`Composition`]: A page after inheritance and include expansion
//! - [`trellis_source`]: Where template bytes come from, and change events
//!
//! ## Directives
//!
//! ```text
//! {{Extend "layouts/base"}}            inherit from a layout (first line only)
//! {{Block "title"}}...{{/Block}}       define or override a block
//! {{Block "head"/}}                    placeholder filled with a descendant block
//! {{Super}}                            the ancestor's block content
//! {{Include "partials/nav" user}}      include a fragment, optionally with data
//! {{Function "menu" main}}             a clip computed by a context callback
//! {{Strip}}...{{/Strip}}               compact whitespace between tags
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use trellis::{Engine, EngineConfig, RequestContext};
//! use trellis_source::MemorySource;
//!
//! let source = MemorySource::new()
//!     .with_file("views/base.html", r#"<main>{{Block "body"}}empty{{/Block}}</main>{{Include "foot"}}"#)
//!     .with_file("views/foot.html", "<footer>{{Function \"year\"}}</footer>")
//!     .with_file("views/home.html", r#"{{Extend "base"}}{{Block "body"}}Hi {{ name }}{{/Block}}"#);
//!
//! let engine = Engine::builder(EngineConfig::new("views"))
//!     .source(Arc::new(source))
//!     .build()
//!     .unwrap();
//! let ctx = RequestContext::new().with_clip("year", |_, _| "2026".to_string());
//!
//! let html = engine.fetch("home", &json!({"name": "Ada"}), &ctx);
//! assert_eq!(html, "<main>Hi Ada</main><footer>2026</footer>");
//! ```
//!
//! ## Caching
//!
//! The first render of a page compiles it; later renders reuse the tree
//! without touching the content source. Call [`Engine::init`] to watch the
//! template directory: a modified, deleted or renamed template invalidates
//! the cache according to [`InvalidationPolicy`].

pub mod cache;
pub mod compose;
mod config;
pub mod context;
mod engine;
mod error;
pub mod loader;
pub mod scanner;
pub mod strip;
pub mod tree;

pub use cache::{CompiledEntry, TemplateCache};
pub use compose::{Composition, MAX_EXTEND_DEPTH};
pub use config::{EngineConfig, InvalidationPolicy, Syntax, DEFAULT_EXTENSION};
pub use context::{ClipFunction, FunctionMap, FunctionRegistry, RenderContext, RequestContext};
pub use engine::{Engine, EngineBuilder, FileChangeListener, FuncProvider, RENDER_LOCK_KEY};
pub use error::RenderError;
pub use loader::{Loader, PathFixer, Preprocessor};
pub use scanner::{BlockMatch, TagKind, TagMatch, TagScanner};
pub use tree::CompiledTree;

pub use trellis_source;
