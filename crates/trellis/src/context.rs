//! Per-call rendering context.
//!
//! Every [`Engine`](crate::Engine) call takes a `&dyn RenderContext`. The
//! context plays three roles:
//!
//! 1. It is a [`FunctionRegistry`]: `Function` directives look their
//!    callbacks up here at compile time.
//! 2. It exposes [`funcs`](RenderContext::funcs), template-callable values
//!    bound into the evaluator on every execution.
//! 3. It is a small key/value store, which the engine uses to mark a request
//!    that already holds the render lock.
//!
//! [`RequestContext`] is the provided implementation. Applications with their
//! own request type implement the two traits on it instead.
//!
//! # Example
//!
//! ```rust
//! use trellis::context::{FunctionRegistry, RenderContext, RequestContext};
//! use minijinja::Value;
//!
//! let ctx = RequestContext::new()
//!     .with_clip("menu", |template, arg| format!("<nav data-for={template}>{arg}</nav>"))
//!     .with_func("site", Value::from("example.org"));
//!
//! let menu = ctx.lookup("menu").unwrap();
//! assert_eq!(menu("index", "main"), "<nav data-for=index>main</nav>");
//! assert!(ctx.funcs().contains_key("site"));
//!
//! ctx.set("user", Value::from("ada"));
//! assert_eq!(ctx.get("user"), Some(Value::from("ada")));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use minijinja::Value;

/// Callback behind a `Function` directive: `(template name, argument) -> clip`.
pub type ClipFunction = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Template-callable values, keyed by the name templates use.
pub type FunctionMap = BTreeMap<String, Value>;

/// Looks up `Function` directive callbacks by name.
pub trait FunctionRegistry {
    fn lookup(&self, name: &str) -> Option<ClipFunction>;
}

/// Everything the engine needs from the caller for one render.
pub trait RenderContext: FunctionRegistry {
    /// Values bound into the evaluator for this call. They override global
    /// functions of the same name.
    fn funcs(&self) -> FunctionMap;

    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    fn delete(&self, key: &str);
}

/// A ready-made [`RenderContext`] with builder-style setup.
#[derive(Default)]
pub struct RequestContext {
    clips: HashMap<String, ClipFunction>,
    funcs: FunctionMap,
    store: Mutex<HashMap<String, Value>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for `Function` directives named `name`.
    pub fn with_clip<F>(mut self, name: impl Into<String>, clip: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        self.clips.insert(name.into(), Arc::new(clip));
        self
    }

    /// Binds a template-callable value (a function or any other value).
    pub fn with_func(mut self, name: impl Into<String>, value: Value) -> Self {
        self.funcs.insert(name.into(), value);
        self
    }

    /// Seeds the key/value store.
    pub fn with_value(self, key: impl Into<String>, value: Value) -> Self {
        self.lock_store().insert(key.into(), value);
        self
    }

    fn lock_store(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FunctionRegistry for RequestContext {
    fn lookup(&self, name: &str) -> Option<ClipFunction> {
        self.clips.get(name).cloned()
    }
}

impl RenderContext for RequestContext {
    fn funcs(&self) -> FunctionMap {
        self.funcs.clone()
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.lock_store().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.lock_store().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.lock_store().remove(key);
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut clips: Vec<_> = self.clips.keys().collect();
        clips.sort();
        f.debug_struct("RequestContext")
            .field("clips", &clips)
            .field("funcs", &self.funcs.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
