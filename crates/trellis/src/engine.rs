//! The render driver.
//!
//! [`Engine`] ties the pieces together: it composes a page through the
//! [`Loader`], resolves function clips, compiles the result into a
//! [`CompiledTree`], caches it by resolved path and executes it with
//! per-call data.
//!
//! # Fail-soft compilation
//!
//! A page whose file, layout or fragment cannot be read, or whose composed
//! markup does not compile, becomes a literal tree holding a diagnostic
//! message. Such trees are not cached. [`Engine::render`] writes them like
//! any other output and [`Engine::fetch`] returns them, so one broken
//! template degrades a single page instead of failing the caller.
//!
//! # Locking
//!
//! One mutex guards the cache. Lookup and compilation happen inside a single
//! scoped guard; execution happens after it is released. While a request
//! holds the lock its context carries [`RENDER_LOCK_KEY`]; a nested render
//! for the same context (for example from a function clip) compiles without
//! the cache instead of waiting on itself.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use trellis::{Engine, EngineConfig, RequestContext};
//! use trellis_source::MemorySource;
//!
//! let source = MemorySource::new()
//!     .with_file("views/layout.html", r#"<title>{{Block "title"}}Site{{/Block}}</title>"#)
//!     .with_file("views/index.html", r#"{{Extend "layout"}}{{Block "title"}}{{ page }} | {{Super}}{{/Block}}"#);
//!
//! let engine = Engine::builder(EngineConfig::new("views"))
//!     .source(Arc::new(source))
//!     .build()
//!     .unwrap();
//!
//! let html = engine.fetch("index", &json!({"page": "Home"}), &RequestContext::new());
//! assert_eq!(html, "<title>Home | Site</title>");
//! ```

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use minijinja::Value;
use serde::Serialize;
use trellis_source::{ChangeEvent, ChangeKind, ContentSource, FsSource};

use crate::cache::TemplateCache;
use crate::compose::{self, resolve_functions, ClipSet, Composition};
use crate::config::EngineConfig;
use crate::context::{FunctionMap, RenderContext};
use crate::error::RenderError;
use crate::loader::{Loader, PathFixer, Preprocessor};
use crate::scanner::TagScanner;
use crate::tree::{CompiledTree, TreeBuilder};

/// Context key marking a request that holds the render lock.
pub const RENDER_LOCK_KEY: &str = "trellis:render.locked";

/// Supplies the global template functions, called on every execution.
pub type FuncProvider = Arc<dyn Fn() -> FunctionMap + Send + Sync>;

/// Called with the changed path after the cache reacted to a file change.
pub type FileChangeListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Builder for [`Engine`]: everything that cannot live in [`EngineConfig`].
pub struct EngineBuilder {
    config: EngineConfig,
    source: Option<Arc<dyn ContentSource>>,
    owns_source: bool,
    path_fixer: Option<PathFixer>,
    preprocessors: Vec<Preprocessor>,
    global_funcs: Option<FuncProvider>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            source: None,
            owns_source: true,
            path_fixer: None,
            preprocessors: Vec::new(),
            global_funcs: None,
        }
    }

    /// Uses `source` exclusively; [`Engine::close`] closes it.
    pub fn source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.source = Some(source);
        self.owns_source = true;
        self
    }

    /// Uses a source shared with other engines; [`Engine::close`] only
    /// detaches this engine's watch directory and callback.
    pub fn shared_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.source = Some(source);
        self.owns_source = false;
        self
    }

    /// Replaces default path resolution. The fixer receives `name + extension`.
    pub fn path_fixer<F>(mut self, fixer: F) -> Self
    where
        F: Fn(&dyn RenderContext, &str) -> String + Send + Sync + 'static,
    {
        self.path_fixer = Some(Arc::new(fixer));
        self
    }

    /// Appends a raw-content preprocessor. Preprocessors run in the order
    /// they were added, before `Strip` compaction.
    pub fn preprocessor<F>(mut self, preprocess: F) -> Self
    where
        F: Fn(Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
    {
        self.preprocessors.push(Arc::new(preprocess));
        self
    }

    /// Sets the provider of global template functions.
    pub fn global_funcs<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> FunctionMap + Send + Sync + 'static,
    {
        self.global_funcs = Some(Arc::new(provider));
        self
    }

    /// Builds the engine. Without an explicit source, files are read from
    /// disk through an [`FsSource`].
    pub fn build(self) -> Result<Engine, RenderError> {
        let scanner = TagScanner::new(&self.config.syntax)?;
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(FsSource::new()) as Arc<dyn ContentSource>);
        let loader = Loader::new(
            source,
            scanner,
            self.config.template_dir.clone(),
            self.config.extension.clone(),
        )
        .with_debug(self.config.debug)
        .with_path_fixer(self.path_fixer)
        .with_preprocessors(self.preprocessors);

        Ok(Engine {
            cache: Arc::new(Mutex::new(TemplateCache::new(self.config.invalidation))),
            listeners: Arc::new(Mutex::new(Vec::new())),
            owns_source: self.owns_source,
            watching: AtomicBool::new(false),
            global_funcs: self.global_funcs,
            loader,
            config: self.config,
        })
    }
}

/// A template composition engine with a compiled-tree cache.
pub struct Engine {
    config: EngineConfig,
    loader: Loader,
    global_funcs: Option<FuncProvider>,
    cache: Arc<Mutex<TemplateCache>>,
    listeners: Arc<Mutex<Vec<FileChangeListener>>>,
    owns_source: bool,
    watching: AtomicBool,
}

impl Engine {
    /// Creates an engine with default settings for `config`.
    pub fn new(config: EngineConfig) -> Result<Self, RenderError> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        self.loader.source()
    }

    /// Starts watching the template directory.
    ///
    /// Modify, delete and rename events for files with the configured
    /// extension invalidate the cache and are then passed to every
    /// [`on_file_change`](Self::on_file_change) listener. Create events and
    /// directory events are ignored.
    ///
    /// Calling `init` again before [`close`](Self::close) does nothing.
    pub fn init(&self) -> Result<(), RenderError> {
        if self.watching.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let source = self.loader.source();
        let dir = self.config.template_dir.as_path();
        source.add_allow(&format!("*{}", self.config.extension));
        if let Err(err) = source.add_watch_dir(dir) {
            self.watching.store(false, Ordering::SeqCst);
            return Err(err.into());
        }

        let cache = Arc::clone(&self.cache);
        let listeners = Arc::clone(&self.listeners);
        let extension = self.config.extension.clone();
        source.add_callback(
            dir,
            Arc::new(move |event: &ChangeEvent| {
                if event.is_dir() || event.kind == ChangeKind::Create {
                    return;
                }
                if !event.name.ends_with(&extension) {
                    return;
                }
                let removed = lock(&cache).invalidate(&event.name);
                if removed > 0 {
                    tracing::info!(
                        template = %event.name,
                        kind = %event.kind,
                        removed,
                        "removed cached template objects"
                    );
                }
                let current: Vec<FileChangeListener> = lock(&listeners).clone();
                for listener in current {
                    listener(&event.name);
                }
            }),
        );
        if let Err(err) = source.start() {
            source.del_callback(dir);
            self.watching.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        Ok(())
    }

    /// Registers a listener for file changes seen after [`init`](Self::init).
    pub fn on_file_change<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        lock(&self.listeners).push(Arc::new(listener));
    }

    /// Renders `name` into `writer`.
    ///
    /// Load and compile failures are written as diagnostic text; only data
    /// serialization, execution and write errors are returned.
    pub fn render<T: Serialize + ?Sized>(
        &self,
        writer: &mut dyn Write,
        name: &str,
        data: &T,
        ctx: &dyn RenderContext,
    ) -> Result<(), RenderError> {
        let data = serde_json::to_value(data)?;
        let tree = self.tree(name, ctx);
        tree.execute_to(writer, &data, self.funcs(ctx))
    }

    /// Renders `name` to a string. Errors are embedded in the output.
    pub fn fetch<T: Serialize + ?Sized>(
        &self,
        name: &str,
        data: &T,
        ctx: &dyn RenderContext,
    ) -> String {
        let tree = self.tree(name, ctx);
        let result = serde_json::to_value(data)
            .map_err(RenderError::from)
            .and_then(|data| tree.execute(&data, self.funcs(ctx)));
        match result {
            Ok(out) => out,
            Err(err) => {
                tracing::error!(template = %name, error = %err, "render failed");
                let shown = if tree.is_literal() { name } else { tree.name() };
                format!("Parse {} err: {}", shown, err)
            }
        }
    }

    /// Composes `name` with every function clip resolved, bypassing the
    /// cache. Load failures of the page or a layout are returned as errors.
    pub fn compose(
        &self,
        name: &str,
        ctx: &dyn RenderContext,
    ) -> Result<Composition, RenderError> {
        let mut composition = compose::compose(&self.loader, ctx, name)?;
        let scanner = self.loader.scanner();
        let mut clips = ClipSet::new();
        composition.document =
            resolve_functions(scanner, ctx, name, &composition.document, &mut clips);
        for body in composition.fragments.values_mut() {
            *body = resolve_functions(scanner, ctx, name, body, &mut clips);
        }
        for body in composition.blocks.values_mut() {
            *body = resolve_functions(scanner, ctx, name, body, &mut clips);
        }
        Ok(composition)
    }

    /// Drops every compiled tree and the source's cached content.
    pub fn clear_cache(&self) {
        let removed = lock(&self.cache).clear();
        self.loader.source().clear_cache();
        tracing::debug!(removed, "cleared template cache");
    }

    /// Clears the cache and releases the source: an owned source is closed,
    /// a shared one only loses this engine's watch directory and callback.
    pub fn close(&self) {
        self.clear_cache();
        self.watching.store(false, Ordering::SeqCst);
        let source = self.loader.source();
        if self.owns_source {
            source.close();
        } else {
            let dir = self.config.template_dir.as_path();
            source.cancel_watch_dir(dir);
            source.del_callback(dir);
        }
    }

    /// Number of cache entries (pages, layouts and fragments).
    pub fn cache_len(&self) -> usize {
        lock(&self.cache).len()
    }

    /// Returns true if a compiled tree for `name` is cached.
    pub fn is_cached(&self, name: &str, ctx: &dyn RenderContext) -> bool {
        let key = self.loader.resolve(ctx, name);
        lock(&self.cache).standalone(&key).is_some()
    }

    /// Resolved template path of `name`.
    pub fn resolve(&self, name: &str, ctx: &dyn RenderContext) -> String {
        self.loader.resolve(ctx, name)
    }

    pub fn template_dir(&self) -> &Path {
        self.loader.template_dir()
    }

    /// Global functions overlaid with the context's functions.
    fn funcs(&self, ctx: &dyn RenderContext) -> FunctionMap {
        let mut funcs = self
            .global_funcs
            .as_ref()
            .map(|provider| provider())
            .unwrap_or_default();
        funcs.extend(ctx.funcs());
        funcs
    }

    /// Returns the cached tree for `name` or compiles it.
    fn tree(&self, name: &str, ctx: &dyn RenderContext) -> Arc<CompiledTree> {
        if ctx.get(RENDER_LOCK_KEY).is_some() {
            return self.compile(name, ctx, None);
        }

        ctx.set(RENDER_LOCK_KEY, Value::from(true));
        let _held = LockMarker { ctx };
        let mut cache = lock(&self.cache);

        let key = self.loader.resolve(ctx, name);
        if let Some(tree) = cache.standalone(&key) {
            return tree;
        }
        self.compile(name, ctx, Some(&mut *cache))
    }

    fn compile(
        &self,
        name: &str,
        ctx: &dyn RenderContext,
        cache: Option<&mut TemplateCache>,
    ) -> Arc<CompiledTree> {
        let started = self.config.debug.then(Instant::now);
        if started.is_some() {
            tracing::debug!(template = %name, "compile template");
        }

        let tree = match compose::compose(&self.loader, ctx, name) {
            Ok(composition) => match self.build(name, ctx, &composition, cache) {
                Ok(tree) => tree,
                Err(diagnostic) => Arc::new(CompiledTree::literal(diagnostic)),
            },
            Err(err) => {
                tracing::error!(template = %name, error = %err, "compose failed");
                Arc::new(CompiledTree::literal(err.to_string()))
            }
        };

        if let Some(started) = started {
            tracing::debug!(
                template = %name,
                elapsed = ?started.elapsed(),
                "finished compile"
            );
        }
        tree
    }

    /// Compiles a composition and records it in `cache`.
    ///
    /// On a compile failure returns the diagnostic text for the literal tree.
    fn build(
        &self,
        name: &str,
        ctx: &dyn RenderContext,
        composition: &Composition,
        mut cache: Option<&mut TemplateCache>,
    ) -> Result<Arc<CompiledTree>, String> {
        let scanner = self.loader.scanner();
        let key = composition.key.as_str();
        let mut clips = ClipSet::new();
        let mut builder = TreeBuilder::new(key);

        let document = resolve_functions(scanner, ctx, name, &composition.document, &mut clips);
        builder
            .document(&document)
            .map_err(|err| diagnostic(format!("Parse {}", key), err))?;

        for (path, body) in &composition.fragments {
            if path == key {
                continue;
            }
            let fragment = match cache.as_deref().and_then(|c| c.child(path)) {
                Some(cached) => cached,
                None => Arc::from(resolve_functions(scanner, ctx, name, body, &mut clips)),
            };
            builder
                .fragment(path, &fragment)
                .map_err(|err| diagnostic(format!("Parse File {}", path), err))?;
            if let Some(cache) = cache.as_deref_mut() {
                cache.put_child(path, fragment, key);
            }
        }

        for (block, body) in &composition.blocks {
            let body = resolve_functions(scanner, ctx, name, body, &mut clips);
            builder
                .block(block, &body)
                .map_err(|err| diagnostic(format!("Parse Block {}", block), err))?;
        }

        let tree = Arc::new(builder.finish());
        if let Some(cache) = cache {
            for parent in &composition.parents {
                cache.add_dependent(parent, key);
            }
            cache.put_standalone(key, Arc::clone(&tree));
        }
        Ok(tree)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("loader", &self.loader)
            .field("owns_source", &self.owns_source)
            .field("cached", &lock(&self.cache).len())
            .finish_non_exhaustive()
    }
}

/// Removes [`RENDER_LOCK_KEY`] from the context when dropped.
struct LockMarker<'a> {
    ctx: &'a dyn RenderContext,
}

impl Drop for LockMarker<'_> {
    fn drop(&mut self) {
        self.ctx.delete(RENDER_LOCK_KEY);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn diagnostic(label: String, err: RenderError) -> String {
    tracing::error!(part = %label, error = %err, "compile failed");
    let message = match err {
        RenderError::Parse { message, .. } => message,
        other => other.to_string(),
    };
    format!("{} err: {}", label, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use serde_json::json;
    use trellis_source::MemorySource;

    fn engine(files: &[(&str, &str)]) -> (Engine, Arc<MemorySource>) {
        let source = Arc::new(MemorySource::new());
        for (name, content) in files {
            source.insert(*name, *content);
        }
        let engine = Engine::builder(EngineConfig::new("views"))
            .source(source.clone())
            .build()
            .unwrap();
        (engine, source)
    }

    #[test]
    fn test_lock_key_is_removed_after_render() {
        let (engine, _) = engine(&[("views/a.html", "a")]);
        let ctx = RequestContext::new();
        assert_eq!(engine.fetch("a", &json!({}), &ctx), "a");
        assert!(ctx.get(RENDER_LOCK_KEY).is_none());
    }

    #[test]
    fn test_held_lock_key_bypasses_cache() {
        let (engine, source) = engine(&[("views/a.html", "a")]);
        let ctx = RequestContext::new().with_value(RENDER_LOCK_KEY, Value::from(true));
        assert_eq!(engine.fetch("a", &json!({}), &ctx), "a");
        assert_eq!(engine.fetch("a", &json!({}), &ctx), "a");
        assert_eq!(engine.cache_len(), 0);
        assert_eq!(source.read_count("views/a.html"), 2);
        // The caller's marker is left alone.
        assert!(ctx.get(RENDER_LOCK_KEY).is_some());
    }

    #[test]
    fn test_compile_error_is_literal_and_uncached() {
        let (engine, _) = engine(&[("views/bad.html", "{% if %}")]);
        let out = engine.fetch("bad", &json!({}), &RequestContext::new());
        assert!(out.starts_with("Parse views/bad.html err: "), "{out}");
        assert!(!engine.is_cached("bad", &RequestContext::new()));
    }

    #[test]
    fn test_block_compile_error_names_block() {
        let (engine, _) = engine(&[
            ("views/layout.html", r#"{{Block "main"}}{{/Block}}"#),
            ("views/page.html", r#"{{Extend "layout"}}{{Block "main"}}{% for %}{{/Block}}"#),
        ]);
        let out = engine.fetch("page", &json!({}), &RequestContext::new());
        assert!(out.starts_with("Parse Block main err: "), "{out}");
    }

    #[test]
    fn test_execution_error_is_embedded_by_fetch() {
        let (engine, _) = engine(&[("views/a.html", "{{ 1 + none_fn() }}")]);
        let out = engine.fetch("a", &json!({}), &RequestContext::new());
        assert!(out.starts_with("Parse views/a.html err: "), "{out}");

        let mut buf = Vec::new();
        let err = engine
            .render(&mut buf, "a", &json!({}), &RequestContext::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::TemplateError(_)));
    }

    #[test]
    fn test_global_funcs_are_overridden_by_context() {
        let source = Arc::new(MemorySource::new().with_file("views/a.html", "{{ who }}/{{ site }}"));
        let engine = Engine::builder(EngineConfig::new("views"))
            .source(source)
            .global_funcs(|| {
                let mut funcs = FunctionMap::new();
                funcs.insert("who".into(), Value::from("global"));
                funcs.insert("site".into(), Value::from("example.org"));
                funcs
            })
            .build()
            .unwrap();
        let ctx = RequestContext::new().with_func("who", Value::from("request"));
        assert_eq!(engine.fetch("a", &json!({}), &ctx), "request/example.org");
    }

    #[test]
    fn test_close_owned_source() {
        let (engine, source) = engine(&[("views/a.html", "a")]);
        engine.init().unwrap();
        engine.fetch("a", &json!({}), &RequestContext::new());
        engine.close();
        assert_eq!(engine.cache_len(), 0);
        assert!(source.is_closed());
    }

    #[test]
    fn test_close_shared_source_detaches() {
        let source = Arc::new(MemorySource::new().with_file("views/a.html", "a"));
        let engine = Engine::builder(EngineConfig::new("views"))
            .shared_source(source.clone())
            .build()
            .unwrap();
        engine.init().unwrap();
        assert_eq!(source.watched_dirs(), vec![std::path::PathBuf::from("views")]);

        engine.close();
        assert!(!source.is_closed());
        assert!(source.watched_dirs().is_empty());
        assert_eq!(source.update("views/a.html", "b"), 0);
    }

    #[test]
    fn test_repeated_init_registers_once() {
        let source = Arc::new(MemorySource::new().with_file("views/a.html", "a"));
        let engine = Engine::builder(EngineConfig::new("views"))
            .shared_source(source.clone())
            .build()
            .unwrap();
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        engine.on_file_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.init().unwrap();
        engine.init().unwrap();
        assert_eq!(source.update("views/a.html", "b"), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        engine.close();
        engine.init().unwrap();
        assert_eq!(source.update("views/a.html", "c"), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
