//! In-memory content source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::allow::AllowList;
use crate::event::{CallbackSet, ChangeCallback, ChangeEvent, ChangeKind};
use crate::{ContentSource, SourceError};

/// A content source backed by a map of name to bytes.
///
/// Nothing touches the filesystem: changes happen through [`insert`](Self::insert),
/// [`update`](Self::update) and [`remove`](Self::remove), and watchers are
/// notified through [`emit`](Self::emit). Every successful read is counted,
/// which lets tests assert that a cached compilation skipped the source.
///
/// # Example
///
/// ```rust
/// use trellis_source::{ContentSource, MemorySource};
///
/// let source = MemorySource::new()
///     .with_file("layout.html", "<main>{{Block \"body\"/}}</main>");
///
/// assert_eq!(source.get_raw_bytes("layout.html").unwrap(), b"<main>{{Block \"body\"/}}</main>");
/// assert_eq!(source.read_count("layout.html"), 1);
/// ```
#[derive(Default)]
pub struct MemorySource {
    files: RwLock<HashMap<String, Vec<u8>>>,
    reads: Mutex<HashMap<String, usize>>,
    callbacks: CallbackSet,
    allow: AllowList,
    watched: Mutex<Vec<PathBuf>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_file(self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(name, content);
        self
    }

    /// Stores `content` under `name`, replacing any previous content.
    ///
    /// No event is emitted; use [`update`](Self::update) to simulate an edit.
    pub fn insert(&self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), content.into());
    }

    /// Replaces the content of `name` and emits a modify (or create) event.
    pub fn update(&self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> usize {
        let name = name.into();
        let existed = self
            .files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), content.into())
            .is_some();
        let kind = if existed {
            ChangeKind::Modify
        } else {
            ChangeKind::Create
        };
        self.emit(&ChangeEvent::file(name, kind))
    }

    /// Removes `name` and emits a delete event.
    pub fn remove(&self, name: &str) -> usize {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        self.emit(&ChangeEvent::file(name, ChangeKind::Delete))
    }

    /// Delivers `event` to the matching callbacks.
    ///
    /// Events are only delivered between [`start`](ContentSource::start) and
    /// [`close`](ContentSource::close), and file events must pass the allow
    /// patterns. Returns the number of callbacks invoked.
    pub fn emit(&self, event: &ChangeEvent) -> usize {
        if !self.started.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return 0;
        }
        if !event.is_dir() && !self.allow.allows(&event.name) {
            return 0;
        }
        self.callbacks.dispatch(event)
    }

    /// Number of successful reads of `name` so far.
    pub fn read_count(&self, name: &str) -> usize {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Number of successful reads across all names.
    pub fn total_reads(&self) -> usize {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Directories currently registered for watching.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true once [`close`](ContentSource::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ContentSource for MemorySource {
    fn get_raw_bytes(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        if self.is_closed() {
            return Err(SourceError::Closed);
        }
        let content = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                name: name.to_string(),
            })?;
        *self
            .reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert(0) += 1;
        Ok(content)
    }

    fn add_allow(&self, pattern: &str) {
        self.allow.add(pattern);
    }

    fn add_watch_dir(&self, path: &Path) -> Result<(), SourceError> {
        let mut watched = self.watched.lock().unwrap_or_else(PoisonError::into_inner);
        if !watched.iter().any(|p| p == path) {
            watched.push(path.to_path_buf());
        }
        Ok(())
    }

    fn cancel_watch_dir(&self, path: &Path) {
        self.watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|p| p != path);
    }

    fn add_callback(&self, path: &Path, callback: ChangeCallback) {
        self.callbacks.add(path, callback);
    }

    fn del_callback(&self, path: &Path) {
        self.callbacks.remove(path);
    }

    fn start(&self) -> Result<(), SourceError> {
        if self.is_closed() {
            return Err(SourceError::Closed);
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear_cache(&self) {}

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.callbacks.clear();
        self.watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
