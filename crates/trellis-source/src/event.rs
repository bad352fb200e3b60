//! Change notifications delivered by content sources.
//!
//! A source reports every change under a watched directory as a
//! [`ChangeEvent`]. Consumers register a [`ChangeCallback`] per directory;
//! the source hands each event to the callbacks whose directory contains the
//! changed name.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// What happened to a watched entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
    Rename,
}

impl ChangeKind {
    /// The lowercase event name (`"create"`, `"modify"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
            ChangeKind::Rename => "rename",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the changed entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Dir,
}

/// A single change under a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Name of the changed entry, in the same form the source serves it.
    pub name: String,
    /// File or directory.
    pub entry: EntryKind,
    /// What happened.
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Creates a new change event.
    pub fn new(name: impl Into<String>, entry: EntryKind, kind: ChangeKind) -> Self {
        Self {
            name: name.into(),
            entry,
            kind,
        }
    }

    /// Shorthand for an event about a file.
    pub fn file(name: impl Into<String>, kind: ChangeKind) -> Self {
        Self::new(name, EntryKind::File, kind)
    }

    /// Shorthand for an event about a directory.
    pub fn dir(name: impl Into<String>, kind: ChangeKind) -> Self {
        Self::new(name, EntryKind::Dir, kind)
    }

    /// Returns true if the event concerns a directory.
    pub fn is_dir(&self) -> bool {
        self.entry == EntryKind::Dir
    }
}

/// Callback invoked for every event under the directory it was registered for.
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Directory-keyed callback table shared by the source implementations.
#[derive(Default)]
pub(crate) struct CallbackSet {
    entries: Mutex<BTreeMap<PathBuf, Vec<ChangeCallback>>>,
}

impl CallbackSet {
    pub(crate) fn add(&self, dir: &Path, callback: ChangeCallback) {
        self.lock().entry(dir.to_path_buf()).or_default().push(callback);
    }

    pub(crate) fn remove(&self, dir: &Path) {
        self.lock().remove(dir);
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    /// Invokes every callback whose directory contains `event.name`.
    ///
    /// Callbacks run outside the table lock, so a callback may register or
    /// remove callbacks itself. Returns the number of callbacks invoked.
    pub(crate) fn dispatch(&self, event: &ChangeEvent) -> usize {
        let name = Path::new(&event.name);
        let targets: Vec<ChangeCallback> = self
            .lock()
            .iter()
            .filter(|(dir, _)| name.starts_with(dir))
            .flat_map(|(_, callbacks)| callbacks.iter().cloned())
            .collect();
        for callback in &targets {
            callback(event);
        }
        targets.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, Vec<ChangeCallback>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
