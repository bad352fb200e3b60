//! Filesystem content source with change watching.
//!
//! [`FsSource`] serves template bytes straight from disk. Names are paths:
//! the engine resolves a logical template name to a file path before asking
//! for it. Raw content is kept in memory after the first read and dropped
//! again when the watcher reports a change to the file, so edits are picked
//! up without re-reading unchanged files on every compile.
//!
//! Watching is backed by [`notify`]. Events are translated into
//! [`ChangeEvent`]s and delivered to the callbacks registered for the
//! containing directory. The watcher reports absolute paths; event names are
//! mapped back under the directory as it was registered, so a source
//! watching `views` reports `views/index.html`, the same name it is read by.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::allow::AllowList;
use crate::event::{CallbackSet, ChangeCallback, ChangeEvent, ChangeKind, EntryKind};
use crate::{ContentSource, SourceError};

/// State shared between the source and the watcher thread.
#[derive(Default)]
struct Shared {
    content: Mutex<HashMap<PathBuf, Arc<[u8]>>>,
    caching: bool,
    callbacks: CallbackSet,
    allow: AllowList,
    roots: Mutex<Vec<WatchRoot>>,
}

impl Shared {
    fn content(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<[u8]>>> {
        self.content.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn roots(&self) -> MutexGuard<'_, Vec<WatchRoot>> {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Renames a watcher-reported event into the registered form of its root.
    fn localize(&self, mut event: ChangeEvent) -> ChangeEvent {
        let reported = PathBuf::from(&event.name);
        if let Some(local) = self.roots().iter().find_map(|root| root.localize(&reported)) {
            event.name = local.to_string_lossy().into_owned();
        }
        event
    }

    fn handle(&self, event: &ChangeEvent) {
        if !event.is_dir() && !self.allow.allows(&event.name) {
            return;
        }
        let changed = Path::new(&event.name);
        if event.is_dir() {
            self.content().retain(|path, _| !path.starts_with(changed));
        } else {
            self.content().remove(changed);
        }
        tracing::debug!(name = %event.name, kind = %event.kind, "template source changed");
        self.callbacks.dispatch(event);
    }
}

/// A watched directory as registered, and the forms the watcher reports it in.
struct WatchRoot {
    registered: PathBuf,
    absolute: PathBuf,
    canonical: Option<PathBuf>,
}

impl WatchRoot {
    fn new(path: &Path) -> Self {
        Self {
            registered: path.to_path_buf(),
            absolute: std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
            canonical: std::fs::canonicalize(path).ok(),
        }
    }

    fn localize(&self, reported: &Path) -> Option<PathBuf> {
        let rest = std::iter::once(&self.absolute)
            .chain(self.canonical.as_ref())
            .find_map(|base| reported.strip_prefix(base).ok())?;
        if rest.as_os_str().is_empty() {
            Some(self.registered.clone())
        } else {
            Some(self.registered.join(rest))
        }
    }
}

/// A content source reading files from disk.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use trellis_source::{ContentSource, FsSource};
///
/// let source = FsSource::new();
/// source.add_allow("*.html");
/// source.add_watch_dir(Path::new("/srv/app/views"))?;
/// source.start()?;
///
/// let bytes = source.get_raw_bytes("/srv/app/views/index.html")?;
/// # Ok::<(), trellis_source::SourceError>(())
/// ```
pub struct FsSource {
    shared: Arc<Shared>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl Default for FsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FsSource {
    /// Creates a source that keeps raw content in memory between changes.
    pub fn new() -> Self {
        Self::with_caching(true)
    }

    /// Creates a source; with `caching` off every read goes to disk.
    pub fn with_caching(caching: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                caching,
                ..Shared::default()
            }),
            watcher: Mutex::new(None),
        }
    }

    /// Returns true once [`start`](ContentSource::start) created a watcher.
    pub fn is_watching(&self) -> bool {
        self.watcher().is_some()
    }

    /// Number of files whose raw content is currently held in memory.
    pub fn cached_len(&self) -> usize {
        self.shared.content().len()
    }

    /// Feeds a change through the same path the watcher uses.
    ///
    /// Useful when changes are detected by some other means (a deploy hook,
    /// a polling loop) and in tests.
    pub fn notify_change(&self, event: &ChangeEvent) {
        self.shared.handle(event);
    }

    fn watcher(&self) -> MutexGuard<'_, Option<RecommendedWatcher>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

}

impl ContentSource for FsSource {
    fn get_raw_bytes(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        let path = PathBuf::from(name);
        if self.shared.caching {
            if let Some(content) = self.shared.content().get(&path) {
                return Ok(content.to_vec());
            }
        }
        let bytes = std::fs::read(&path).map_err(|e| SourceError::io(&path, e))?;
        if self.shared.caching {
            self.shared.content().insert(path, Arc::from(bytes.as_slice()));
        }
        Ok(bytes)
    }

    fn add_allow(&self, pattern: &str) {
        self.shared.allow.add(pattern);
    }

    fn add_watch_dir(&self, path: &Path) -> Result<(), SourceError> {
        let absolute = {
            let mut roots = self.shared.roots();
            if roots.iter().any(|root| root.registered == path) {
                return Ok(());
            }
            let root = WatchRoot::new(path);
            let absolute = root.absolute.clone();
            roots.push(root);
            absolute
        };
        if let Some(watcher) = self.watcher().as_mut() {
            watcher.watch(&absolute, RecursiveMode::Recursive)?;
        }
        Ok(())
    }

    fn cancel_watch_dir(&self, path: &Path) {
        let absolute = {
            let mut roots = self.shared.roots();
            let Some(index) = roots.iter().position(|root| root.registered == path) else {
                return;
            };
            roots.remove(index).absolute
        };
        if let Some(watcher) = self.watcher().as_mut() {
            if let Err(err) = watcher.unwatch(&absolute) {
                tracing::debug!(path = %path.display(), error = %err, "unwatch failed");
            }
        }
    }

    fn add_callback(&self, path: &Path, callback: ChangeCallback) {
        self.shared.callbacks.add(path, callback);
    }

    fn del_callback(&self, path: &Path) {
        self.shared.callbacks.remove(path);
    }

    fn start(&self) -> Result<(), SourceError> {
        let mut slot = self.watcher();
        if slot.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for change in translate_event(&event) {
                        shared.handle(&shared.localize(change));
                    }
                }
                Err(err) => tracing::warn!(error = %err, "template watcher error"),
            })?;
        for root in self.shared.roots().iter() {
            watcher.watch(&root.absolute, RecursiveMode::Recursive)?;
        }
        *slot = Some(watcher);
        Ok(())
    }

    fn clear_cache(&self) {
        self.shared.content().clear();
    }

    fn close(&self) {
        self.watcher().take();
        self.shared.roots().clear();
        self.shared.callbacks.clear();
        self.clear_cache();
    }
}

/// Translates a `notify` event into zero or more change events.
///
/// Access and metadata-only events are dropped; renames map to
/// [`ChangeKind::Rename`] for every path involved.
pub fn translate_event(event: &notify::Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Create,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Modify,
        EventKind::Remove(_) => ChangeKind::Delete,
        _ => return Vec::new(),
    };
    let folder = matches!(
        event.kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    );
    event
        .paths
        .iter()
        .map(|path| {
            let entry = if folder || path.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            ChangeEvent::new(path.to_string_lossy().into_owned(), entry, kind)
        })
        .collect()
}
