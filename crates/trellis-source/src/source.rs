//! The content source abstraction.

use std::path::Path;

use crate::event::ChangeCallback;
use crate::SourceError;

/// A provider of raw template bytes with change notification.
///
/// The engine reads every template, layout and fragment through this trait
/// and registers a callback to learn when cached compilations go stale.
/// Implementations must tolerate concurrent reads from many threads and may
/// deliver events from a background thread.
///
/// Two implementations ship with this crate:
///
/// - [`MemorySource`](crate::MemorySource): an in-memory manager, useful for
///   embedded templates and tests
/// - [`FsSource`](crate::FsSource): files on disk, watched with `notify`
pub trait ContentSource: Send + Sync {
    /// Returns the raw bytes stored under `name`.
    fn get_raw_bytes(&self, name: &str) -> Result<Vec<u8>, SourceError>;

    /// Restricts change reporting to file names matching `pattern`
    /// (a name with at most one `*` wildcard, e.g. `"*.html"`).
    fn add_allow(&self, pattern: &str);

    /// Starts watching `path` for changes.
    fn add_watch_dir(&self, path: &Path) -> Result<(), SourceError>;

    /// Stops watching `path`.
    fn cancel_watch_dir(&self, path: &Path);

    /// Registers `callback` for changes under `path`.
    fn add_callback(&self, path: &Path, callback: ChangeCallback);

    /// Removes every callback registered for `path`.
    fn del_callback(&self, path: &Path);

    /// Begins delivering change events.
    fn start(&self) -> Result<(), SourceError>;

    /// Drops any raw content the source keeps in memory.
    fn clear_cache(&self);

    /// Stops watching everything and releases resources.
    fn close(&self);
}
