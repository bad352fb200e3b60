//! # Trellis Source - Watched Template Content
//!
//! `trellis-source` provides the content layer of the `trellis` template
//! engine: where raw template bytes come from, and how the engine learns that
//! they changed.
//!
//! ## Core Concepts
//!
//! - [`ContentSource`]: The trait the engine reads through
//! - [`MemorySource`]: In-memory manager for embedded templates and tests
//! - [`FsSource`]: Files on disk, watched with `notify`
//! - [`ChangeEvent`]: A create/modify/delete/rename notification
//!
//! ## Example
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//! use trellis_source::{ChangeEvent, ContentSource, MemorySource};
//!
//! let source = MemorySource::new().with_file("views/index.html", "hello");
//! source.add_allow("*.html");
//! source.add_callback(
//!     Path::new("views"),
//!     Arc::new(|event: &ChangeEvent| println!("{} {}", event.kind, event.name)),
//! );
//! source.start().unwrap();
//!
//! assert_eq!(source.update("views/index.html", "bye"), 1);
//! ```

mod allow;
mod error;
mod event;
mod fs;
mod memory;
mod source;

pub use error::SourceError;
pub use event::{ChangeCallback, ChangeEvent, ChangeKind, EntryKind};
pub use fs::{translate_event, FsSource};
pub use memory::MemorySource;
pub use source::ContentSource;
