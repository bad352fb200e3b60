//! File-name allow patterns.
//!
//! Sources only report changes for files whose name matches one of the
//! registered glob patterns, which is how template extensions are usually
//! registered (`"*.html"`). Patterns match the file name, not the full path.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use glob::Pattern;

#[derive(Debug, Default)]
pub(crate) struct AllowList {
    patterns: Mutex<Vec<Pattern>>,
}

impl AllowList {
    /// Adds `pattern`. Invalid patterns are logged and ignored.
    pub(crate) fn add(&self, pattern: &str) {
        let compiled = match Pattern::new(pattern) {
            Ok(compiled) => compiled,
            Err(err) => {
                tracing::warn!(pattern, error = %err, "ignoring invalid allow pattern");
                return;
            }
        };
        let mut patterns = self.lock();
        if !patterns.iter().any(|p| p.as_str() == pattern) {
            patterns.push(compiled);
        }
    }

    /// Returns true if `name` passes the list. An empty list allows everything.
    pub(crate) fn allows(&self, name: &str) -> bool {
        let patterns = self.lock();
        if patterns.is_empty() {
            return true;
        }
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name);
        patterns.iter().any(|p| p.matches(file_name))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Pattern>> {
        self.patterns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
