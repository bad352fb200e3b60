//! Compiled-tree cache.
//!
//! One [`CompiledEntry`] exists per cache key (a resolved template path). An
//! entry plays up to two roles:
//!
//! - the **standalone** slot holds the tree compiled when the file was the
//!   page being rendered;
//! - the **child** slot holds the function-resolved body of the file when it
//!   was included as a fragment of another page.
//!
//! Every compile records, on the entries of the layouts and fragments it
//! used, the key of the page that used them. Those dependents drive
//! [`InvalidationPolicy::Targeted`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::InvalidationPolicy;
use crate::tree::CompiledTree;

/// Cache state for one key.
#[derive(Debug, Default, Clone)]
pub struct CompiledEntry {
    /// Keys of pages whose compile used this file.
    pub dependents: BTreeSet<String>,
    pub standalone: Option<Arc<CompiledTree>>,
    pub child: Option<Arc<str>>,
    /// Block names of the standalone tree.
    pub blocks: BTreeSet<String>,
}

/// Cache key to [`CompiledEntry`].
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: BTreeMap<String, CompiledEntry>,
    policy: InvalidationPolicy,
}

impl TemplateCache {
    pub fn new(policy: InvalidationPolicy) -> Self {
        Self {
            entries: BTreeMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> InvalidationPolicy {
        self.policy
    }

    pub fn get(&self, key: &str) -> Option<&CompiledEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn standalone(&self, key: &str) -> Option<Arc<CompiledTree>> {
        self.entries.get(key)?.standalone.clone()
    }

    pub fn put_standalone(&mut self, key: &str, tree: Arc<CompiledTree>) {
        let entry = self.entry(key);
        entry.blocks = tree.blocks().clone();
        entry.standalone = Some(tree);
    }

    pub fn child(&self, key: &str) -> Option<Arc<str>> {
        self.entries.get(key)?.child.clone()
    }

    /// Stores a fragment body and records `dependent` as its user.
    pub fn put_child(&mut self, key: &str, fragment: Arc<str>, dependent: &str) {
        let entry = self.entry(key);
        entry.child = Some(fragment);
        entry.dependents.insert(dependent.to_string());
    }

    /// Records that compiling `dependent` used `key`.
    pub fn add_dependent(&mut self, key: &str, dependent: &str) {
        self.entry(key).dependents.insert(dependent.to_string());
    }

    /// Applies a change of `changed` under the cache policy.
    ///
    /// Returns the number of entries removed; a key the cache has never seen
    /// removes nothing.
    pub fn invalidate(&mut self, changed: &str) -> usize {
        if !self.entries.contains_key(changed) {
            return 0;
        }
        match self.policy {
            InvalidationPolicy::Wholesale => self.clear(),
            InvalidationPolicy::Targeted => {
                let mut removed = 0;
                let mut pending = vec![changed.to_string()];
                while let Some(key) = pending.pop() {
                    if let Some(entry) = self.entries.remove(&key) {
                        removed += 1;
                        pending.extend(
                            entry
                                .dependents
                                .into_iter()
                                .filter(|dep| self.entries.contains_key(dep)),
                        );
                    }
                }
                removed
            }
        }
    }

    /// Drops every entry, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn entry(&mut self, key: &str) -> &mut CompiledEntry {
        self.entries.entry(key.to_string()).or_default()
    }
}
