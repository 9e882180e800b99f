//! In-process record of collections known to exist.

use mea::mutex::{Mutex, MutexGuard};
use std::{collections::HashSet, fmt};

/// Set of collection names observed to exist, owned by an engine instance.
///
/// Entries are added once a collection is verified or created and are never evicted. The
/// set sits behind an async mutex that callers hold across the whole
/// check-create-insert sequence, so two tasks bootstrapping the same collection never both
/// issue a create call.
///
/// Engines get their own cache by default. Share one explicitly through
/// [`ModelBuilder::cache`](crate::model::ModelBuilder::cache) when several engines talk to
/// the same database.
pub struct CollectionCache {
    known: Mutex<HashSet<String>>,
}

impl CollectionCache {
    pub fn new() -> Self {
        Self { known: Mutex::new(HashSet::new()) }
    }

    /// Returns `true` if the collection is already known to exist.
    pub async fn contains(&self, name: &str) -> bool {
        self.known.lock().await.contains(name)
    }

    /// Marks a collection as existing without touching the database.
    pub async fn insert(&self, name: impl Into<String>) {
        self.known.lock().await.insert(name.into());
    }

    /// Number of collections known to exist.
    pub async fn len(&self) -> usize {
        self.known.lock().await.len()
    }

    /// Locks the cache for a check-then-insert sequence.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.known.lock().await
    }
}

impl fmt::Debug for CollectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionCache").finish_non_exhaustive()
    }
}

impl Default for CollectionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_are_kept_once_inserted() {
        let cache = CollectionCache::new();
        assert!(!cache.contains("users").await);

        cache.insert("users").await;
        cache.insert("users").await;

        assert!(cache.contains("users").await);
        assert_eq!(cache.len().await, 1);
    }
}
