//! Per-id resource registry
//!
//! A thin layer over [`DashMap`] shared by the session orchestrator and the
//! terminal manager. Every single-id mutation is atomic, which is what the
//! idempotent create paths rely on. No operation awaits.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Map from caller-supplied id to a shared entry handle
///
/// Entries are handed out by clone, so `E` is usually an `Arc<...>`.
pub struct Registry<E> {
    entries: DashMap<String, E>,
}

impl<E> std::fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<E: Clone> Registry<E> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether an entry exists for `id`
    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Get the entry for `id`
    pub fn get(&self, id: &str) -> Option<E> {
        self.entries.get(id).map(|r| r.value().clone())
    }

    /// Store `entry` under `id`, returning the entry it replaced
    pub fn set(&self, id: impl Into<String>, entry: E) -> Option<E> {
        self.entries.insert(id.into(), entry)
    }

    /// Remove and return the entry for `id`
    pub fn delete(&self, id: &str) -> Option<E> {
        self.entries.remove(id).map(|(_, entry)| entry)
    }

    /// Remove the entry for `id` only if `predicate` holds for it
    pub fn remove_if(&self, id: &str, predicate: impl FnOnce(&E) -> bool) -> Option<E> {
        self.entries
            .remove_if(id, |_, entry| predicate(entry))
            .map(|(_, entry)| entry)
    }

    /// Return the existing entry for `id`, or build and store a new one
    ///
    /// `make` runs only when `id` is vacant, under the same lock as the
    /// vacancy check, so two racing callers can never both build an entry.
    /// `make` must not touch this registry. Returns the entry and whether it
    /// was created by this call.
    pub fn insert_if_absent<Err>(
        &self,
        id: &str,
        make: impl FnOnce() -> std::result::Result<E, Err>,
    ) -> std::result::Result<(E, bool), Err> {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(occupied) => Ok((occupied.get().clone(), false)),
            Entry::Vacant(vacant) => {
                let entry = make()?;
                vacant.insert(entry.clone());
                Ok((entry, true))
            }
        }
    }

    /// All ids currently registered
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    /// All entries currently registered
    pub fn values(&self) -> Vec<E> {
        self.entries.iter().map(|r| r.value().clone()).collect()
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_registry_set_get_delete() {
        let registry: Registry<Arc<String>> = Registry::new();
        assert!(!registry.has("a"));
        assert!(registry.get("a").is_none());

        assert!(registry.set("a", Arc::new("first".to_string())).is_none());
        let replaced = registry.set("a", Arc::new("second".to_string()));
        assert_eq!(replaced.as_deref().map(String::as_str), Some("first"));
        assert_eq!(registry.len(), 1);

        let removed = registry.delete("a");
        assert_eq!(removed.as_deref().map(String::as_str), Some("second"));
        assert!(registry.is_empty());
        assert!(registry.delete("a").is_none());
    }

    #[test]
    fn test_registry_insert_if_absent_runs_once() {
        let registry: Registry<Arc<usize>> = Registry::new();
        let built = AtomicUsize::new(0);

        let make = || {
            built.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(Arc::new(7))
        };
        let (first, created) = registry.insert_if_absent("t1", make).unwrap();
        assert!(created);

        let (second, created) = registry
            .insert_if_absent("t1", || Ok::<_, ()>(Arc::new(8)))
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_insert_if_absent_error_leaves_vacant() {
        let registry: Registry<Arc<usize>> = Registry::new();
        let result = registry.insert_if_absent("t1", || Err("spawn failed"));
        assert_eq!(result.unwrap_err(), "spawn failed");
        assert!(!registry.has("t1"));
    }

    #[test]
    fn test_registry_remove_if() {
        let registry: Registry<u64> = Registry::new();
        registry.set("t1", 2);

        assert!(registry.remove_if("t1", |instance| *instance == 1).is_none());
        assert!(registry.has("t1"));
        assert_eq!(registry.remove_if("t1", |instance| *instance == 2), Some(2));
        assert!(!registry.has("t1"));
    }

    #[test]
    fn test_registry_ids() {
        let registry: Registry<u8> = Registry::new();
        registry.set("b", 1);
        registry.set("a", 2);
        let mut ids = registry.ids();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.values().len(), 2);
    }
}
