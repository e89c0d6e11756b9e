//! Last known-good base address per resource class

use std::sync::Arc;

use tracing::{debug, info};

use crate::store::KeyValueStore;
use crate::Result;

/// Store key prefix; the resource class is appended
pub const CACHE_KEY_PREFIX: &str = "wayfarer.endpoint.";

/// Persistent `resource class -> base address` mapping
///
/// Entries are written on every confirmed discovery and never expire. A
/// stale entry is simply the first candidate of the next probe.
#[derive(Clone)]
pub struct EndpointCache {
    store: Arc<dyn KeyValueStore>,
}

impl EndpointCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn key_for(resource_class: &str) -> String {
        format!("{}{}", CACHE_KEY_PREFIX, resource_class)
    }

    /// Cached base for `resource_class`, ignoring blank entries
    pub fn get(&self, resource_class: &str) -> Option<String> {
        self.store
            .get(&Self::key_for(resource_class))
            .map(|base| base.trim().to_string())
            .filter(|base| !base.is_empty())
    }

    /// Remember `base` as the working address for `resource_class`
    pub fn record(&self, resource_class: &str, base: &str) -> Result<()> {
        if self.get(resource_class).as_deref() == Some(base) {
            debug!(resource_class, candidate = base, "Endpoint cache already current");
            return Ok(());
        }
        self.store.set(&Self::key_for(resource_class), base)?;
        info!(resource_class, candidate = base, "Endpoint cache updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_record_and_get() {
        let store = Arc::new(MemoryStore::new());
        let cache = EndpointCache::new(store.clone());
        assert!(cache.get("posts-list").is_none());

        cache.record("posts-list", "http://10.0.0.5:8080/api").unwrap();
        assert_eq!(cache.get("posts-list").as_deref(), Some("http://10.0.0.5:8080/api"));
        assert_eq!(
            store.get("wayfarer.endpoint.posts-list").as_deref(),
            Some("http://10.0.0.5:8080/api")
        );
        assert!(cache.get("media-file").is_none());
    }

    #[test]
    fn test_overwrite() {
        let cache = EndpointCache::new(Arc::new(MemoryStore::new()));
        cache.record("media-file", "http://a.test").unwrap();
        cache.record("media-file", "http://b.test").unwrap();
        assert_eq!(cache.get("media-file").as_deref(), Some("http://b.test"));
    }

    #[test]
    fn test_blank_entry_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.set("wayfarer.endpoint.posts-list", "  ").unwrap();
        assert!(EndpointCache::new(store).get("posts-list").is_none());
    }
}
