//! In-process object cache backed by moka.
//!
//! Useful when the application has no shared cache. The round-trip check
//! runs as usual; the autoload comparison only runs once a snapshot has
//! been stored in this process.

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;

use crate::error::CacheError;
use crate::health::cache::ObjectCache;

pub const MEMORY_CLIENT: &str = "moka";

#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Value>,
}

impl MemoryCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_entries).build(),
        }
    }

    fn key(group: &str, key: &str) -> String {
        format!("{}:{}", group, key)
    }
}

#[async_trait]
impl ObjectCache for MemoryCache {
    fn client_name(&self) -> Option<String> {
        Some(MEMORY_CLIENT.to_string())
    }

    async fn set(&self, group: &str, key: &str, value: Value) -> Result<bool, CacheError> {
        self.entries.insert(Self::key(group, key), value).await;
        Ok(true)
    }

    async fn get(&self, group: &str, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries.get(&Self::key(group, key)).await)
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.entries.invalidate_all();
        Ok(())
    }

    async fn connection_status(&self) -> Option<bool> {
        Some(true)
    }

    fn is_shared(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip() {
        let cache = MemoryCache::new(100);
        assert!(cache.set("default", "test", json!(1)).await.unwrap());
        assert_eq!(cache.get("default", "test").await.unwrap(), Some(json!(1)));
        assert_eq!(cache.get("options", "test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_flush_clears_entries() {
        let cache = MemoryCache::new(100);
        cache.set("default", "test", json!("x")).await.unwrap();
        cache.flush().await.unwrap();
        assert_eq!(cache.get("default", "test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reports_simple_status() {
        let cache = MemoryCache::new(10);
        assert!(cache.rich_diagnostics().await.is_none());
        assert_eq!(cache.connection_status().await, Some(true));
    }

    #[tokio::test]
    async fn test_empty_cache_reports_no_snapshot_drift() {
        use crate::health::cache::{CacheProbe, CACHE_NAMESPACE};
        use crate::health::datastore::DatastoreHandles;
        use crate::health::fakes::FakeDatastore;
        use crate::health::ErrorCollector;
        use std::sync::Arc;

        let cache = MemoryCache::new(10);
        assert!(!cache.is_shared());

        let mut datastore = FakeDatastore::healthy("Primary");
        datastore.autoload = vec![("siteurl".to_string(), "https://example.com".to_string())];
        let mut scratch = ErrorCollector::new("mysql");
        let mut session = DatastoreHandles::new(Arc::new(datastore))
            .connect(&mut scratch)
            .await
            .unwrap();

        let mut errors = ErrorCollector::new(CACHE_NAMESPACE);
        CacheProbe::new(&cache)
            .probe(&mut session, &mut errors, false)
            .await;
        assert!(!errors.has_errors());
    }
}
