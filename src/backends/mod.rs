//! Concrete datastore and object cache backends.
//!
//! The health engine only sees the [`Datastore`](crate::health::datastore::Datastore)
//! and [`ObjectCache`](crate::health::cache::ObjectCache) traits; this module
//! builds the implementations selected in configuration.

pub mod memory;
pub mod mysql;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, CacheBackend};
use crate::error::{CacheError, DatastoreError};
use crate::health::cache::ObjectCache;
use crate::health::datastore::DatastoreHandles;

pub use self::memory::MemoryCache;
pub use self::mysql::MySqlDatastore;
pub use self::redis::RedisCache;

/// Handle name reported for the primary datastore
pub const PRIMARY_HANDLE: &str = "primary";

/// Handle name reported for the fallback datastore
pub const FALLBACK_HANDLE: &str = "fallback";

/// Build the datastore handles from `[datastore]`.
///
/// Pools connect lazily so an unreachable server surfaces in the health
/// payload instead of failing startup.
pub fn datastore_from_config(config: &AppConfig) -> Result<DatastoreHandles, DatastoreError> {
    let settings = &config.datastore;
    let timeout = Duration::from_secs(settings.connect_timeout_seconds);

    let primary = MySqlDatastore::connect_lazy(
        PRIMARY_HANDLE,
        &settings.url,
        &settings.options_table,
        settings.max_connections,
        timeout,
    )?;
    let mut handles = DatastoreHandles::new(Arc::new(primary));

    if let Some(url) = &settings.fallback_url {
        let fallback = MySqlDatastore::connect_lazy(
            FALLBACK_HANDLE,
            url,
            &settings.options_table,
            settings.max_connections,
            timeout,
        )?;
        handles = handles.with_fallback(Arc::new(fallback));
    }

    Ok(handles)
}

/// Build the object cache selected by `[cache]`.
pub fn cache_from_config(config: &AppConfig) -> Result<Arc<dyn ObjectCache>, CacheError> {
    let settings = &config.cache;
    match settings.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new(settings.max_entries))),
        CacheBackend::Redis => {
            let url = settings
                .url
                .as_deref()
                .ok_or_else(|| CacheError::Backend("cache.url is required for redis".to_string()))?;
            Ok(Arc::new(RedisCache::open(url, &settings.key_prefix)?))
        }
    }
}
