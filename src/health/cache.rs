//! Object cache probe.
//!
//! Verifies the cache is writable and readable with a sentinel round-trip,
//! then cross-checks the cached snapshot of the autoload set against the rows
//! in the datastore. Nothing here is fatal: every problem becomes an entry in
//! the cache error collector.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::CacheError;

use super::datastore::DatastoreSession;
use super::errors::ErrorCollector;
use super::{SectionResult, STATUS_UNKNOWN};

/// Collector namespace for cache errors
pub const CACHE_NAMESPACE: &str = "cache";

/// Slug prefix for cache errors
pub const CACHE_SLUG_PREFIX: &str = "object-cache";

/// Sentinel written and read back on every evaluation
pub const SENTINEL_GROUP: &str = "default";
pub const SENTINEL_KEY: &str = "test";

/// Bulk snapshot of the autoload set
pub const SNAPSHOT_GROUP: &str = "options";
pub const SNAPSHOT_KEY: &str = "alloptions";

pub const STATUS_CONNECTED: &str = "CONNECTED";
pub const STATUS_NOT_CONNECTED: &str = "NOT CONNECTED";

/// Detailed report from a backend that can describe itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichDiagnostics {
    pub connector: String,
    pub cache: String,
    pub status: String,
    pub compressions: String,
    pub driver: String,
    pub serializer: String,
}

/// An object cache backend.
///
/// `rich_diagnostics` and `connection_status` are optional capabilities;
/// backends that cannot answer keep the default `None`.
#[async_trait]
pub trait ObjectCache: Send + Sync {
    /// Identifier of the backing client, reported as `client`.
    fn client_name(&self) -> Option<String>;

    /// Store a value. `Ok(false)` means the backend refused the write.
    async fn set(&self, group: &str, key: &str, value: Value) -> Result<bool, CacheError>;

    async fn get(&self, group: &str, key: &str) -> Result<Option<Value>, CacheError>;

    async fn flush(&self) -> Result<(), CacheError>;

    async fn rich_diagnostics(&self) -> Option<RichDiagnostics> {
        None
    }

    async fn connection_status(&self) -> Option<bool> {
        None
    }

    /// Whether other processes populate this cache. A process-local cache
    /// never holds the autoload snapshot unless this process wrote it.
    fn is_shared(&self) -> bool {
        true
    }
}

/// Which diagnostics API a backend offers, detected once per evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCapability {
    RichDiagnostics(RichDiagnostics),
    SimpleStatus { connected: bool },
    Unknown,
}

impl CacheCapability {
    /// Prefer rich diagnostics, then a connected flag, else unknown.
    pub async fn detect(cache: &dyn ObjectCache) -> Self {
        if let Some(diagnostics) = cache.rich_diagnostics().await {
            return CacheCapability::RichDiagnostics(diagnostics);
        }
        match cache.connection_status().await {
            Some(connected) => CacheCapability::SimpleStatus { connected },
            None => CacheCapability::Unknown,
        }
    }

    fn apply(self, result: &mut SectionResult) {
        match self {
            CacheCapability::RichDiagnostics(d) => {
                result.insert("cache", d.cache);
                result.insert("compressions", d.compressions);
                result.insert("connector", d.connector);
                result.insert("driver", d.driver);
                result.insert("serializer", d.serializer);
                result.insert("status", d.status);
            }
            CacheCapability::SimpleStatus { connected } => {
                let status = if connected {
                    STATUS_CONNECTED
                } else {
                    STATUS_NOT_CONNECTED
                };
                result.insert("status", status);
            }
            CacheCapability::Unknown => result.insert("status", STATUS_UNKNOWN),
        }
    }
}

/// Runs the cache checks, counting hits and misses of its own reads.
pub struct CacheProbe<'a> {
    cache: &'a dyn ObjectCache,
    hits: u64,
    misses: u64,
}

impl<'a> CacheProbe<'a> {
    pub fn new(cache: &'a dyn ObjectCache) -> Self {
        Self {
            cache,
            hits: 0,
            misses: 0,
        }
    }

    async fn get(&mut self, group: &str, key: &str) -> Option<Value> {
        match self.cache.get(group, key).await {
            Ok(Some(value)) => {
                self.hits += 1;
                Some(value)
            }
            Ok(None) => {
                self.misses += 1;
                None
            }
            Err(e) => {
                tracing::warn!(group, key, error = %e, "Object cache read failed");
                self.misses += 1;
                None
            }
        }
    }

    /// Build the `object_cache` section.
    ///
    /// `flush` must only be true for an explicit, privileged request.
    pub async fn probe(
        mut self,
        datastore: &mut DatastoreSession,
        errors: &mut ErrorCollector,
        flush: bool,
    ) -> SectionResult {
        self.check_round_trip(errors).await;
        self.check_autoload_snapshot(datastore, errors).await;

        let mut result = SectionResult::new();
        result.insert("cache", Value::Null);
        result.insert("client", self.cache.client_name());
        result.insert("flush", Value::Null);
        result.insert("hits", self.hits);
        result.insert("misses", self.misses);

        CacheCapability::detect(self.cache).await.apply(&mut result);

        result.insert("errors", errors.all());

        if flush {
            result.insert("flush", self.flush().await);
        }

        result
    }

    async fn check_round_trip(&mut self, errors: &mut ErrorCollector) {
        let sentinel = json!(1);

        match self.cache.set(SENTINEL_GROUP, SENTINEL_KEY, sentinel.clone()).await {
            Ok(true) => {}
            Ok(false) => errors.add(slug("unable-to-set"), "Unable to set object cache value."),
            Err(e) => errors.add(
                slug("unable-to-set"),
                format!("Unable to set object cache value. {}", e),
            ),
        }

        if self.get(SENTINEL_GROUP, SENTINEL_KEY).await.as_ref() != Some(&sentinel) {
            errors.add(slug("unable-to-get"), "Unable to get object cache value.");
        }
    }

    async fn check_autoload_snapshot(
        &mut self,
        datastore: &mut DatastoreSession,
        errors: &mut ErrorCollector,
    ) {
        let rows = match datastore.autoload_options().await {
            Ok(rows) => rows,
            Err(e) => {
                errors.add(
                    slug("alloptions-db"),
                    format!("Unable to read autoloaded options from the datastore. {}", e),
                );
                return;
            }
        };

        let snapshot = match self.get(SNAPSHOT_GROUP, SNAPSHOT_KEY).await {
            Some(Value::Object(map)) => map,
            None if !self.cache.is_shared() => {
                tracing::debug!(
                    client = ?self.cache.client_name(),
                    "Process-local cache holds no autoload snapshot, skipping comparison"
                );
                return;
            }
            _ => {
                errors.add(
                    slug("alloptions"),
                    format!("Cache lookup for `{}` returned no snapshot.", SNAPSHOT_KEY),
                );
                return;
            }
        };

        // Every row is checked so the full drift picture is reported
        for (option, db_value) in &rows {
            let Some(cached) = snapshot.get(option) else {
                errors.add(
                    slug(&format!("alloptions-option-{}", option)),
                    format!("{} option not found in cache", option),
                );
                continue;
            };

            if normalize_scalar(cached).as_deref() != Some(db_value.as_str()) {
                errors.add(
                    slug(&format!("alloptions-cache_value-{}", option)),
                    format!("{} value not the same in cache and DB.", option),
                );
            }
        }

        tracing::debug!(
            options = rows.len(),
            drift = errors.len(),
            "Compared autoload set against cache snapshot"
        );
    }

    async fn flush(&self) -> String {
        match self.cache.flush().await {
            Ok(()) => {
                tracing::warn!(client = ?self.cache.client_name(), "Object cache flushed on request");
                "Object cache flushed.".to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Object cache flush failed");
                format!("Object cache could not be flushed. {}", e)
            }
        }
    }
}

fn slug(suffix: &str) -> String {
    format!("{}-{}", CACHE_SLUG_PREFIX, suffix)
}

/// String form of a cached scalar, matching how the datastore stores it.
///
/// Datastore columns are always strings while cached values keep their
/// scalar type, so numbers and booleans are stringified before comparison.
/// Non-scalars have no string form and never match.
pub fn normalize_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some(String::new()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
