//! Primary datastore probe.
//!
//! The connection gate runs on every evaluation: it checks the primary driver,
//! falls back once to the high-availability driver when the primary cannot
//! connect, and raises [`HealthError::Fatal`] when neither is reachable. The
//! `mysql` section detail (process list, handle names, query count) only runs
//! when the caller asked for it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DatastoreError, HealthError};

use super::errors::ErrorCollector;
use super::{SectionResult, STATUS_UNKNOWN};

/// Collector namespace and slug prefix for datastore errors
pub const DATASTORE_NAMESPACE: &str = "mysql";

/// Result of a non-throwing connection check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub connected: bool,
    /// Last error the driver surfaced during the check, if any
    pub last_error: Option<String>,
}

impl ConnectOutcome {
    pub fn connected() -> Self {
        Self {
            connected: true,
            last_error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            last_error: Some(error.into()),
        }
    }
}

/// A handle on the primary datastore.
///
/// Implementations must not surface driver failures from `connect_check`;
/// they report them through [`ConnectOutcome::last_error`] instead.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Name of the handle type, reported as `instance`.
    fn handle_name(&self) -> String;

    /// Name of the underlying driver connection, reported as `extension`.
    /// `None` when no live connection object exists.
    fn driver_name(&self) -> Option<String>;

    async fn connect_check(&self) -> ConnectOutcome;

    /// Number of rows in the active server process list.
    async fn process_list(&self) -> Result<usize, DatastoreError>;

    /// All configuration rows flagged for automatic loading, as (name, value).
    async fn autoload_options(&self) -> Result<Vec<(String, String)>, DatastoreError>;

    /// Value of a single configuration row.
    async fn option_value(&self, name: &str) -> Result<Option<String>, DatastoreError>;
}

/// The primary driver and the optional high-availability variant.
#[derive(Clone)]
pub struct DatastoreHandles {
    primary: Arc<dyn Datastore>,
    fallback: Option<Arc<dyn Datastore>>,
}

impl DatastoreHandles {
    pub fn new(primary: Arc<dyn Datastore>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Datastore>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Run the connection gate.
    ///
    /// A `last_error` from either driver is recorded as `mysql-has-error` and
    /// does not stop the evaluation. A driver that fails to connect outright
    /// triggers one fallback attempt; if that is unavailable or also fails the
    /// evaluation is aborted with a 503.
    pub async fn connect(&self, errors: &mut ErrorCollector) -> Result<DatastoreSession, HealthError> {
        let outcome = self.primary.connect_check().await;
        if let Some(last_error) = &outcome.last_error {
            errors.add(slug("has-error"), last_error.clone());
        }

        if outcome.connected {
            return Ok(DatastoreSession::new(self.primary.clone(), false));
        }

        let Some(fallback) = &self.fallback else {
            tracing::error!(
                instance = %self.primary.handle_name(),
                "Datastore unreachable and no fallback driver configured"
            );
            return Err(HealthError::unavailable(unreachable_message(&outcome)));
        };

        tracing::warn!(
            primary = %self.primary.handle_name(),
            fallback = %fallback.handle_name(),
            "Primary datastore did not connect, trying fallback driver"
        );

        let fallback_outcome = fallback.connect_check().await;
        if let Some(last_error) = &fallback_outcome.last_error {
            errors.add(slug("fallback-has-error"), last_error.clone());
        }

        if fallback_outcome.connected {
            Ok(DatastoreSession::new(fallback.clone(), true))
        } else {
            tracing::error!(
                fallback = %fallback.handle_name(),
                "Fallback datastore driver did not connect"
            );
            Err(HealthError::unavailable(unreachable_message(&fallback_outcome)))
        }
    }
}

fn unreachable_message(outcome: &ConnectOutcome) -> String {
    match &outcome.last_error {
        Some(error) => format!("Application loaded, but could not connect to the db. {}", error),
        None => "Application loaded, but could not connect to the db.".to_string(),
    }
}

fn slug(suffix: &str) -> String {
    format!("{}-{}", DATASTORE_NAMESPACE, suffix)
}

/// A connected datastore handle scoped to one evaluation.
///
/// Every query issued through the session is counted.
pub struct DatastoreSession {
    handle: Arc<dyn Datastore>,
    queries: u64,
    used_fallback: bool,
}

impl DatastoreSession {
    fn new(handle: Arc<dyn Datastore>, used_fallback: bool) -> Self {
        Self {
            handle,
            queries: 0,
            used_fallback,
        }
    }

    pub fn query_count(&self) -> u64 {
        self.queries
    }

    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    pub fn handle_name(&self) -> String {
        self.handle.handle_name()
    }

    pub async fn process_list(&mut self) -> Result<usize, DatastoreError> {
        self.queries += 1;
        self.handle.process_list().await
    }

    pub async fn autoload_options(&mut self) -> Result<Vec<(String, String)>, DatastoreError> {
        self.queries += 1;
        self.handle.autoload_options().await
    }

    pub async fn option_value(&mut self, name: &str) -> Result<Option<String>, DatastoreError> {
        self.queries += 1;
        self.handle.option_value(name).await
    }

    /// Build the `mysql` section.
    pub async fn probe(&mut self, errors: &mut ErrorCollector) -> SectionResult {
        match self.process_list().await {
            Ok(rows) if rows > 0 => {
                tracing::debug!(rows, "Datastore process list retrieved");
            }
            Ok(_) => errors.add(slug("processlist-failed"), "Unable to get process list. "),
            Err(e) => errors.add(
                slug("processlist-failed"),
                format!("Unable to get process list. {}", e),
            ),
        }

        let mut result = SectionResult::new();
        result.insert("errors", errors.all());
        result.insert(
            "extension",
            self.handle
                .driver_name()
                .unwrap_or_else(|| STATUS_UNKNOWN.to_string()),
        );
        result.insert("instance", self.handle.handle_name());
        result.insert("num_queries", self.queries);
        result.insert("status", "OK");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::fakes::FakeDatastore;

    fn collector() -> ErrorCollector {
        ErrorCollector::new(DATASTORE_NAMESPACE)
    }

    #[tokio::test]
    async fn test_connect_primary_ok() {
        let handles = DatastoreHandles::new(Arc::new(FakeDatastore::healthy("Primary")));
        let mut errors = collector();
        let session = handles.connect(&mut errors).await.unwrap();
        assert!(!session.used_fallback());
        assert_eq!(session.handle_name(), "Primary");
        assert!(!errors.has_errors());
    }

    #[tokio::test]
    async fn test_last_error_is_recorded_not_fatal() {
        let mut primary = FakeDatastore::healthy("Primary");
        primary.outcome.last_error = Some("Lost connection during query".to_string());
        let handles = DatastoreHandles::new(Arc::new(primary));
        let mut errors = collector();
        assert!(handles.connect(&mut errors).await.is_ok());
        assert_eq!(
            errors.get("mysql-has-error"),
            Some("Lost connection during query")
        );
    }

    #[tokio::test]
    async fn test_unreachable_without_fallback_is_fatal() {
        let handles = DatastoreHandles::new(Arc::new(FakeDatastore::unreachable("Primary")));
        let mut errors = collector();
        let err = handles.connect(&mut errors).await.err().unwrap();
        assert_eq!(err.status(), http::StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().contains("could not connect to the db"));
    }

    #[tokio::test]
    async fn test_fallback_connects() {
        let handles = DatastoreHandles::new(Arc::new(FakeDatastore::unreachable("Primary")))
            .with_fallback(Arc::new(FakeDatastore::healthy("Replica")));
        let mut errors = collector();
        let session = handles.connect(&mut errors).await.unwrap();
        assert!(session.used_fallback());
        assert_eq!(session.handle_name(), "Replica");
        // Primary failure stays visible as a degraded signal
        assert!(errors.get("mysql-has-error").is_some());
    }

    #[tokio::test]
    async fn test_fallback_also_unreachable_is_fatal() {
        let handles = DatastoreHandles::new(Arc::new(FakeDatastore::unreachable("Primary")))
            .with_fallback(Arc::new(FakeDatastore::unreachable("Replica")));
        let mut errors = collector();
        assert!(handles.connect(&mut errors).await.is_err());
    }

    #[tokio::test]
    async fn test_probe_healthy_section() {
        let handles = DatastoreHandles::new(Arc::new(FakeDatastore::healthy("Primary")));
        let mut errors = collector();
        let mut session = handles.connect(&mut errors).await.unwrap();
        let section = session.probe(&mut errors).await;

        assert_eq!(section.get("status").unwrap(), "OK");
        assert!(section.get("errors").unwrap().is_null());
        assert_eq!(section.get("instance").unwrap(), "Primary");
        assert_eq!(section.get("extension").unwrap(), "FakeConnection");
        assert_eq!(section.get("num_queries").unwrap(), 1);
        let keys: Vec<&str> = section.keys().collect();
        assert_eq!(keys, vec!["errors", "extension", "instance", "num_queries", "status"]);
    }

    #[tokio::test]
    async fn test_probe_empty_process_list_records_error() {
        let mut primary = FakeDatastore::healthy("Primary");
        primary.process_rows = Ok(0);
        primary.driver = None;
        let handles = DatastoreHandles::new(Arc::new(primary));
        let mut errors = collector();
        let mut session = handles.connect(&mut errors).await.unwrap();
        let section = session.probe(&mut errors).await;

        assert!(errors.get("mysql-processlist-failed").is_some());
        assert_eq!(section.get("extension").unwrap(), "UNKNOWN");
        assert!(section.get("errors").unwrap().is_object());
        assert_eq!(section.get("status").unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_probe_process_list_error_includes_detail() {
        let mut primary = FakeDatastore::healthy("Primary");
        primary.process_rows = Err("Access denied".to_string());
        let handles = DatastoreHandles::new(Arc::new(primary));
        let mut errors = collector();
        let mut session = handles.connect(&mut errors).await.unwrap();
        session.probe(&mut errors).await;

        let message = errors.get("mysql-processlist-failed").unwrap();
        assert!(message.starts_with("Unable to get process list."));
        assert!(message.contains("Access denied"));
    }
}
