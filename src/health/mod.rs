//! Health-aggregation engine.
//!
//! Probes the datastore, the object cache, the runtime, the platform and the
//! build artifact, then reconciles their results into one payload with a
//! summary status. Every evaluation is request-scoped: error collectors, the
//! timer and the query counter are created fresh for each call to
//! [`HealthChecker::evaluate`].

pub mod aggregator;
pub mod build_info;
pub mod cache;
pub mod datastore;
pub mod errors;
pub mod hooks;
pub mod platform;
pub mod request;
pub mod runtime;
pub mod timer;

#[cfg(test)]
pub(crate) mod fakes;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

pub use aggregator::{HealthChecker, HealthEvaluation, HealthReport, Phase};
pub use errors::ErrorCollector;
pub use request::{HealthRequest, OutputFormat};
pub use timer::Timer;

/// Text used wherever a fact could not be determined.
pub const STATUS_UNKNOWN: &str = "UNKNOWN";

/// Coarse verdict for the whole evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "FAILURE")]
    Failure,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warn => "WARN",
            Status::Failure => "FAILURE",
            Status::Unknown => STATUS_UNKNOWN,
        }
    }

    /// Map an HTTP-status-like code onto a summary status.
    pub fn from_code(code: u16) -> Self {
        match code {
            200..=299 => Status::Ok,
            400..=499 => Status::Warn,
            500..=599 => Status::Failure,
            _ => Status::Unknown,
        }
    }

    /// Derive the summary status for an evaluation.
    ///
    /// Errors in both the datastore and the cache collectors read as WARN no
    /// matter what the code says; otherwise the code decides.
    pub fn summarize(code: u16, datastore: &ErrorCollector, cache: &ErrorCollector) -> Self {
        if datastore.has_errors() && cache.has_errors() {
            Status::Warn
        } else {
            Status::from_code(code)
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named block of the response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Build,
    Mysql,
    ObjectCache,
    Php,
    Wp,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Build,
        Section::Mysql,
        Section::ObjectCache,
        Section::Php,
        Section::Wp,
    ];

    /// Key of this section in the response payload.
    pub fn key(&self) -> &'static str {
        match self {
            Section::Build => "build",
            Section::Mysql => "mysql",
            Section::ObjectCache => "object_cache",
            Section::Php => "php",
            Section::Wp => "wp",
        }
    }

    /// Query parameters that opt into this section.
    pub fn flags(&self) -> &'static [&'static str] {
        match self {
            Section::Build => &["build"],
            Section::Mysql => &["mysql"],
            Section::ObjectCache => &["object_cache", "redis"],
            Section::Php => &["php"],
            Section::Wp => &["wp"],
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Field set produced by one probe, always serialized in key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SectionResult(BTreeMap<String, Value>);

impl SectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_code_ranges() {
        assert_eq!(Status::from_code(200), Status::Ok);
        assert_eq!(Status::from_code(299), Status::Ok);
        assert_eq!(Status::from_code(416), Status::Warn);
        assert_eq!(Status::from_code(503), Status::Failure);
        assert_eq!(Status::from_code(302), Status::Unknown);
        assert_eq!(Status::from_code(0), Status::Unknown);
        assert_eq!(Status::from_code(600), Status::Unknown);
    }

    #[test]
    fn test_summarize_dual_subsystem_errors_is_warn() {
        let mut mysql = ErrorCollector::new("mysql");
        let mut cache = ErrorCollector::new("cache");
        mysql.add("mysql-has-error", "gone away");
        cache.add("object-cache-unable-to-set", "nope");
        assert_eq!(Status::summarize(200, &mysql, &cache), Status::Warn);
        assert_eq!(Status::summarize(503, &mysql, &cache), Status::Warn);
    }

    #[test]
    fn test_summarize_single_subsystem_uses_code() {
        let mut mysql = ErrorCollector::new("mysql");
        let cache = ErrorCollector::new("cache");
        mysql.add("mysql-has-error", "gone away");
        assert_eq!(Status::summarize(200, &mysql, &cache), Status::Ok);
        assert_eq!(Status::summarize(503, &mysql, &cache), Status::Failure);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Status::Warn).unwrap(), "\"WARN\"");
        assert_eq!(Status::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn test_section_result_sorted_keys() {
        let mut result = SectionResult::new();
        result.insert("version", "1.0");
        result.insert("memory_limit", "512M");
        result.insert("arch", "x86_64");
        let keys: Vec<&str> = result.keys().collect();
        assert_eq!(keys, vec!["arch", "memory_limit", "version"]);
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"arch":"x86_64","memory_limit":"512M","version":"1.0"}"#
        );
    }

    #[test]
    fn test_cache_section_accepts_redis_alias() {
        assert!(Section::ObjectCache.flags().contains(&"redis"));
        assert_eq!(Section::ObjectCache.key(), "object_cache");
    }
}
