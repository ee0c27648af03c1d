//! Per-subsystem error accumulation.

use serde_json::{Map, Value};

/// Ordered slug -> message entries for one subsystem.
///
/// One collector exists per namespace per evaluation. Reusing a slug replaces
/// its message in place; new slugs are appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCollector {
    namespace: &'static str,
    entries: Vec<(String, String)>,
}

impl ErrorCollector {
    pub fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            entries: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn add(&mut self, slug: impl Into<String>, message: impl Into<String>) {
        let slug = slug.into();
        let message = message.into();
        tracing::warn!(
            namespace = self.namespace,
            slug = %slug,
            message = %message,
            "Health check recorded error"
        );
        match self.entries.iter_mut().find(|(existing, _)| *existing == slug) {
            Some(entry) => entry.1 = message,
            None => self.entries.push((slug, message)),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, slug: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == slug)
            .map(|(_, message)| message.as_str())
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(slug, _)| slug.as_str())
    }

    /// All entries as a JSON object in recording order, or `null` when
    /// nothing was recorded.
    pub fn all(&self) -> Value {
        if self.entries.is_empty() {
            return Value::Null;
        }
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(slug, message)| (slug.clone(), Value::String(message.clone())))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collector_serializes_null() {
        let errors = ErrorCollector::new("mysql");
        assert!(!errors.has_errors());
        assert_eq!(errors.all(), Value::Null);
    }

    #[test]
    fn test_add_appends_distinct_slugs() {
        let mut errors = ErrorCollector::new("cache");
        errors.add("object-cache-unable-to-set", "Unable to set object cache value.");
        errors.add("object-cache-unable-to-get", "Unable to get object cache value.");
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.slugs().collect::<Vec<_>>(),
            vec!["object-cache-unable-to-set", "object-cache-unable-to-get"]
        );
    }

    #[test]
    fn test_add_same_slug_overwrites() {
        let mut errors = ErrorCollector::new("mysql");
        errors.add("mysql-has-error", "first");
        errors.add("mysql-has-error", "second");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("mysql-has-error"), Some("second"));
    }

    #[test]
    fn test_all_renders_object() {
        let mut errors = ErrorCollector::new("mysql");
        errors.add("mysql-processlist-failed", "Unable to get process list. ");
        assert_eq!(
            errors.all(),
            serde_json::json!({"mysql-processlist-failed": "Unable to get process list. "})
        );
    }

    #[test]
    fn test_all_keeps_recording_order() {
        let mut errors = ErrorCollector::new("cache");
        errors.add("object-cache-unable-to-set", "set");
        errors.add("object-cache-alloptions", "snapshot");
        errors.add("object-cache-unable-to-set", "set again");
        assert_eq!(
            serde_json::to_string(&errors.all()).unwrap(),
            r#"{"object-cache-unable-to-set":"set again","object-cache-alloptions":"snapshot"}"#
        );
    }
}
