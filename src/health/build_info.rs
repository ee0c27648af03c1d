//! Build provenance from the `.info` artifact.
//!
//! The artifact is a JSON object written by the deploy pipeline, e.g.
//! `{"commit": "4f1c2d9e...", "version": "2024.11.3"}`. Reading it is
//! best-effort: every failure becomes a descriptive string in place of the
//! value and never touches the summary status.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde_json::Value;

use super::SectionResult;

/// File name of the artifact inside the build root
pub const BUILD_INFO_FILE: &str = ".info";

/// Placeholder for a field that is present but empty
pub const EMPTY_FIELD: &str = "(empty)";

/// Length of the abbreviated commit hash
pub const SHORT_COMMIT_LEN: usize = 7;

#[derive(Debug, Clone)]
pub struct BuildInfoReader {
    root: String,
}

impl BuildInfoReader {
    /// `root` is the directory holding the artifact; a trailing `/` is added
    /// when missing.
    pub fn new(root: impl Into<String>) -> Self {
        let mut root = root.into();
        if !root.ends_with('/') {
            root.push('/');
        }
        Self { root }
    }

    /// Path of the artifact as shown in error strings.
    pub fn display_path(&self) -> String {
        format!("{}{}", self.root, BUILD_INFO_FILE)
    }

    fn path(&self) -> PathBuf {
        PathBuf::from(self.display_path())
    }

    /// Read one field from the artifact.
    ///
    /// The file is read on every call so repeated reads see the same data.
    pub fn read(&self, key: &str) -> String {
        let contents = match std::fs::read_to_string(self.path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return format!("Error: '{}' doesn't exist", self.display_path());
            }
            Err(e) => {
                return format!("Error: can't read '{}'; {}", self.display_path(), e);
            }
        };

        let data: Value = match serde_json::from_str(&contents) {
            Ok(data) => data,
            Err(e) => {
                return format!("Error: can't parse '{}'; {}", self.display_path(), e);
            }
        };

        match data.get(key) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(true)) => "1".to_string(),
            _ => EMPTY_FIELD.to_string(),
        }
    }

    /// Build the `build` section.
    pub fn probe(&self) -> SectionResult {
        let mut result = SectionResult::new();
        result.insert("commit", abbreviate_commit(self.read("commit")));
        result.insert("version", self.read("version"));
        result
    }
}

fn abbreviate_commit(commit: String) -> String {
    if commit.contains("Error:") || commit == EMPTY_FIELD {
        return commit;
    }
    commit.chars().take(SHORT_COMMIT_LEN).collect()
}
