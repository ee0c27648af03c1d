//! Parsed view of an incoming health request.

use std::collections::{BTreeSet, HashMap};

use http::header::CONTENT_TYPE;
use http::HeaderMap;

use super::Section;

/// Values of the `cli` parameter that request a cache flush
pub const FLUSH_COMMANDS: [&str; 2] = ["flush", "flushdb"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Html,
}

/// Which sections to run and how to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthRequest {
    pub sections: BTreeSet<Section>,
    pub format: OutputFormat,
    /// A flush was asked for; still subject to the caller's privilege
    pub flush_requested: bool,
    /// Caller holds an elevated token
    pub elevated: bool,
}

impl HealthRequest {
    /// Build from query parameters and headers.
    ///
    /// A section runs only when one of its flags is present and truthy.
    pub fn from_parts(query: &HashMap<String, String>, headers: &HeaderMap) -> Self {
        let sections = Section::ALL
            .into_iter()
            .filter(|section| {
                section
                    .flags()
                    .iter()
                    .any(|flag| query.get(*flag).is_some_and(|v| is_truthy(v)))
            })
            .collect();

        let wants_json = query.contains_key("json")
            || headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case("application/json"));

        let flush_requested = query
            .get("cli")
            .is_some_and(|v| FLUSH_COMMANDS.contains(&v.as_str()));

        Self {
            sections,
            format: if wants_json {
                OutputFormat::Json
            } else {
                OutputFormat::Html
            },
            flush_requested,
            elevated: false,
        }
    }

    /// A request for the given sections, answered as JSON.
    pub fn with_sections(sections: impl IntoIterator<Item = Section>) -> Self {
        Self {
            sections: sections.into_iter().collect(),
            format: OutputFormat::Json,
            flush_requested: false,
            elevated: false,
        }
    }

    pub fn elevated(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }

    pub fn wants(&self, section: Section) -> bool {
        self.sections.contains(&section)
    }

    /// A flush only runs for an explicit request by an elevated caller.
    pub fn should_flush(&self) -> bool {
        self.flush_requested && self.elevated
    }
}

/// Boolean parsing for query flags: `1`, `true`, `on`, `yes` (any case).
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
