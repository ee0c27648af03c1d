//! Runtime facts for the `php` section.

use super::SectionResult;

/// Reported when no memory ceiling is configured
pub const UNLIMITED_MEMORY: &str = "-1";

/// Pure read of the memory ceiling and the running service version.
#[derive(Debug, Clone)]
pub struct RuntimeProbe {
    memory_limit: Option<String>,
    version: &'static str,
}

impl RuntimeProbe {
    pub fn new(memory_limit: Option<String>) -> Self {
        Self {
            memory_limit,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn probe(&self) -> SectionResult {
        let mut result = SectionResult::new();
        result.insert("arch", std::env::consts::ARCH);
        result.insert(
            "memory_limit",
            self.memory_limit
                .clone()
                .unwrap_or_else(|| UNLIMITED_MEMORY.to_string()),
        );
        result.insert("os", std::env::consts::OS);
        result.insert("version", self.version);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_fields() {
        let section = RuntimeProbe::new(Some("512M".to_string())).probe();
        assert_eq!(section.get("memory_limit").unwrap(), "512M");
        assert_eq!(section.get("version").unwrap(), env!("CARGO_PKG_VERSION"));
        let keys: Vec<&str> = section.keys().collect();
        assert_eq!(keys, vec!["arch", "memory_limit", "os", "version"]);
    }

    #[test]
    fn test_unconfigured_memory_limit_is_unlimited() {
        let section = RuntimeProbe::new(None).probe();
        assert_eq!(section.get("memory_limit").unwrap(), "-1");
    }
}
