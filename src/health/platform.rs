//! Platform facts for the `wp` section.
//!
//! The `cli` field comes from an external command. It runs behind the
//! [`CommandRunner`] seam so tests can replace it and deployments can turn it
//! off; a missing or failing command reads as `UNKNOWN`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;

use super::datastore::DatastoreSession;
use super::{SectionResult, STATUS_UNKNOWN};

/// Options row holding the schema version the datastore is at
pub const DB_VERSION_OPTION: &str = "db_version";

/// Upper bound on how long the CLI version command may run
pub const CLI_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs an external command and returns its trimmed stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// `None` when the command is unavailable, fails or produces no output.
    async fn run(&self, program: &str, args: &[String]) -> Option<String>;
}

/// Spawns real processes with a timeout.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Option<String> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(CLI_COMMAND_TIMEOUT, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::debug!(program, error = %e, "CLI command could not be spawned");
                return None;
            }
            Err(_) => {
                tracing::warn!(program, "CLI command timed out");
                return None;
            }
        };

        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!stdout.is_empty()).then_some(stdout)
    }
}

/// Never runs anything.
#[derive(Debug, Clone, Default)]
pub struct DisabledRunner;

#[async_trait]
impl CommandRunner for DisabledRunner {
    async fn run(&self, _program: &str, _args: &[String]) -> Option<String> {
        None
    }
}

pub struct PlatformProbe {
    version: Option<String>,
    schema_version: Option<u64>,
    cli_command: Vec<String>,
    runner: Box<dyn CommandRunner>,
}

impl PlatformProbe {
    pub fn new(
        version: Option<String>,
        schema_version: Option<u64>,
        cli_command: Vec<String>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            version,
            schema_version,
            cli_command,
            runner,
        }
    }

    async fn cli_version(&self) -> Option<String> {
        let (program, args) = self.cli_command.split_first()?;
        self.runner.run(program, args).await
    }

    /// Build the `wp` section.
    ///
    /// `elevated` reports whether the caller holds an elevated token.
    pub async fn probe(&self, datastore: &mut DatastoreSession, elevated: bool) -> SectionResult {
        let db_version = match datastore.option_value(DB_VERSION_OPTION).await {
            Ok(Some(value)) => value.trim().parse::<i64>().ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read db_version option");
                None
            }
        };

        let mut result = SectionResult::new();
        result.insert(
            "cli",
            self.cli_version()
                .await
                .unwrap_or_else(|| STATUS_UNKNOWN.to_string()),
        );
        match db_version {
            Some(version) => result.insert("db_version", version),
            None => result.insert("db_version", STATUS_UNKNOWN),
        }
        match self.schema_version {
            Some(version) => result.insert("schema_version", version),
            None => result.insert("schema_version", STATUS_UNKNOWN),
        }
        result.insert("super_admin", elevated);
        result.insert(
            "version",
            self.version
                .clone()
                .unwrap_or_else(|| STATUS_UNKNOWN.to_string()),
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::datastore::DatastoreHandles;
    use crate::health::errors::ErrorCollector;
    use crate::health::fakes::{FakeDatastore, FakeRunner};
    use std::sync::Arc;

    async fn session(db_version: Option<&str>) -> DatastoreSession {
        let mut datastore = FakeDatastore::healthy("Primary");
        if let Some(v) = db_version {
            datastore
                .options
                .insert(DB_VERSION_OPTION.to_string(), v.to_string());
        }
        DatastoreHandles::new(Arc::new(datastore))
            .connect(&mut ErrorCollector::new("mysql"))
            .await
            .unwrap()
    }

    fn probe(output: Option<&str>) -> PlatformProbe {
        PlatformProbe::new(
            Some("6.8.1".to_string()),
            Some(58975),
            vec!["wp".to_string(), "cli".to_string(), "version".to_string()],
            Box::new(FakeRunner {
                output: output.map(str::to_string),
            }),
        )
    }

    #[tokio::test]
    async fn test_platform_fields() {
        let mut session = session(Some("58975")).await;
        let section = probe(Some("WP-CLI 2.11.0")).probe(&mut session, true).await;

        assert_eq!(section.get("cli").unwrap(), "WP-CLI 2.11.0");
        assert_eq!(section.get("db_version").unwrap(), 58975);
        assert_eq!(section.get("schema_version").unwrap(), 58975);
        assert_eq!(section.get("super_admin").unwrap(), true);
        assert_eq!(section.get("version").unwrap(), "6.8.1");
        assert_eq!(session.query_count(), 1);
    }

    #[tokio::test]
    async fn test_non_numeric_db_version_is_unknown() {
        let mut session = session(Some("not-a-number")).await;
        let section = probe(None).probe(&mut session, false).await;
        assert_eq!(section.get("db_version").unwrap(), "UNKNOWN");
        assert_eq!(section.get("cli").unwrap(), "UNKNOWN");
        assert_eq!(section.get("super_admin").unwrap(), false);
    }

    #[tokio::test]
    async fn test_empty_command_never_runs() {
        let mut session = session(None).await;
        let platform = PlatformProbe::new(
            None,
            None,
            Vec::new(),
            Box::new(FakeRunner {
                output: Some("should not appear".to_string()),
            }),
        );
        let section = platform.probe(&mut session, false).await;
        assert_eq!(section.get("cli").unwrap(), "UNKNOWN");
        assert_eq!(section.get("version").unwrap(), "UNKNOWN");
        assert_eq!(section.get("schema_version").unwrap(), "UNKNOWN");
        assert_eq!(section.get("db_version").unwrap(), "UNKNOWN");
    }

    #[tokio::test]
    async fn test_disabled_runner_returns_none() {
        assert!(DisabledRunner.run("wp", &[]).await.is_none());
    }

    #[tokio::test]
    async fn test_process_runner_missing_program_is_none() {
        let output = ProcessRunner
            .run("definitely-not-an-installed-binary-xyz", &[])
            .await;
        assert!(output.is_none());
    }
}
