//! In-memory stand-ins for the datastore, cache and command runner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CacheError, DatastoreError};

use super::cache::{ObjectCache, RichDiagnostics, SNAPSHOT_GROUP, SNAPSHOT_KEY};
use super::datastore::{ConnectOutcome, Datastore};
use super::platform::CommandRunner;

pub struct FakeDatastore {
    pub name: String,
    pub driver: Option<String>,
    pub outcome: ConnectOutcome,
    pub process_rows: Result<usize, String>,
    pub autoload: Vec<(String, String)>,
    pub options: HashMap<String, String>,
    pub panic_on_process_list: bool,
}

impl FakeDatastore {
    pub fn healthy(name: &str) -> Self {
        Self {
            name: name.to_string(),
            driver: Some("FakeConnection".to_string()),
            outcome: ConnectOutcome::connected(),
            process_rows: Ok(3),
            autoload: Vec::new(),
            options: HashMap::new(),
            panic_on_process_list: false,
        }
    }

    pub fn unreachable(name: &str) -> Self {
        Self {
            driver: None,
            outcome: ConnectOutcome::failed("Connection refused"),
            ..Self::healthy(name)
        }
    }
}

#[async_trait]
impl Datastore for FakeDatastore {
    fn handle_name(&self) -> String {
        self.name.clone()
    }

    fn driver_name(&self) -> Option<String> {
        self.driver.clone()
    }

    async fn connect_check(&self) -> ConnectOutcome {
        self.outcome.clone()
    }

    async fn process_list(&self) -> Result<usize, DatastoreError> {
        if self.panic_on_process_list {
            panic!("driver blew up");
        }
        self.process_rows.clone().map_err(DatastoreError::Driver)
    }

    async fn autoload_options(&self) -> Result<Vec<(String, String)>, DatastoreError> {
        Ok(self.autoload.clone())
    }

    async fn option_value(&self, name: &str) -> Result<Option<String>, DatastoreError> {
        Ok(self.options.get(name).cloned())
    }
}

#[derive(Default)]
pub struct FakeCache {
    pub(crate) store: Mutex<HashMap<String, Value>>,
    pub(crate) flushed: AtomicBool,
    pub refuse_writes: bool,
    pub flush_error: Option<String>,
    pub rich: Option<RichDiagnostics>,
    pub connected: Option<bool>,
    pub local: bool,
}

impl FakeCache {
    pub fn with_snapshot(snapshot: Value) -> Self {
        let cache = Self {
            connected: Some(true),
            ..Self::default()
        };
        cache
            .store
            .lock()
            .unwrap()
            .insert(format!("{}:{}", SNAPSHOT_GROUP, SNAPSHOT_KEY), snapshot);
        cache
    }

    pub fn was_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectCache for FakeCache {
    fn client_name(&self) -> Option<String> {
        Some("FakeClient".to_string())
    }

    async fn set(&self, group: &str, key: &str, value: Value) -> Result<bool, CacheError> {
        if self.refuse_writes {
            return Ok(false);
        }
        self.store
            .lock()
            .unwrap()
            .insert(format!("{}:{}", group, key), value);
        Ok(true)
    }

    async fn get(&self, group: &str, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .get(&format!("{}:{}", group, key))
            .cloned())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        if let Some(error) = &self.flush_error {
            return Err(CacheError::Backend(error.clone()));
        }
        self.store.lock().unwrap().clear();
        self.flushed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn rich_diagnostics(&self) -> Option<RichDiagnostics> {
        self.rich.clone()
    }

    async fn connection_status(&self) -> Option<bool> {
        self.connected
    }

    fn is_shared(&self) -> bool {
        !self.local
    }
}

pub struct FakeRunner {
    pub output: Option<String>,
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, _program: &str, _args: &[String]) -> Option<String> {
        self.output.clone()
    }
}
