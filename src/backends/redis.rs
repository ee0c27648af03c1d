//! Redis object cache.
//!
//! Values are stored as JSON strings under `{prefix}{group}:{key}`. The
//! multiplexed connection is opened on first use and shared afterwards.

use async_trait::async_trait;
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::CacheError;
use crate::health::cache::{ObjectCache, RichDiagnostics, STATUS_CONNECTED};

/// Client name reported in the `client` field
pub const REDIS_CLIENT: &str = "redis-rs";

pub struct RedisCache {
    client: Client,
    key_prefix: String,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisCache {
    /// Validate the URL without connecting.
    pub fn open(url: &str, key_prefix: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            key_prefix: key_prefix.to_string(),
            connection: OnceCell::new(),
        })
    }

    fn key(&self, group: &str, key: &str) -> String {
        format!("{}{}:{}", self.key_prefix, group, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                tracing::debug!("Opening redis connection");
                self.client.get_multiplexed_async_connection().await
            })
            .await?;
        Ok(connection.clone())
    }

    async fn server_version(&self) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let info: String = ::redis::cmd("INFO")
            .arg("server")
            .query_async(&mut conn)
            .await?;
        Ok(parse_info_field(&info, "redis_version"))
    }
}

#[async_trait]
impl ObjectCache for RedisCache {
    fn client_name(&self) -> Option<String> {
        Some(REDIS_CLIENT.to_string())
    }

    async fn set(&self, group: &str, key: &str, value: Value) -> Result<bool, CacheError> {
        let encoded = serde_json::to_string(&value)?;
        let mut conn = self.connection().await?;
        let _: () = conn.set(self.key(group, key), encoded).await?;
        Ok(true)
    }

    async fn get(&self, group: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key(group, key)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = ::redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    async fn rich_diagnostics(&self) -> Option<RichDiagnostics> {
        match self.server_version().await {
            Ok(version) => Some(RichDiagnostics {
                connector: REDIS_CLIENT.to_string(),
                cache: format!("Redis {}", version.as_deref().unwrap_or("unknown")),
                status: STATUS_CONNECTED.to_string(),
                compressions: "none".to_string(),
                driver: "multiplexed".to_string(),
                serializer: "json".to_string(),
            }),
            Err(e) => {
                tracing::debug!(error = %e, "Redis INFO unavailable");
                None
            }
        }
    }

    async fn connection_status(&self) -> Option<bool> {
        let Ok(mut conn) = self.connection().await else {
            return Some(false);
        };
        let pong: Result<String, _> = ::redis::cmd("PING").query_async(&mut conn).await;
        Some(pong.is_ok())
    }
}

/// Pull `field` out of an `INFO` reply (`key:value` lines).
fn parse_info_field(info: &str, field: &str) -> Option<String> {
    info.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == field).then(|| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_field() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n";
        assert_eq!(parse_info_field(info, "redis_version").as_deref(), Some("7.2.4"));
        assert_eq!(parse_info_field(info, "redis_mode").as_deref(), Some("standalone"));
        assert!(parse_info_field(info, "uptime_in_seconds").is_none());
    }

    #[test]
    fn test_keys_are_prefixed() {
        let cache = RedisCache::open("redis://127.0.0.1:6379", "site1:").unwrap();
        assert_eq!(cache.key("options", "alloptions"), "site1:options:alloptions");
        assert_eq!(cache.client_name().as_deref(), Some(REDIS_CLIENT));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(RedisCache::open("not-a-redis-url", "").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_not_connected() {
        let cache = RedisCache::open("redis://127.0.0.1:1", "").unwrap();
        assert_eq!(cache.connection_status().await, Some(false));
        assert!(cache.rich_diagnostics().await.is_none());
        assert!(cache.set("default", "test", Value::from(1)).await.is_err());
    }
}
