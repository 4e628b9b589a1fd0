//! RedisStorage - key/value persistence in a Redis server.
//!
//! Same keys as the SQLite adapter, values stored as JSON strings. The
//! client connects lazily on first use and shares one multiplexed
//! connection afterwards.

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, RedisError};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use url::Url;

use crate::config::RedisConfig;
use crate::domain::{Notification, PortError};
use crate::ports::{EmailClientCredentials, Storage};

use super::{NOTIFICATION_KEY, credentials_key};

impl From<RedisError> for PortError {
    fn from(err: RedisError) -> Self {
        PortError::Storage(err.to_string())
    }
}

pub struct RedisStorage {
    client: Client,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisStorage {
    /// Validates the settings; no connection is made until the first call.
    pub fn open(config: &RedisConfig) -> Result<Self, PortError> {
        let url = connection_url(config)?;
        let client = Client::open(url.as_str())?;
        tracing::debug!(host = %config.host, port = config.port, db = config.db, "redis storage configured");
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, PortError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                self.client.get_multiplexed_async_connection().await.inspect_err(|err| {
                    tracing::error!(error = %err, "failed to connect to redis");
                })
            })
            .await?;
        Ok(conn.clone())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PortError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), PortError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }
}

/// `redis://[:password@]host:port/db`
fn connection_url(config: &RedisConfig) -> Result<Url, PortError> {
    let mut url = Url::parse(&format!("redis://{}:{}/{}", config.host, config.port, config.db))
        .map_err(|e| PortError::Storage(format!("invalid redis address: {e}")))?;
    if let Some(password) = &config.password {
        url.set_password(Some(password))
            .map_err(|()| PortError::Storage("redis password cannot be set on this address".to_string()))?;
    }
    Ok(url)
}

#[async_trait]
impl Storage for RedisStorage {
    async fn get_notification(&self) -> Result<Option<Notification>, PortError> {
        match self.get(NOTIFICATION_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_notification(&self, notification: &Notification) -> Result<(), PortError> {
        let raw = serde_json::to_string(notification)?;
        self.set(NOTIFICATION_KEY, raw).await?;
        tracing::debug!(status = %notification.status(), "notification saved");
        Ok(())
    }

    async fn get_email_client_credentials(
        &self,
        adapter: &str,
    ) -> Result<Option<EmailClientCredentials>, PortError> {
        match self.get(&credentials_key(adapter)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_email_client_credentials(
        &self,
        adapter: &str,
        credentials: &EmailClientCredentials,
    ) -> Result<(), PortError> {
        let raw = serde_json::to_string(credentials)?;
        self.set(&credentials_key(adapter), raw).await?;
        tracing::debug!(adapter, "email client credentials saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActiveNotification, MonthDaySequence, ThreadId};
    use chrono::{TimeZone, Utc};

    fn config(host: &str, port: u16) -> RedisConfig {
        RedisConfig {
            host: host.to_string(),
            port,
            db: 0,
            password: None,
        }
    }

    #[test]
    fn url_carries_db_and_password() {
        let mut settings = config("cache.internal", 6380);
        settings.db = 3;
        settings.password = Some("s3cr#t".to_string());
        let url = connection_url(&settings).unwrap();
        assert_eq!(url.as_str(), "redis://:s3cr%23t@cache.internal:6380/3");
    }

    #[test]
    fn open_does_not_connect() {
        assert!(RedisStorage::open(&config("127.0.0.1", 1)).is_ok());
    }

    #[test]
    fn bad_host_is_a_storage_error() {
        assert!(matches!(
            RedisStorage::open(&config("not a host", 6379)),
            Err(PortError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_storage_error() {
        let storage = RedisStorage::open(&config("127.0.0.1", 1)).unwrap();
        assert!(matches!(storage.get_notification().await, Err(PortError::Storage(_))));
    }

    #[tokio::test]
    #[ignore = "needs a redis server on localhost:6379"]
    async fn record_round_trips_through_server() {
        let storage = RedisStorage::open(&config("127.0.0.1", 6379)).unwrap();
        let record = Notification::Checking(ActiveNotification {
            started_at: Utc.with_ymd_and_hms(2025, 6, 10, 7, 30, 15).unwrap(),
            sequence_of_month_days: MonthDaySequence::new(vec![10, 20, 28]).unwrap(),
            last_sequence_index_sent: 0,
            last_sequence_sent_at: Utc.with_ymd_and_hms(2025, 6, 10, 7, 30, 15).unwrap(),
            thread_id: ThreadId::new("18f0c2"),
        });
        storage.save_notification(&record).await.unwrap();
        assert_eq!(storage.get_notification().await.unwrap(), Some(record));
    }
}
