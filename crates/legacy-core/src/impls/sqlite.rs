//! SqliteStorage - key/value persistence in a single SQLite file.
//!
//! # Layout
//! - table `kv(key TEXT PRIMARY KEY, value TEXT)`
//! - key `notification`: the record as JSON
//! - key `email-client-token/<adapter>`: the adapter's credentials as JSON
//!
//! rusqlite is blocking, so every call runs on `spawn_blocking` behind a
//! `Mutex<Connection>`.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::domain::{Notification, PortError};
use crate::ports::{EmailClientCredentials, Storage};

use super::{NOTIFICATION_KEY, credentials_key};

impl From<rusqlite::Error> for PortError {
    fn from(err: rusqlite::Error) -> Self {
        PortError::Storage(err.to_string())
    }
}

pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Opens (or creates) the database file and ensures the table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PortError> {
        let path = path.as_ref();
        let started_at = Instant::now();
        let conn = Connection::open(path).inspect_err(|err| {
            tracing::error!(path = %path.display(), error = %err, "failed to open sqlite database");
        })?;
        Self::bootstrap(conn).inspect(|_| {
            tracing::debug!(
                path = %path.display(),
                duration_ms = started_at.elapsed().as_millis() as u64,
                "sqlite storage ready"
            );
        })
    }

    pub fn open_in_memory() -> Result<Self, PortError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, PortError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, PortError>
    where
        F: FnOnce(&Connection) -> Result<T, PortError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&guard)
        })
        .await
        .map_err(|e| PortError::Storage(format!("blocking task failed: {e}")))?
    }

    async fn get(&self, key: String) -> Result<Option<String>, PortError> {
        self.with_conn(move |conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: String, value: String) -> Result<(), PortError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_notification(&self) -> Result<Option<Notification>, PortError> {
        match self.get(NOTIFICATION_KEY.to_string()).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_notification(&self, notification: &Notification) -> Result<(), PortError> {
        let raw = serde_json::to_string(notification)?;
        self.set(NOTIFICATION_KEY.to_string(), raw).await?;
        tracing::debug!(status = %notification.status(), "notification saved");
        Ok(())
    }

    async fn get_email_client_credentials(
        &self,
        adapter: &str,
    ) -> Result<Option<EmailClientCredentials>, PortError> {
        match self.get(credentials_key(adapter)).await? {
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
        self.set(credentials_key(adapter), raw).await?;
        tracing::debug!(adapter, "email client credentials saved");
        Ok(())
    }
}
