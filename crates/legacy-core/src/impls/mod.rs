//! Impls - port implementations and the factories that pick them from config.
//!
//! # Adapters
//! - storage: `memory`, `redis`, `sqlite`, `dry-run`
//! - email client: `memory`, `gmail`, `dry-run`

pub mod dry_run;
pub mod gmail;
pub mod memory;
pub mod redis;
pub mod sqlite;

use std::sync::Arc;

use crate::config::{EmailClientConfig, StorageConfig};
use crate::domain::PortError;
use crate::ports::{Clock, EmailClient, Storage};

pub use self::dry_run::{DryRunEmailClient, DryRunStorage};
pub use self::gmail::GmailEmailClient;
pub use self::memory::{InMemoryEmailClient, InMemoryStorage};
pub use self::redis::RedisStorage;
pub use self::sqlite::SqliteStorage;

/// Key of the notification record in key/value backends.
pub(crate) const NOTIFICATION_KEY: &str = "notification";

/// Key of an email adapter's credentials in key/value backends.
pub(crate) fn credentials_key(adapter: &str) -> String {
    format!("email-client-token/{adapter}")
}

/// Storage selected by the `adapter` tag.
pub fn build_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, PortError> {
    let storage: Arc<dyn Storage> = match config {
        StorageConfig::Memory => Arc::new(InMemoryStorage::new()),
        StorageConfig::Sqlite { path } => Arc::new(SqliteStorage::open(path)?),
        StorageConfig::Redis { redis } => Arc::new(RedisStorage::open(redis)?),
        StorageConfig::DryRun { dry_run } => Arc::new(DryRunStorage::new(build_storage(dry_run)?)),
    };
    Ok(storage)
}

/// Email client selected by the `adapter` tag. Credentials go through `storage`.
pub fn build_email_client(
    config: &EmailClientConfig,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn EmailClient>, PortError> {
    let client: Arc<dyn EmailClient> = match config {
        EmailClientConfig::Memory => Arc::new(InMemoryEmailClient::new()),
        EmailClientConfig::Gmail { gmail } => Arc::new(GmailEmailClient::new(gmail.clone(), storage, clock)?),
        EmailClientConfig::DryRun { .. } => Arc::new(DryRunEmailClient::new()),
    };
    tracing::debug!(adapter = config.adapter_name(), "email client built");
    Ok(client)
}
