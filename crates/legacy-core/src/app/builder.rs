//! NotificatorBuilder - wiring and fail-fast validation.
//!
//! Ports that are not injected are resolved from the configuration's
//! adapter tags through the explicit factories in `impls`.

use std::sync::Arc;

use super::notificator::Notificator;
use crate::config::AppConfig;
use crate::domain::NotifierError;
use crate::impls::{build_email_client, build_storage};
use crate::ports::{Clock, EmailClient, Storage, SystemClock};

/// Builds a `Notificator` from an `AppConfig`.
///
/// # Example
/// ```ignore
/// let notificator = NotificatorBuilder::new(config)
///     .storage(storage)
///     .clock(clock)
///     .build()?;
/// ```
pub struct NotificatorBuilder {
    config: AppConfig,
    storage: Option<Arc<dyn Storage>>,
    email_client: Option<Arc<dyn EmailClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl NotificatorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            storage: None,
            email_client: None,
            clock: None,
        }
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn email_client(mut self, email_client: Arc<dyn EmailClient>) -> Self {
        self.email_client = Some(email_client);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validates the configuration, then resolves missing ports.
    ///
    /// # Errors
    /// - `Configuration` for an invalid configuration
    /// - `Port` when an adapter cannot be opened
    pub fn build(self) -> Result<Notificator, NotifierError> {
        self.config
            .validate()
            .map_err(|e| NotifierError::Configuration(e.to_string()))?;
        let sequence = self
            .config
            .sequence()
            .map_err(|e| NotifierError::Configuration(e.to_string()))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let storage = match self.storage {
            Some(storage) => storage,
            None => build_storage(&self.config.storage)?,
        };
        let email_client = match self.email_client {
            Some(email_client) => email_client,
            None => build_email_client(&self.config.email_client, Arc::clone(&storage), Arc::clone(&clock))?,
        };

        Notificator::new(sequence, self.config.email_settings(), storage, email_client, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmailClientConfig, StorageConfig};
    use crate::domain::EmailTemplate;

    fn config(days: Vec<u32>) -> AppConfig {
        AppConfig {
            storage: StorageConfig::Memory,
            email_client: EmailClientConfig::Memory,
            sender_email_address: "me@example.com".into(),
            manager_email_address: "manager@example.com".into(),
            family_email_address: "family@example.com".into(),
            check_email: EmailTemplate::new("c", "c"),
            legacy_email: EmailTemplate::new("l", "l"),
            cancellation_email: EmailTemplate::new("x", "x"),
            sequence_of_month_days_to_notify: days,
            date_format: "%Y-%m-%d".into(),
        }
    }

    #[test]
    fn test_build_from_config_adapters() {
        let notificator = NotificatorBuilder::new(config(vec![10, 20, 28])).build().unwrap();
        assert_eq!(notificator.steps().len(), 3);
    }

    #[test]
    fn test_build_rejects_empty_sequence() {
        let result = NotificatorBuilder::new(config(vec![])).build();
        assert!(matches!(result, Err(NotifierError::Configuration(_))));
    }

    #[test]
    fn test_build_rejects_duplicate_addresses() {
        let mut config = config(vec![1, 2]);
        config.family_email_address = config.sender_email_address.clone();
        let result = NotificatorBuilder::new(config).build();
        assert!(matches!(result, Err(NotifierError::Configuration(msg)) if msg.contains("must be different")));
    }

    #[test]
    fn test_build_surfaces_adapter_failure() {
        let mut config = config(vec![1, 2]);
        config.storage = StorageConfig::Sqlite {
            path: "/nonexistent-dir/for/sure/legacy.db".into(),
        };
        assert!(matches!(NotificatorBuilder::new(config).build(), Err(NotifierError::Port(_))));
    }
}
