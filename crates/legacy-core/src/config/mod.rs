//! Config - deployment configuration, defaults and validation.
//!
//! Adapters are chosen by the `adapter` tag of the `storage` and
//! `email_client` sections; each variant carries its own settings.

pub mod loader;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::sequence::DEFAULT_DATE_FORMAT;
use crate::domain::{EmailSettings, EmailTemplate, MonthDaySequence};

pub use self::loader::{ConfigLoader, load_config};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] ::config::ConfigError),
    #[error("No configuration found: pass --config-file or set the {0} environment variable")]
    NotFound(String),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "kebab-case")]
pub enum StorageConfig {
    /// Process-local, lost on exit.
    Memory,
    Redis {
        redis: RedisConfig,
    },
    Sqlite {
        path: PathBuf,
    },
    /// Reads through `dry_run`, logs writes instead of performing them.
    DryRun {
        #[serde(alias = "dryRun")]
        dry_run: Box<StorageConfig>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_redis_port() -> u16 {
    6379
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "kebab-case")]
pub enum EmailClientConfig {
    Memory,
    Gmail {
        gmail: GmailConfig,
    },
    DryRun {
        #[serde(default, alias = "dryRun")]
        dry_run: Option<Box<EmailClientConfig>>,
    },
}

impl EmailClientConfig {
    /// Name under which the adapter's credentials are stored.
    pub fn adapter_name(&self) -> &'static str {
        match self {
            EmailClientConfig::Memory => "memory",
            EmailClientConfig::Gmail { .. } => "gmail",
            EmailClientConfig::DryRun { .. } => "dry-run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(alias = "clientId")]
    pub client_id: String,
    #[serde(alias = "clientSecret")]
    pub client_secret: String,
    #[serde(default)]
    pub endpoints: GmailEndpoints,
}

/// Google endpoints, overridable for tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub api_base_url: String,
}

impl Default for GmailEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_base_url: "https://gmail.googleapis.com".to_string(),
        }
    }
}

/// Keys are snake_case; the camelCase spelling of each key is accepted too,
/// so a JSON `CONFIG` written for earlier deployments still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    #[serde(alias = "emailClient")]
    pub email_client: EmailClientConfig,
    #[serde(alias = "senderEmailAddress")]
    pub sender_email_address: String,
    #[serde(alias = "managerEmailAddress")]
    pub manager_email_address: String,
    #[serde(alias = "familyEmailAddress")]
    pub family_email_address: String,
    #[serde(default = "default_check_email", alias = "checkEmail")]
    pub check_email: EmailTemplate,
    #[serde(alias = "legacyEmail")]
    pub legacy_email: EmailTemplate,
    #[serde(default = "default_cancellation_email", alias = "cancellationEmail")]
    pub cancellation_email: EmailTemplate,
    #[serde(alias = "sequenceOfMonthDaysToNotify")]
    pub sequence_of_month_days_to_notify: Vec<u32>,
    #[serde(default = "default_date_format", alias = "dateFormat")]
    pub date_format: String,
}

fn default_check_email() -> EmailTemplate {
    EmailTemplate::new(
        "[Legacy Notification] {notificationLabel}",
        "This is a check notification number #{notificationNumber}. Reply to this email to cancel the legacy email. If you do not cancel it, the legacy email will be sent on {notificationCompletionDate}.",
    )
}

fn default_cancellation_email() -> EmailTemplate {
    EmailTemplate::new(
        "[Legacy Notification] {notificationLabel}",
        "Your notification has been cancelled. Next check will be on {notificationNextCheckDate}.",
    )
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

impl AppConfig {
    /// Structural checks the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sequence()?;

        let addresses = [
            ("sender_email_address", &self.sender_email_address),
            ("manager_email_address", &self.manager_email_address),
            ("family_email_address", &self.family_email_address),
        ];
        for (name, address) in addresses {
            if address.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{name} must not be empty")));
            }
        }
        if self.sender_email_address == self.manager_email_address
            || self.sender_email_address == self.family_email_address
            || self.manager_email_address == self.family_email_address
        {
            return Err(ConfigError::Validation(
                "sender_email_address, manager_email_address, family_email_address must be different".into(),
            ));
        }

        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Validation(format!(
                "date_format '{}' is not a valid strftime pattern",
                self.date_format
            )));
        }
        Ok(())
    }

    pub fn sequence(&self) -> Result<MonthDaySequence, ConfigError> {
        MonthDaySequence::new(self.sequence_of_month_days_to_notify.clone())
            .map_err(|e| ConfigError::Validation(format!("sequence_of_month_days_to_notify: {e}")))
    }

    pub fn email_settings(&self) -> Arc<EmailSettings> {
        Arc::new(EmailSettings {
            sender: self.sender_email_address.clone(),
            manager: self.manager_email_address.clone(),
            family: self.family_email_address.clone(),
            check_email: self.check_email.clone(),
            legacy_email: self.legacy_email.clone(),
            cancellation_email: self.cancellation_email.clone(),
            date_format: self.date_format.clone(),
        })
    }

    /// Same deployment with both adapters wrapped in their dry-run variant.
    pub fn into_dry_run(self) -> Self {
        Self {
            storage: StorageConfig::DryRun {
                dry_run: Box::new(self.storage),
            },
            email_client: EmailClientConfig::DryRun {
                dry_run: Some(Box::new(self.email_client)),
            },
            ..self
        }
    }
}
