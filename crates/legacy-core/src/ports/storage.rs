//! Storage port - persistence of the notification record and provider credentials.

use async_trait::async_trait;

use crate::domain::{Notification, PortError};

/// Opaque credentials, owned by the email adapter that wrote them.
pub type EmailClientCredentials = serde_json::Value;

/// Storage holds exactly one notification record per deployment.
///
/// No locking or version check on save. Callers must not run two `notify()`
/// calls against the same storage at once: the later save overwrites the
/// earlier one and both runs may send the same email.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_notification(&self) -> Result<Option<Notification>, PortError>;

    async fn save_notification(&self, notification: &Notification) -> Result<(), PortError>;

    async fn get_email_client_credentials(
        &self,
        adapter: &str,
    ) -> Result<Option<EmailClientCredentials>, PortError>;

    async fn save_email_client_credentials(
        &self,
        adapter: &str,
        credentials: &EmailClientCredentials,
    ) -> Result<(), PortError>;
}
