//! Dry-run adapters - log what would happen, change nothing.
//!
//! `DryRunStorage` reads through the wrapped storage so a dry run sees the
//! real record, but only logs writes. `DryRunEmailClient` never talks to a
//! provider and never reports a reply.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Email, Notification, PortError, ThreadId};
use crate::ports::{
    Authentication, EmailClient, EmailClientCredentials, RedirectRequest, SendEmailOutput, Storage,
};

pub const DRY_RUN_THREAD_ID: &str = "__DRY_RUN_THREAD_ID__";
pub const DRY_RUN_AUTH_URL: &str = "__DRY_RUN_AUTH_URL__";

pub struct DryRunStorage {
    inner: Arc<dyn Storage>,
}

impl DryRunStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Storage for DryRunStorage {
    async fn get_notification(&self) -> Result<Option<Notification>, PortError> {
        self.inner.get_notification().await
    }

    async fn save_notification(&self, notification: &Notification) -> Result<(), PortError> {
        tracing::info!(
            status = %notification.status(),
            record = %serde_json::to_string(notification)?,
            "dry-run: skipping save_notification"
        );
        Ok(())
    }

    async fn get_email_client_credentials(
        &self,
        adapter: &str,
    ) -> Result<Option<EmailClientCredentials>, PortError> {
        self.inner.get_email_client_credentials(adapter).await
    }

    async fn save_email_client_credentials(
        &self,
        adapter: &str,
        _credentials: &EmailClientCredentials,
    ) -> Result<(), PortError> {
        // credentials are secrets: log the adapter only
        tracing::info!(adapter, "dry-run: skipping save_email_client_credentials");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunEmailClient;

impl DryRunEmailClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailClient for DryRunEmailClient {
    async fn send_email(&self, email: &Email) -> Result<SendEmailOutput, PortError> {
        tracing::info!(
            thread_id = ?email.thread_id.as_ref().map(ThreadId::as_str),
            sender = %email.sender,
            recipient = %email.recipient,
            subject = %email.subject,
            body = %email.body,
            "dry-run: skipping send_email"
        );
        Ok(SendEmailOutput {
            thread_id: ThreadId::new(DRY_RUN_THREAD_ID),
        })
    }

    async fn has_thread_been_answered(&self, thread_id: &ThreadId) -> Result<bool, PortError> {
        tracing::info!(%thread_id, "dry-run: reporting thread as unanswered");
        Ok(false)
    }

    fn build_authentication(&self, _redirect_uri: &str) -> Box<dyn Authentication> {
        Box::new(DryRunAuthentication)
    }
}

struct DryRunAuthentication;

#[async_trait]
impl Authentication for DryRunAuthentication {
    fn build_request_url(&self) -> String {
        DRY_RUN_AUTH_URL.to_string()
    }

    async fn handle_token_redirect_request(&self, request: &RedirectRequest) -> Result<(), PortError> {
        tracing::info!(target_uri = %request.target, "dry-run: ignoring token redirect request");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MonthDaySequence;
    use crate::impls::memory::InMemoryStorage;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn storage_reads_through_and_drops_writes() {
        let existing = Notification::draft(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            MonthDaySequence::new(vec![1, 2]).unwrap(),
        );
        let inner = Arc::new(InMemoryStorage::with_notification(existing.clone()));
        let storage = DryRunStorage::new(inner.clone());

        assert_eq!(storage.get_notification().await.unwrap(), Some(existing.clone()));

        let other = Notification::draft(
            Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
            MonthDaySequence::new(vec![3, 4]).unwrap(),
        );
        storage.save_notification(&other).await.unwrap();
        storage
            .save_email_client_credentials("gmail", &serde_json::json!({"access_token": "x"}))
            .await
            .unwrap();

        assert_eq!(inner.notification(), Some(existing));
        assert_eq!(inner.save_count(), 0);
        assert!(inner.get_email_client_credentials("gmail").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn email_client_returns_placeholders() {
        let client = DryRunEmailClient::new();
        let output = client
            .send_email(&Email {
                thread_id: None,
                sender: "a@example.com".into(),
                recipient: "b@example.com".into(),
                subject: "s".into(),
                body: "b".into(),
            })
            .await
            .unwrap();
        assert_eq!(output.thread_id.as_str(), DRY_RUN_THREAD_ID);
        assert!(!client.has_thread_been_answered(&output.thread_id).await.unwrap());

        let auth = client.build_authentication("http://localhost:1234");
        assert_eq!(auth.build_request_url(), DRY_RUN_AUTH_URL);
    }
}
