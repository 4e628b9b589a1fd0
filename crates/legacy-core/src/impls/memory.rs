//! In-memory adapters - process-local storage and email client.
//!
//! # Usage
//! - tests: inspect sent emails, mark threads as answered
//! - `memory` adapter in config: try a deployment without a backend

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{Email, Notification, PortError, ThreadId};
use crate::ports::{
    Authentication, EmailClient, EmailClientCredentials, RedirectRequest, SendEmailOutput, Storage,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct StorageState {
    notification: Option<Notification>,
    credentials: HashMap<String, EmailClientCredentials>,
    saves: usize,
}

/// InMemoryStorage keeps the record and credentials in a `Mutex`.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<StorageState>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already holds a record.
    pub fn with_notification(notification: Notification) -> Self {
        let storage = Self::new();
        lock(&storage.state).notification = Some(notification);
        storage
    }

    pub fn notification(&self) -> Option<Notification> {
        lock(&self.state).notification.clone()
    }

    /// Number of successful `save_notification` calls.
    pub fn save_count(&self) -> usize {
        lock(&self.state).saves
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_notification(&self) -> Result<Option<Notification>, PortError> {
        Ok(lock(&self.state).notification.clone())
    }

    async fn save_notification(&self, notification: &Notification) -> Result<(), PortError> {
        let mut state = lock(&self.state);
        state.notification = Some(notification.clone());
        state.saves += 1;
        Ok(())
    }

    async fn get_email_client_credentials(
        &self,
        adapter: &str,
    ) -> Result<Option<EmailClientCredentials>, PortError> {
        Ok(lock(&self.state).credentials.get(adapter).cloned())
    }

    async fn save_email_client_credentials(
        &self,
        adapter: &str,
        credentials: &EmailClientCredentials,
    ) -> Result<(), PortError> {
        lock(&self.state)
            .credentials
            .insert(adapter.to_string(), credentials.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct EmailState {
    sent: Vec<Email>,
    answered: HashSet<ThreadId>,
    fail_sends: bool,
    redirects: Vec<RedirectRequest>,
}

/// InMemoryEmailClient records every email instead of sending it.
///
/// A new thread handle (`thread-1`, `thread-2`, ...) is issued for emails
/// without a thread; replies keep theirs.
#[derive(Debug, Default)]
pub struct InMemoryEmailClient {
    state: Arc<Mutex<EmailState>>,
    next_thread: AtomicU64,
}

impl InMemoryEmailClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        lock(&self.state).sent.clone()
    }

    /// Simulates a reply from the manager in `thread_id`.
    pub fn mark_answered(&self, thread_id: &ThreadId) {
        lock(&self.state).answered.insert(thread_id.clone());
    }

    /// Makes every following send fail with a network error.
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    /// Redirect requests handled by authentications built from this client.
    pub fn redirects(&self) -> Vec<RedirectRequest> {
        lock(&self.state).redirects.clone()
    }
}

#[async_trait]
impl EmailClient for InMemoryEmailClient {
    async fn send_email(&self, email: &Email) -> Result<SendEmailOutput, PortError> {
        let mut state = lock(&self.state);
        if state.fail_sends {
            return Err(PortError::Network("send failure injected".to_string()));
        }
        let thread_id = match &email.thread_id {
            Some(thread_id) => thread_id.clone(),
            None => {
                let n = self.next_thread.fetch_add(1, Ordering::Relaxed) + 1;
                ThreadId::new(format!("thread-{n}"))
            }
        };
        state.sent.push(email.clone());
        Ok(SendEmailOutput { thread_id })
    }

    async fn has_thread_been_answered(&self, thread_id: &ThreadId) -> Result<bool, PortError> {
        Ok(lock(&self.state).answered.contains(thread_id))
    }

    fn build_authentication(&self, redirect_uri: &str) -> Box<dyn Authentication> {
        Box::new(InMemoryAuthentication {
            redirect_uri: redirect_uri.to_string(),
            state: Arc::clone(&self.state),
        })
    }
}

struct InMemoryAuthentication {
    redirect_uri: String,
    state: Arc<Mutex<EmailState>>,
}

#[async_trait]
impl Authentication for InMemoryAuthentication {
    fn build_request_url(&self) -> String {
        format!("memory://authorize?redirect_uri={}", self.redirect_uri)
    }

    async fn handle_token_redirect_request(&self, request: &RedirectRequest) -> Result<(), PortError> {
        if !request.target.contains("code=") {
            return Err(PortError::Authentication("authorization code not found".to_string()));
        }
        lock(&self.state).redirects.push(request.clone());
        Ok(())
    }
}
