//! EmailClient port - sending emails and detecting replies.
//!
//! # Contract
//! - `send_email` returns the provider's thread handle for the sent message
//! - `has_thread_been_answered` is true once anyone other than the original
//!   sender wrote in the thread
//! - `build_authentication` starts the provider's authorization flow for a
//!   given redirect URI
//!
//! Transport timeouts belong to the implementations.

use async_trait::async_trait;

use crate::domain::{Email, PortError, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendEmailOutput {
    pub thread_id: ThreadId,
}

/// First line of the HTTP request that hit the redirect URI, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRequest {
    pub method: String,
    /// Path and query, e.g. `/?code=4/abc&scope=...`
    pub target: String,
}

impl RedirectRequest {
    /// Parses `GET /?code=... HTTP/1.1`.
    pub fn parse_request_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let method = parts.next()?;
        let target = parts.next()?;
        parts.next()?.starts_with("HTTP/").then(|| Self {
            method: method.to_string(),
            target: target.to_string(),
        })
    }
}

/// One authorization attempt bound to a redirect URI.
#[async_trait]
pub trait Authentication: Send + Sync {
    /// URL the user opens to grant access.
    fn build_request_url(&self) -> String;

    /// Exchanges the code carried by the redirect and stores the credentials.
    async fn handle_token_redirect_request(&self, request: &RedirectRequest) -> Result<(), PortError>;
}

#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send_email(&self, email: &Email) -> Result<SendEmailOutput, PortError>;

    async fn has_thread_been_answered(&self, thread_id: &ThreadId) -> Result<bool, PortError>;

    fn build_authentication(&self, redirect_uri: &str) -> Box<dyn Authentication>;
}
