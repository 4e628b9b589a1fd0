//! GmailEmailClient - Gmail REST API over reqwest.
//!
//! # Credentials
//! OAuth2 tokens are stored through the Storage port under the `gmail`
//! adapter name. `expiry_date` is in milliseconds since the epoch; an
//! expired access token is refreshed and the new tokens saved before use.
//!
//! # Reply detection
//! A thread counts as answered once any message in it has a `From` header
//! different from the first message's.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::config::GmailConfig;
use crate::domain::{Email, PortError, ThreadId};
use crate::ports::{Authentication, Clock, EmailClient, RedirectRequest, SendEmailOutput, Storage};

pub const ADAPTER_NAME: &str = "gmail";

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.readonly",
];

/// Stored token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmailCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Milliseconds since the epoch.
    pub expiry_date: i64,
}

impl GmailCredentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.expiry_date
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
}

impl TokenResponse {
    /// Google omits the refresh token on refresh; keep the previous one.
    fn into_credentials(self, now: DateTime<Utc>, previous_refresh_token: Option<String>) -> GmailCredentials {
        GmailCredentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh_token),
            scope: self.scope,
            token_type: self.token_type,
            expiry_date: now.timestamp_millis() + self.expires_in * 1000,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    thread_id: String,
}

#[derive(Debug, Deserialize)]
struct Thread {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

impl Message {
    fn sender(&self) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case("From"))
            .map(|header| header.value.as_str())
    }
}

/// Shared by the client and the authentications it builds.
struct GmailContext {
    config: GmailConfig,
    auth_url: Url,
    http: reqwest::Client,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl GmailContext {
    async fn request_tokens(&self, form: &[(&str, &str)]) -> Result<TokenResponse, PortError> {
        // the serializer is not Send, finish it before the first await
        let body = {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            serializer.append_pair("client_id", &self.config.client_id);
            serializer.append_pair("client_secret", &self.config.client_secret);
            for (key, value) in form {
                serializer.append_pair(key, value);
            }
            serializer.finish()
        };

        let response = self
            .http
            .post(&self.config.endpoints.token_url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        let response = check_status(response, "token request").await?;
        Ok(response.json().await?)
    }

    async fn save_credentials(&self, credentials: &GmailCredentials) -> Result<(), PortError> {
        self.storage
            .save_email_client_credentials(ADAPTER_NAME, &serde_json::to_value(credentials)?)
            .await
    }
}

pub struct GmailEmailClient {
    ctx: Arc<GmailContext>,
}

impl GmailEmailClient {
    pub fn new(config: GmailConfig, storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Result<Self, PortError> {
        let auth_url = Url::parse(&config.endpoints.auth_url)
            .map_err(|e| PortError::Authentication(format!("invalid auth_url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            ctx: Arc::new(GmailContext {
                config,
                auth_url,
                http,
                storage,
                clock,
            }),
        })
    }

    /// `{api_base_url}/gmail/v1/users/me/{segments...}`, each segment percent-encoded.
    fn api_url(&self, segments: &[&str]) -> Result<Url, PortError> {
        let mut url = Url::parse(&self.ctx.config.endpoints.api_base_url)
            .map_err(|e| PortError::Provider(format!("invalid api_base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| PortError::Provider("api_base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["gmail", "v1", "users", "me"])
            .extend(segments);
        Ok(url)
    }

    async fn active_credentials(&self) -> Result<GmailCredentials, PortError> {
        let stored = self
            .ctx
            .storage
            .get_email_client_credentials(ADAPTER_NAME)
            .await?
            .ok_or_else(|| PortError::MissingCredentials(ADAPTER_NAME.to_string()))?;
        let credentials: GmailCredentials =
            serde_json::from_value(stored).map_err(|e| PortError::MalformedCredentials(e.to_string()))?;

        let now = self.ctx.clock.now();
        if !credentials.is_expired(now) {
            return Ok(credentials);
        }

        let refresh_token = credentials.refresh_token.clone().ok_or_else(|| {
            PortError::MalformedCredentials("access token expired and no refresh_token stored".to_string())
        })?;
        tracing::info!("gmail access token expired, refreshing");
        let refreshed = self
            .ctx
            .request_tokens(&[("grant_type", "refresh_token"), ("refresh_token", &refresh_token)])
            .await?
            .into_credentials(now, Some(refresh_token));
        self.ctx.save_credentials(&refreshed).await?;
        Ok(refreshed)
    }
}

#[async_trait]
impl EmailClient for GmailEmailClient {
    async fn send_email(&self, email: &Email) -> Result<SendEmailOutput, PortError> {
        let credentials = self.active_credentials().await?;
        let request = SendRequest {
            raw: encode_raw_email(email),
            thread_id: email.thread_id.as_ref().map(ThreadId::as_str),
        };

        let response = self
            .ctx
            .http
            .post(self.api_url(&["messages", "send"])?)
            .bearer_auth(&credentials.access_token)
            .json(&request)
            .send()
            .await?;
        let sent: SendResponse = check_status(response, "messages.send").await?.json().await?;

        tracing::info!(recipient = %email.recipient, thread_id = %sent.thread_id, "email sent");
        Ok(SendEmailOutput {
            thread_id: ThreadId::new(sent.thread_id),
        })
    }

    async fn has_thread_been_answered(&self, thread_id: &ThreadId) -> Result<bool, PortError> {
        let credentials = self.active_credentials().await?;
        let response = self
            .ctx
            .http
            .get(self.api_url(&["threads", thread_id.as_str()])?)
            .query(&[("format", "metadata"), ("metadataHeaders", "From")])
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;
        let thread: Thread = check_status(response, "threads.get").await?.json().await?;

        let Some(first) = thread.messages.first() else {
            return Ok(false);
        };
        let first_sender = first
            .sender()
            .ok_or_else(|| PortError::Provider(format!("thread {thread_id}: first message has no From header")))?;

        let answered = thread
            .messages
            .iter()
            .any(|message| message.sender().is_some_and(|sender| sender != first_sender));
        tracing::debug!(%thread_id, messages = thread.messages.len(), answered, "thread inspected");
        Ok(answered)
    }

    fn build_authentication(&self, redirect_uri: &str) -> Box<dyn Authentication> {
        Box::new(GmailAuthentication {
            ctx: Arc::clone(&self.ctx),
            redirect_uri: redirect_uri.to_string(),
        })
    }
}

struct GmailAuthentication {
    ctx: Arc<GmailContext>,
    redirect_uri: String,
}

#[async_trait]
impl Authentication for GmailAuthentication {
    fn build_request_url(&self) -> String {
        let mut url = self.ctx.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.ctx.config.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        url.to_string()
    }

    async fn handle_token_redirect_request(&self, request: &RedirectRequest) -> Result<(), PortError> {
        let base = Url::parse(&self.redirect_uri)
            .map_err(|e| PortError::Authentication(format!("invalid redirect uri: {e}")))?;
        let url = base
            .join(&request.target)
            .map_err(|e| PortError::Authentication(format!("invalid redirect request: {e}")))?;

        let mut code = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error" => return Err(PortError::Authentication(format!("authorization denied: {value}"))),
                _ => {}
            }
        }
        let code = code.ok_or_else(|| PortError::Authentication("authorization code not found".to_string()))?;

        let now = self.ctx.clock.now();
        let credentials = self
            .ctx
            .request_tokens(&[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", &self.redirect_uri),
            ])
            .await?
            .into_credentials(now, None);
        if credentials.refresh_token.is_none() {
            tracing::warn!("token response carried no refresh_token, credentials will expire");
        }
        self.ctx.save_credentials(&credentials).await?;
        tracing::info!("gmail credentials stored");
        Ok(())
    }
}

impl From<reqwest::Error> for PortError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => PortError::Http {
                status: status.as_u16(),
                context: err.to_string(),
            },
            None => PortError::Network(err.to_string()),
        }
    }
}

async fn check_status(response: reqwest::Response, context: &str) -> Result<reqwest::Response, PortError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), context, "gmail request failed");
    Err(PortError::Http {
        status: status.as_u16(),
        context: format!("{context}: {body}"),
    })
}

fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// RFC 2047 encoded-word for non-ASCII subjects.
fn encode_subject(subject: &str) -> String {
    let subject = header_value(subject);
    if subject.is_ascii() {
        subject
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(subject.as_bytes()))
    }
}

fn build_raw_email(email: &Email) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
        header_value(&email.sender),
        header_value(&email.recipient),
        encode_subject(&email.subject),
        email.body
    )
}

fn encode_raw_email(email: &Email) -> String {
    URL_SAFE_NO_PAD.encode(build_raw_email(email).as_bytes())
}
