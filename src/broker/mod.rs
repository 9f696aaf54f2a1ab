//! Session-token exchange with the upstream avatar platform.
//!
//! The broker is the only code that reads the stored credential for outbound
//! use. It trades it for a short-lived session token the browser client can
//! hold, and nothing it returns ever contains the credential.
//!
//! # Flow
//! 1. Read the settings record; no credential means no request at all
//! 2. POST the persona config with `Authorization: Bearer <credential>`
//! 3. Return `sessionToken` from a 200 response body
//!
//! No retries and no caching: every call is exactly one exchange.

use crate::settings::{ConfigurationRecord, SettingsStore};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest upstream error detail passed back to callers.
const MAX_DETAIL_LEN: usize = 256;

/// Most bytes read from a rejected response body.
const MAX_ERROR_BODY_BYTES: usize = 1024;

/// Ephemeral token issued by the upstream platform. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// No credential stored; no request was made.
    #[error("no API key is configured")]
    NotConfigured,

    /// Upstream answered with a non-200 status (`code` set) or the request
    /// never completed (`code` is `None`).
    #[error("upstream session request failed: {detail}")]
    UpstreamFailure { code: Option<u16>, detail: String },

    /// 200 response without a usable `sessionToken`.
    #[error("upstream response did not contain a session token")]
    MalformedResponse,

    #[error("settings unavailable")]
    Storage,
}

impl BrokerError {
    /// Stable identifier for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::NotConfigured => "NotConfigured",
            BrokerError::UpstreamFailure { .. } => "UpstreamFailure",
            BrokerError::MalformedResponse => "MalformedResponse",
            BrokerError::Storage => "StorageError",
        }
    }
}

/// Request body for the session-token endpoint.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SessionTokenRequest<'a> {
    persona_config: PersonaConfig<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PersonaConfig<'a> {
    persona_id: &'a str,
    avatar_id: &'a str,
    voice_id: &'a str,
    llm_id: &'a str,
}

impl<'a> SessionTokenRequest<'a> {
    fn from_record(record: &'a ConfigurationRecord) -> Self {
        Self {
            persona_config: PersonaConfig {
                persona_id: &record.persona_id,
                avatar_id: &record.avatar_id,
                voice_id: &record.voice_id,
                llm_id: record.model_id.as_str(),
            },
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SessionTokenResponse {
    #[serde(default)]
    session_token: Option<String>,
}

/// Exchanges the stored credential for session tokens.
pub struct CredentialBroker {
    store: Arc<SettingsStore>,
    http_client: Client,
    endpoint: String,
}

impl CredentialBroker {
    /// # Arguments
    /// * `store` - Settings store holding the credential
    /// * `endpoint` - Full URL of the upstream session-token endpoint
    /// * `timeout` - Upper bound for the whole exchange
    /// * `user_agent` - User-Agent sent upstream
    pub fn new(
        store: Arc<SettingsStore>,
        endpoint: String,
        timeout: Duration,
        user_agent: &str,
    ) -> anyhow::Result<Self> {
        // reqwest verifies certificates unless told otherwise
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            store,
            http_client,
            endpoint,
        })
    }

    /// Performs one exchange and returns the issued token.
    pub async fn issue_session_token(&self) -> Result<SessionToken, BrokerError> {
        let record = self.store.get().map_err(|e| {
            warn!(error = %e, "Failed to read settings for session token");
            BrokerError::Storage
        })?;

        if !record.has_credential() {
            info!("Session token requested but no API key is configured");
            return Err(BrokerError::NotConfigured);
        }

        let credential = record.credential();
        let body = SessionTokenRequest::from_record(&record);

        debug!(
            endpoint = %self.endpoint,
            model_id = %record.model_id,
            "Requesting session token"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(credential)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let detail = scrub(&transport_detail(e), credential);
                warn!(detail = %detail, "Session token request failed");
                BrokerError::UpstreamFailure { code: None, detail }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = read_body_prefix(response, MAX_ERROR_BODY_BYTES).await;
            let detail = scrub(&format!("upstream returned {}: {}", status, text), credential);
            warn!(status = status.as_u16(), "Session token request rejected");
            return Err(BrokerError::UpstreamFailure {
                code: Some(status.as_u16()),
                detail,
            });
        }

        let parsed: SessionTokenResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Session token response was not valid JSON");
            BrokerError::MalformedResponse
        })?;

        match parsed.session_token {
            Some(token) if !token.trim().is_empty() => {
                info!("Session token issued");
                Ok(SessionToken(token))
            }
            _ => {
                warn!("Session token response had no token");
                Err(BrokerError::MalformedResponse)
            }
        }
    }
}

/// Reads at most `limit` bytes of the body. Read errors end the prefix early.
async fn read_body_prefix(mut response: Response, limit: usize) -> String {
    let mut buf = Vec::new();
    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }
    buf.truncate(limit);
    String::from_utf8_lossy(&buf).into_owned()
}

fn transport_detail(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "upstream request timed out".to_string()
    } else if e.is_connect() {
        "could not connect to upstream".to_string()
    } else {
        // Drop the URL; only the error kind is useful to callers
        format!("upstream request failed: {}", e.without_url())
    }
}

/// Removes every occurrence of `secret` and caps the length.
fn scrub(detail: &str, secret: &str) -> String {
    let cleaned = if secret.is_empty() {
        detail.to_string()
    } else {
        detail.replace(secret, "[redacted]")
    };

    if cleaned.chars().count() <= MAX_DETAIL_LEN {
        cleaned
    } else {
        let mut truncated: String = cleaned.chars().take(MAX_DETAIL_LEN).collect();
        truncated.push('…');
        truncated
    }
}
