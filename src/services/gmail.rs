// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gmail REST API client for inbox scans.
//!
//! Handles:
//! - Message search (ids only)
//! - Lightweight metadata fetches (From, Subject, Date headers)
//! - Classification of Google API errors into likely causes

use serde::Deserialize;
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Why a Google API call failed, as far as we can tell from status and message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    ExpiredToken,
    InsufficientScope,
    RateLimited,
    ServerError,
    Network,
    Unknown,
}

impl FailureCause {
    /// Human-readable explanation shown in the scan error panel.
    pub fn likely_cause(self) -> &'static str {
        match self {
            FailureCause::ExpiredToken => {
                "Your Google access token has expired or was revoked. Please reconnect your account."
            }
            FailureCause::InsufficientScope => {
                "Gmail read access was not granted. Please reconnect and allow access to your email."
            }
            FailureCause::RateLimited => {
                "Gmail rate limit or quota exceeded. Please try again in a few minutes."
            }
            FailureCause::ServerError => "Gmail is having problems right now. Please try again later.",
            FailureCause::Network => "Could not reach Gmail. Check your connection and try again.",
            FailureCause::Unknown => "Unexpected response from Gmail.",
        }
    }
}

/// Error from a Google API call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} (HTTP {})", display_status(.status))]
pub struct MailApiError {
    /// HTTP status, `None` for transport failures
    pub status: Option<u16>,
    pub message: String,
    pub cause: FailureCause,
}

impl MailApiError {
    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self {
            status: None,
            message: err.to_string(),
            cause: FailureCause::Network,
        }
    }

    /// Build an error from a non-2xx response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<GoogleErrorBody>(body)
            .ok()
            .map(|b| b.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.chars().take(200).collect());

        Self {
            status: Some(status),
            cause: classify(status, &message),
            message,
        }
    }

    /// 401/403: the token cannot be used for this mailbox.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "n/a".to_string(), |s| s.to_string())
}

fn classify(status: u16, message: &str) -> FailureCause {
    let msg = message.to_lowercase();
    match status {
        401 => FailureCause::ExpiredToken,
        403 if msg.contains("rate") || msg.contains("quota") => FailureCause::RateLimited,
        403 if msg.contains("insufficient") || msg.contains("scope") => {
            FailureCause::InsufficientScope
        }
        403 => FailureCause::InsufficientScope,
        429 => FailureCause::RateLimited,
        500..=599 => FailureCause::ServerError,
        _ if msg.contains("expired") || msg.contains("invalid credentials") => {
            FailureCause::ExpiredToken
        }
        _ => FailureCause::Unknown,
    }
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    message: String,
}

/// Gmail API client.
#[derive(Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GmailClient {
    /// Create a client against `base_url` (e.g. `https://gmail.googleapis.com/gmail/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Per-request timeout; an expired request is a network failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Search the mailbox; returns message ids in the order Gmail returns them.
    pub async fn search_messages(
        &self,
        access_token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>, MailApiError> {
        let url = format!("{}/users/me/messages", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .query(&[("q", query.to_string()), ("maxResults", max_results.to_string())])
            .send()
            .await
            .map_err(MailApiError::network)?;

        let list: MessageList = check_response_json(response).await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    /// Fetch only the From/Subject/Date headers of a message.
    pub async fn get_message_metadata(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<MessageMetadata, MailApiError> {
        let url = format!(
            "{}/users/me/messages/{}",
            self.base_url,
            urlencoding::encode(message_id)
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "Date"),
            ])
            .send()
            .await
            .map_err(MailApiError::network)?;

        let message: GmailMessage = check_response_json(response).await?;
        Ok(MessageMetadata::from(message))
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, MailApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let err = MailApiError::from_response(status.as_u16(), &body);
        if err.cause == FailureCause::RateLimited {
            tracing::warn!(status = status.as_u16(), "Gmail rate limit hit");
        }
        return Err(err);
    }

    response.json().await.map_err(|e| MailApiError {
        status: Some(status.as_u16()),
        message: format!("JSON parse error: {}", e),
        cause: FailureCause::Unknown,
    })
}

/// `users.messages.list` response.
#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

/// `users.messages.get?format=metadata` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    #[serde(default)]
    payload: Option<MessagePayload>,
    /// Epoch milliseconds, as a string
    #[serde(default)]
    internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

/// Headers needed for detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageMetadata {
    pub id: String,
    pub from: Option<String>,
    pub subject: Option<String>,
    /// `Date:` header, or the internal date (RFC 3339) when the header is absent
    pub date: Option<String>,
}

impl From<GmailMessage> for MessageMetadata {
    fn from(message: GmailMessage) -> Self {
        let headers = message.payload.map(|p| p.headers).unwrap_or_default();
        let find = |name: &str| {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        };

        let date = find("Date").or_else(|| {
            message
                .internal_date
                .as_deref()
                .and_then(|ms| ms.parse::<i64>().ok())
                .and_then(chrono::DateTime::from_timestamp_millis)
                .map(|dt| dt.to_rfc3339())
        });

        Self {
            from: find("From"),
            subject: find("Subject"),
            date,
            id: message.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_google_errors() {
        let body = r#"{"error":{"code":401,"message":"Request had invalid authentication credentials.","status":"UNAUTHENTICATED"}}"#;
        let err = MailApiError::from_response(401, body);
        assert_eq!(err.cause, FailureCause::ExpiredToken);
        assert!(err.is_auth_failure());
        assert!(err.message.contains("invalid authentication"));

        let body = r#"{"error":{"code":403,"message":"Request had insufficient authentication scopes."}}"#;
        assert_eq!(
            MailApiError::from_response(403, body).cause,
            FailureCause::InsufficientScope
        );

        let body = r#"{"error":{"code":403,"message":"User-rate limit exceeded"}}"#;
        assert_eq!(
            MailApiError::from_response(403, body).cause,
            FailureCause::RateLimited
        );

        assert_eq!(
            MailApiError::from_response(429, "").cause,
            FailureCause::RateLimited
        );
        assert_eq!(
            MailApiError::from_response(503, "<html>").cause,
            FailureCause::ServerError
        );
        assert_eq!(
            MailApiError::from_response(400, "bad").cause,
            FailureCause::Unknown
        );
    }

    #[test]
    fn test_non_json_body_becomes_message() {
        let err = MailApiError::from_response(502, "Bad Gateway");
        assert_eq!(err.message, "Bad Gateway");
        assert!(!err.is_auth_failure());
        assert_eq!(err.to_string(), "Bad Gateway (HTTP 502)");
    }

    #[test]
    fn test_metadata_from_message() {
        let json = r#"{
            "id": "m1",
            "internalDate": "1704103200000",
            "payload": {"headers": [
                {"name": "from", "value": "Spotify <no-reply@spotify.com>"},
                {"name": "Subject", "value": "Your receipt"}
            ]}
        }"#;
        let message: GmailMessage = serde_json::from_str(json).unwrap();
        let meta = MessageMetadata::from(message);

        assert_eq!(meta.id, "m1");
        assert_eq!(meta.from.as_deref(), Some("Spotify <no-reply@spotify.com>"));
        assert_eq!(meta.subject.as_deref(), Some("Your receipt"));
        assert_eq!(meta.date.as_deref(), Some("2024-01-01T10:00:00+00:00"));
    }
}
