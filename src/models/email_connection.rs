// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Linked mail provider accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Supported mail providers. Only Gmail can be scanned today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum MailProvider {
    Gmail,
    Outlook,
    Icloud,
    Imap,
}

/// Outcome of the most recent scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ScanOutcome {
    Success,
    Error,
}

/// Stored connection (one per user and provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConnection {
    pub id: String,
    pub user_id: String,
    pub provider: MailProvider,
    pub email: String,
    pub access_token: String,
    /// Always `None` for tokens captured through the browser popup flow
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub connected: bool,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub last_scan_status: Option<ScanOutcome>,
    pub last_scan_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailConnection {
    /// Connected with a non-empty token that has not expired at `now`.
    pub fn has_valid_credential(&self, now: DateTime<Utc>) -> bool {
        self.connected
            && !self.access_token.is_empty()
            && self.token_expires_at.map_or(true, |exp| exp > now)
    }
}

/// Connection as returned by the API (tokens are never echoed back).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ConnectionView {
    pub id: String,
    pub provider: MailProvider,
    pub email: String,
    pub connected: bool,
    pub has_access_token: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub last_scan_status: Option<ScanOutcome>,
    pub last_scan_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&EmailConnection> for ConnectionView {
    fn from(c: &EmailConnection) -> Self {
        Self {
            id: c.id.clone(),
            provider: c.provider,
            email: c.email.clone(),
            connected: c.connected,
            has_access_token: !c.access_token.is_empty(),
            token_expires_at: c.token_expires_at,
            last_scanned_at: c.last_scanned_at,
            last_scan_status: c.last_scan_status,
            last_scan_error: c.last_scan_error.clone(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn connection(expires_at: Option<DateTime<Utc>>) -> EmailConnection {
        let now = Utc::now();
        EmailConnection {
            id: "c1".to_string(),
            user_id: "a@example.com".to_string(),
            provider: MailProvider::Gmail,
            email: "a@gmail.com".to_string(),
            access_token: "ya29.token".to_string(),
            refresh_token: None,
            token_expires_at: expires_at,
            connected: true,
            last_scanned_at: None,
            last_scan_status: None,
            last_scan_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_credential_validity() {
        let now = Utc::now();
        assert!(connection(None).has_valid_credential(now));
        assert!(connection(Some(now + Duration::minutes(5))).has_valid_credential(now));
        assert!(!connection(Some(now - Duration::seconds(1))).has_valid_credential(now));

        let mut disconnected = connection(None);
        disconnected.connected = false;
        assert!(!disconnected.has_valid_credential(now));
    }

    #[test]
    fn test_provider_wire_format() {
        assert_eq!(
            serde_json::to_string(&MailProvider::Icloud).unwrap(),
            "\"icloud\""
        );
        let view = ConnectionView::from(&connection(None));
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("access_token").is_none());
        assert_eq!(json["has_access_token"], true);
    }
}
