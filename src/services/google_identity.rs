// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google identity: popup authorization URL and user-info lookup.
//!
//! The browser runs Google's implicit token flow in a popup and hands us the
//! resulting access token. That flow never yields a refresh token; the
//! token is exchanged once against the user-info endpoint for the account email.

use crate::services::gmail::{FailureCause, MailApiError};
use serde::Deserialize;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Scopes requested by the popup: identity plus read-only Gmail.
pub const GOOGLE_SCOPES: &str =
    "openid email profile https://www.googleapis.com/auth/gmail.readonly";

/// Account details for a Google access token.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub email: String,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Google OAuth/user-info client.
#[derive(Clone)]
pub struct GoogleIdentityClient {
    http: reqwest::Client,
    client_id: String,
    userinfo_url: String,
}

impl GoogleIdentityClient {
    pub fn new(client_id: String, userinfo_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            userinfo_url,
        }
    }

    /// URL the front end opens in the OAuth popup.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=token&scope={}&include_granted_scopes=true&prompt=consent&state={}",
            GOOGLE_AUTHORIZE_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(GOOGLE_SCOPES),
            urlencoding::encode(state),
        )
    }

    /// Resolve the account behind an access token.
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<GoogleUserInfo, MailApiError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(MailApiError::network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Google user-info lookup failed");
            return Err(MailApiError::from_response(status.as_u16(), &body));
        }

        let info: GoogleUserInfo = response.json().await.map_err(|e| MailApiError {
            status: Some(status.as_u16()),
            message: format!("Failed to parse user info: {}", e),
            cause: FailureCause::Unknown,
        })?;

        if info.email_verified == Some(false) {
            return Err(MailApiError {
                status: Some(status.as_u16()),
                message: "Google account email is not verified".to_string(),
                cause: FailureCause::InsufficientScope,
            });
        }

        Ok(GoogleUserInfo {
            email: info.email.trim().to_lowercase(),
            ..info
        })
    }
}
