// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account authentication routes: password sign-up/sign-in and Google sign-in.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, SESSION_COOKIE};
use crate::models::{MailProvider, UserAccount};
use crate::services::{ConnectionCredentials, GoogleUserInfo};
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long a signed OAuth state stays valid.
const OAUTH_STATE_TTL_MS: u128 = 10 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/google", post(google_sign_in))
        .route("/auth/google/authorize", get(google_authorize))
        .route("/auth/logout", get(logout).post(logout))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 256))]
    pub password: String,
    #[validate(length(max = 120))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Session response for every sign-in flavor.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub email: String,
    pub display_name: Option<String>,
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn start_session(
    state: &AppState,
    jar: CookieJar,
    account: &UserAccount,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let token = create_jwt(&account.email, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let secure = state.config.frontend_url.starts_with("https://");
    let jar = jar.add(session_cookie(token.clone(), secure));

    Ok((
        jar,
        Json(AuthResponse {
            token,
            email: account.email.clone(),
            display_name: account.display_name.clone(),
        }),
    ))
}

/// Register with email and password.
async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    req.validate()?;

    let account = state
        .accounts
        .sign_up(&req.email, &req.password, req.display_name)
        .await?
        .into_result()?;
    seed_profile(&state, &account.email, account.display_name.as_deref(), None);

    let (jar, body) = start_session(&state, jar, &account)?;
    Ok((StatusCode::CREATED, jar, body))
}

/// Sign in with email and password.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let persisted = state.accounts.sign_in(&req.email, &req.password).await?;
    if let Some(e) = &persisted.write_error {
        // Only last_login_at is lost; the session is still valid.
        tracing::warn!(error = %e, "Failed to persist last login time");
    }
    tracing::info!(user_id = %persisted.value.email, "Signed in");
    start_session(&state, jar, &persisted.value)
}

/// Query parameters for the Google popup URL.
#[derive(Deserialize)]
pub struct AuthorizeParams {
    /// Popup redirect target. Defaults to `{FRONTEND_URL}/oauth/callback`.
    #[serde(default)]
    redirect_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub url: String,
    pub state: String,
}

/// Build the Google popup authorization URL with a signed state.
async fn google_authorize(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Json<AuthorizeResponse>> {
    let redirect_uri = params
        .redirect_uri
        .unwrap_or_else(|| format!("{}/oauth/callback", state.config.frontend_url));

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis();

    let oauth_state = sign_state(&redirect_uri, timestamp, &state.config.oauth_state_key)?;
    let url = state
        .google_identity
        .authorization_url(&redirect_uri, &oauth_state);

    tracing::info!(redirect_uri = %redirect_uri, "Issued Google authorization URL");
    Ok(Json(AuthorizeResponse {
        url,
        state: oauth_state,
    }))
}

/// Token captured by the Google popup.
#[derive(Debug, Deserialize)]
pub struct GoogleTokenRequest {
    pub access_token: String,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Signed state issued by `/auth/google/authorize`
    pub state: String,
}

/// Check the popup state and resolve the Google account behind the token.
pub(crate) async fn resolve_google_token(
    state: &AppState,
    req: &GoogleTokenRequest,
) -> Result<GoogleUserInfo> {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis();

    if verify_state(&req.state, &state.config.oauth_state_key, now_ms).is_none() {
        tracing::warn!("Invalid or expired OAuth state");
        return Err(AppError::BadRequest("Invalid or expired OAuth state".to_string()));
    }
    if req.access_token.trim().is_empty() {
        return Err(AppError::BadRequest("Missing access token".to_string()));
    }

    state
        .google_identity
        .fetch_user_info(&req.access_token)
        .await
        .map_err(|e| match AppError::from(e) {
            err if err.is_credential_error() => AppError::InvalidToken,
            err => err,
        })
}

/// Store the popup token as the user's Gmail connection.
pub(crate) fn capture_gmail_token(
    state: &AppState,
    user_id: &str,
    info: &GoogleUserInfo,
    req: &GoogleTokenRequest,
) -> Result<crate::models::EmailConnection> {
    let connection = state
        .connections
        .upsert_connection(
            user_id,
            ConnectionCredentials {
                provider: MailProvider::Gmail,
                email: info.email.clone(),
                access_token: req.access_token.clone(),
                refresh_token: None,
                token_expires_at: req
                    .expires_in
                    .filter(|s| *s > 0)
                    .map(|s| Utc::now() + Duration::seconds(s)),
            },
        )
        .into_result()?;

    let count = state.connections.connected_count(user_id);
    state
        .onboarding
        .mark_email_connected(user_id, count)
        .into_result()?;
    Ok(connection)
}

/// Fill empty profile fields from the sign-up source.
fn seed_profile(state: &AppState, email: &str, name: Option<&str>, avatar_url: Option<&str>) {
    let persisted = state.profiles.seed(email, name, avatar_url);
    if let Some(e) = &persisted.write_error {
        // The account exists; the profile falls back to defaults.
        tracing::warn!(user_id = %email, error = %e, "Failed to persist seeded profile");
    }
}

/// Sign in with a Google access token; also connects Gmail.
async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<GoogleTokenRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let info = resolve_google_token(&state, &req).await?;

    let account = state.accounts.sign_in_with_google(&info)?.into_result()?;
    seed_profile(
        &state,
        &account.email,
        info.name.as_deref(),
        info.picture.as_deref(),
    );
    capture_gmail_token(&state, &account.email, &info, &req)?;

    tracing::info!(user_id = %account.email, "Signed in with Google");
    start_session(&state, jar, &account)
}

/// Clear the session cookie.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let secure = state.config.frontend_url.starts_with("https://");
    let jar = jar.remove(session_cookie(String::new(), secure));
    (StatusCode::NO_CONTENT, jar)
}

/// Encode `redirect_uri|timestamp_hex|signature_hex` as URL-safe base64.
fn sign_state(redirect_uri: &str, timestamp_ms: u128, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", redirect_uri, timestamp_ms);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Verify signature and age; returns the redirect URI the state was issued for.
fn verify_state(state: &str, secret: &[u8], now_ms: u128) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // The redirect URI may itself contain '|', so split from the right.
    let mut parts = state_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let redirect_uri = parts.next()?;

    let payload = format!("{}|{}", redirect_uri, timestamp_hex);
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued_ms) > OAUTH_STATE_TTL_MS || issued_ms > now_ms + 60_000 {
        return None;
    }

    Some(redirect_uri.to_string())
}
