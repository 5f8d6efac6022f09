// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email connection routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{ConnectionView, MailProvider};
use crate::routes::auth::{capture_gmail_token, resolve_google_token, GoogleTokenRequest};
use crate::services::ConnectionCredentials;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/connections",
            get(list_connections).post(create_connection),
        )
        .route("/api/connections/gmail", post(connect_gmail))
        .route("/api/connections/{id}/toggle", put(toggle_connection))
        .route("/api/connections/{id}", delete(disconnect))
}

async fn list_connections(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<Vec<ConnectionView>> {
    Json(
        state
            .connections
            .list(&user.email)
            .iter()
            .map(ConnectionView::from)
            .collect(),
    )
}

/// Credentials obtained outside the Gmail popup flow.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateConnectionRequest {
    pub provider: MailProvider,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: Option<i64>,
}

async fn create_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<ConnectionView>)> {
    req.validate()?;

    let connection = state
        .connections
        .upsert_connection(
            &user.email,
            ConnectionCredentials {
                provider: req.provider,
                email: req.email.trim().to_lowercase(),
                access_token: req.access_token,
                refresh_token: req.refresh_token,
                token_expires_at: req
                    .expires_in
                    .filter(|s| *s > 0)
                    .map(|s| Utc::now() + Duration::seconds(s)),
            },
        )
        .into_result()?;

    sync_onboarding_count(&state, &user.email)?;
    Ok((StatusCode::CREATED, Json(ConnectionView::from(&connection))))
}

/// Capture a Gmail token from the browser popup for the signed-in user.
async fn connect_gmail(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<GoogleTokenRequest>,
) -> Result<(StatusCode, Json<ConnectionView>)> {
    let info = resolve_google_token(&state, &req).await?;
    let connection = capture_gmail_token(&state, &user.email, &info, &req)?;

    tracing::info!(user_id = %user.email, mailbox = %info.email, "Gmail connected");
    Ok((StatusCode::CREATED, Json(ConnectionView::from(&connection))))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub connected: bool,
}

async fn toggle_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<ConnectionView>> {
    let connection = state
        .connections
        .toggle(&user.email, &id, req.connected)?
        .into_result()?;

    sync_onboarding_count(&state, &user.email)?;
    Ok(Json(ConnectionView::from(&connection)))
}

async fn disconnect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .connections
        .disconnect(&user.email, &id)?
        .into_result()?;

    sync_onboarding_count(&state, &user.email)?;
    Ok(StatusCode::NO_CONTENT)
}

fn sync_onboarding_count(state: &AppState, user_id: &str) -> Result<()> {
    let count = state.connections.connected_count(user_id);
    state
        .onboarding
        .mark_email_connected(user_id, count)
        .into_result()?;
    Ok(())
}
