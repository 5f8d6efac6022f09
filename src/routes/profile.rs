// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Current user and profile routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{AuthProvider, Profile};
use crate::services::ProfileUpdate;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/profile", get(get_profile).put(update_profile))
}

/// Account summary plus editable profile.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub email: String,
    pub auth_provider: Option<AuthProvider>,
    pub member_since: Option<String>,
    pub profile: Profile,
}

fn respond(state: &AppState, email: &str, profile: Profile) -> Json<ProfileResponse> {
    let account = state.accounts.get(email);
    Json(ProfileResponse {
        email: email.to_string(),
        auth_provider: account.as_ref().map(|a| a.auth_provider),
        member_since: account.map(|a| format_utc_rfc3339(a.created_at)),
        profile,
    })
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<ProfileResponse> {
    let profile = state.profiles.get(&user.email);
    respond(&state, &user.email, profile)
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>> {
    let profile = state
        .profiles
        .update(&user.email, update)?
        .into_result()?;
    Ok(respond(&state, &user.email, profile))
}
