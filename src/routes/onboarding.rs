// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Onboarding wizard routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{OnboardingRoute, OnboardingState};
use crate::services::compute_next_route;
use crate::AppState;
use axum::{extract::State, routing::get, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/onboarding", get(get_onboarding))
        .route("/api/onboarding/next", get(get_next_route))
        .route("/api/onboarding/extension", post(set_extension))
        .route("/api/onboarding/reset", post(reset_onboarding))
}

#[derive(Debug, Serialize)]
pub struct NextRouteResponse {
    pub route: OnboardingRoute,
    pub path: &'static str,
}

impl From<OnboardingRoute> for NextRouteResponse {
    fn from(route: OnboardingRoute) -> Self {
        Self {
            route,
            path: route.path(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OnboardingResponse {
    pub state: OnboardingState,
    pub has_credential: bool,
    pub next: NextRouteResponse,
}

/// Evaluate the next route from fresh state; nothing is cached.
fn next_route(state: &AppState, user_id: &str, onboarding: &OnboardingState) -> (bool, OnboardingRoute) {
    let has_credential = state.connections.has_valid_credential(user_id);
    let subscription_count = state.subscriptions.count(user_id);
    (
        has_credential,
        compute_next_route(has_credential, onboarding, subscription_count),
    )
}

async fn get_onboarding(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<OnboardingResponse> {
    let onboarding = state.onboarding.get(&user.email);
    let (has_credential, route) = next_route(&state, &user.email, &onboarding);
    Json(OnboardingResponse {
        state: onboarding,
        has_credential,
        next: route.into(),
    })
}

async fn get_next_route(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<NextRouteResponse> {
    let onboarding = state.onboarding.get(&user.email);
    let (_, route) = next_route(&state, &user.email, &onboarding);
    Json(route.into())
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionAction {
    Connected,
    Skipped,
}

#[derive(Debug, Deserialize)]
pub struct ExtensionRequest {
    pub action: ExtensionAction,
}

async fn set_extension(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ExtensionRequest>,
) -> Result<Json<OnboardingResponse>> {
    let persisted = match req.action {
        ExtensionAction::Connected => state.onboarding.mark_extension_connected(&user.email),
        ExtensionAction::Skipped => state.onboarding.mark_extension_skipped(&user.email),
    };
    let onboarding = persisted.into_result()?;
    let (has_credential, route) = next_route(&state, &user.email, &onboarding);

    Ok(Json(OnboardingResponse {
        state: onboarding,
        has_credential,
        next: route.into(),
    }))
}

async fn reset_onboarding(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<OnboardingState>> {
    Ok(Json(state.onboarding.reset(&user.email).into_result()?))
}
