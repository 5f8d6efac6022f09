// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Inbox scan routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::MailProvider;
use crate::services::scan::ProgressFn;
use crate::services::{ScanReport, ScanStage};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/scan", post(start_scan))
        .route("/api/scan/progress", get(get_progress))
        .route("/api/scan/cancel", post(cancel_scan))
}

/// Scan the user's Gmail inbox.
///
/// Scan failures are reported in the body (`ok: false`) with status 200 so
/// the client can show the technical details; only missing preconditions
/// are HTTP errors.
async fn start_scan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ScanReport>> {
    let connection = state
        .connections
        .get_by_provider(&user.email, MailProvider::Gmail)
        .filter(|c| c.has_valid_credential(chrono::Utc::now()))
        .ok_or_else(|| {
            AppError::BadRequest("No connected Gmail account with a valid token".to_string())
        })?;

    let active = state
        .scan_progress
        .begin(&user.email)
        .ok_or_else(|| AppError::Conflict("A scan is already running".to_string()))?;

    state
        .onboarding
        .mark_scan_started(&user.email)
        .into_result()?;

    // The scan owns its guard and outlives the request; a client that
    // disconnects mid-scan still gets its results recorded.
    let task_state = state.clone();
    let user_id = user.email.clone();
    let scan = tokio::spawn(async move {
        let tracker = task_state.scan_progress.clone();
        let progress_user = user_id.clone();
        let on_progress: &ProgressFn =
            &move |stage: ScanStage| tracker.set(&progress_user, stage);

        let report = task_state
            .scanner
            .run(&user_id, &connection, Some(on_progress), Some(active.flag()))
            .await;

        if report.ok {
            task_state
                .onboarding
                .mark_scan_complete(&user_id)
                .into_result()?;
        }
        drop(active);

        Ok::<_, AppError>(report)
    });

    let report = scan
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Scan task failed: {}", e)))??;

    Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub running: bool,
    pub stage: Option<ScanStage>,
    pub label: Option<&'static str>,
}

async fn get_progress(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<ProgressResponse> {
    let stage = state.scan_progress.get(&user.email);
    Json(ProgressResponse {
        running: state.scan_progress.is_running(&user.email),
        stage,
        label: stage.map(ScanStage::label),
    })
}

/// Ask the running scan to stop at its next checkpoint.
async fn cancel_scan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<StatusCode> {
    if state.scan_progress.cancel(&user.email) {
        tracing::info!(user_id = %user.email, "Scan cancellation requested");
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(AppError::NotFound("No scan is running".to_string()))
    }
}
