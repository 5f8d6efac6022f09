// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription CRUD routes and the change-event stream.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Subscription, SubscriptionDraft, SubscriptionStatus, SubscriptionUpdate};
use crate::services::{SubscriptionFilter, SubscriptionSummary};
use crate::time_utils::days_until;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use futures_util::stream::{self, Stream};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/subscriptions",
            get(list_subscriptions).post(create_subscription),
        )
        .route("/api/subscriptions/summary", get(get_summary))
        .route("/api/subscriptions/events", get(subscription_events))
        .route(
            "/api/subscriptions/{id}",
            get(get_subscription)
                .put(update_subscription)
                .delete(delete_subscription),
        )
        .route(
            "/api/subscriptions/{id}/duplicate",
            post(duplicate_subscription),
        )
}

/// Subscription plus fields derived for display.
#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    /// Status after review rules; used for badges and filtering
    pub display_status: SubscriptionStatus,
    pub next_renewal: Option<NaiveDate>,
    pub days_until_renewal: Option<i64>,
}

impl SubscriptionView {
    fn new(subscription: Subscription, today: NaiveDate) -> Self {
        let next_renewal = subscription.next_renewal(today);
        Self {
            display_status: subscription.display_status(),
            days_until_renewal: next_renewal.map(|d| days_until(d, today)),
            next_renewal,
            subscription,
        }
    }
}

fn view(subscription: Subscription) -> Json<SubscriptionView> {
    Json(SubscriptionView::new(subscription, Utc::now().date_naive()))
}

async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(filter): Query<SubscriptionFilter>,
) -> Json<Vec<SubscriptionView>> {
    let today = Utc::now().date_naive();
    Json(
        state
            .subscriptions
            .list_filtered(&user.email, &filter)
            .into_iter()
            .map(|s| SubscriptionView::new(s, today))
            .collect(),
    )
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(draft): Json<SubscriptionDraft>,
) -> Result<(StatusCode, Json<SubscriptionView>)> {
    let created = state
        .subscriptions
        .create(&user.email, draft)?
        .into_result()?;
    Ok((StatusCode::CREATED, view(created)))
}

async fn get_summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<SubscriptionSummary> {
    Json(state.subscriptions.summary(&user.email))
}

async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionView>> {
    Ok(view(state.subscriptions.get(&user.email, &id)?))
}

async fn update_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(update): Json<SubscriptionUpdate>,
) -> Result<Json<SubscriptionView>> {
    let updated = state
        .subscriptions
        .update(&user.email, &id, update)?
        .into_result()?;
    Ok(view(updated))
}

async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .subscriptions
        .delete(&user.email, &id)?
        .into_result()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn duplicate_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SubscriptionView>)> {
    let copy = state
        .subscriptions
        .duplicate(&user.email, &id)?
        .into_result()?;
    Ok((StatusCode::CREATED, view(copy)))
}

/// Server-sent events for the caller's registry mutations.
///
/// The observer is unsubscribed when the client disconnects and the stream
/// is dropped.
async fn subscription_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let observer = state.subscriptions.events().subscribe_user(&user.email);
    tracing::debug!(user_id = %user.email, subscriber = observer.id(), "Event stream opened");

    let events = stream::unfold(observer, |mut observer| async move {
        let event = observer.recv().await?;
        let sse = Event::default().event("registry").json_data(&event);
        Some((sse, observer))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
