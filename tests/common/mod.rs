// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use std::sync::Arc;
use subtrack::config::Config;
use subtrack::db::RecordStore;
use subtrack::middleware::auth::create_jwt;
use subtrack::routes::create_router;
use subtrack::AppState;

/// Create a test app over an in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_config(Config::test_default())
}

/// Create a test app with a custom config (e.g. mock API base URLs).
#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    create_test_app_with_store(config, RecordStore::in_memory())
}

#[allow(dead_code)]
pub fn create_test_app_with_store(
    config: Config,
    store: RecordStore,
) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config, store));
    (create_router(state.clone()), state)
}

/// Session token for `email` signed with the test key.
#[allow(dead_code)]
pub fn test_jwt(email: &str) -> String {
    create_jwt(email, &Config::test_default().jwt_signing_key).unwrap()
}

/// Authenticated JSON request.
#[allow(dead_code)]
pub fn authed_request(method: &str, uri: &str, email: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", test_jwt(email)));

    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
