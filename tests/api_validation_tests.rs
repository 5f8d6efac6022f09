// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API input validation tests.

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

mod common;

const USER: &str = "a@example.com";

#[tokio::test]
async fn test_profile_update_rejects_bad_fields() {
    let (app, state) = common::create_test_app();

    for body in [
        json!({"preferred_currency": "us"}),
        json!({"reminder_days_before": 90}),
        json!({"avatar_url": "not a url"}),
        json!({"display_name": "x".repeat(121)}),
    ] {
        let response = app
            .clone()
            .oneshot(common::authed_request("PUT", "/api/profile", USER, Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    assert_eq!(state.profiles.get(USER).updated_at, None);
}

#[tokio::test]
async fn test_profile_update_normalizes_currency() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(common::authed_request(
            "PUT",
            "/api/profile",
            USER,
            Some(json!({"preferred_currency": "eur", "reminder_days_before": 7})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;

    assert_eq!(body["email"], USER);
    assert_eq!(body["profile"]["preferred_currency"], "EUR");
    assert_eq!(body["profile"]["reminder_days_before"], 7);
    // No account record behind a bare token.
    assert!(body["auth_provider"].is_null());
}

#[tokio::test]
async fn test_connection_requires_valid_email_and_token() {
    let (app, state) = common::create_test_app();

    for body in [
        json!({"provider": "gmail", "email": "not-an-email", "access_token": "t"}),
        json!({"provider": "gmail", "email": "a@gmail.com", "access_token": ""}),
    ] {
        let response = app
            .clone()
            .oneshot(common::authed_request(
                "POST",
                "/api/connections",
                USER,
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    assert!(state.connections.list(USER).is_empty());
}

#[tokio::test]
async fn test_unknown_provider_rejected() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(common::authed_request(
            "POST",
            "/api/connections",
            USER,
            Some(json!({"provider": "aol", "email": "a@aol.com", "access_token": "t"})),
        ))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_gmail_connect_requires_signed_state() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(common::authed_request(
            "POST",
            "/api/connections/gmail",
            USER,
            Some(json!({"access_token": "ya29.token", "state": "bogus"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
