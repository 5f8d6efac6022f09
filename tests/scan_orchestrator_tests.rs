// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Inbox scan tests against a mocked Gmail API.

use axum::http::StatusCode;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subtrack::config::{Config, ScanSettings};
use subtrack::db::RecordStore;
use subtrack::models::{EmailConnection, MailProvider, ScanOutcome, SubscriptionDraft};
use subtrack::services::scan::ProgressFn;
use subtrack::services::{
    CancellationFlag, ConnectionCredentials, EmailConnectionRegistry, FailureCause, GmailClient,
    RegistryEvents, ScanOrchestrator, ScanStage, SubscriptionRegistry,
};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

const USER: &str = "a@example.com";

struct Harness {
    scanner: ScanOrchestrator,
    subscriptions: SubscriptionRegistry,
    connections: EmailConnectionRegistry,
    connection: EmailConnection,
}

fn harness(server: &MockServer, queries: &[&str]) -> Harness {
    harness_with_client(GmailClient::new(server.uri()), queries)
}

fn harness_with_client(gmail: GmailClient, queries: &[&str]) -> Harness {
    let store = RecordStore::in_memory();
    let subscriptions = SubscriptionRegistry::new(store.clone(), RegistryEvents::new());
    let connections = EmailConnectionRegistry::new(store);
    let connection = connections
        .upsert_connection(
            USER,
            ConnectionCredentials {
                provider: MailProvider::Gmail,
                email: USER.to_string(),
                access_token: "ya29.token".to_string(),
                refresh_token: None,
                token_expires_at: None,
            },
        )
        .value;

    let scanner = ScanOrchestrator::new(
        gmail,
        subscriptions.clone(),
        connections.clone(),
        ScanSettings {
            max_results: 50,
            batch_size: 2,
            batch_pause_ms: 0,
        },
    )
    .with_queries(queries.iter().map(|q| q.to_string()).collect());

    Harness {
        scanner,
        subscriptions,
        connections,
        connection,
    }
}

async fn mock_search(server: &MockServer, query: &str, ids: &[&str]) {
    let messages: Vec<_> = ids.iter().map(|id| json!({"id": id, "threadId": id})).collect();
    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .and(query_param("q", query))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": messages,
            "resultSizeEstimate": ids.len()
        })))
        .mount(server)
        .await;
}

async fn mock_message(server: &MockServer, id: &str, from: &str, subject: &str, date: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/users/me/messages/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "payload": {
                "headers": [
                    {"name": "From", "value": from},
                    {"name": "Subject", "value": subject},
                    {"name": "Date", "value": date}
                ]
            }
        })))
        .mount(server)
        .await;
}

fn recorder() -> (Arc<Mutex<Vec<ScanStage>>>, impl Fn(ScanStage) + Send + Sync) {
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = stages.clone();
    (stages, move |stage| sink.lock().unwrap().push(stage))
}

#[tokio::test]
async fn test_partial_query_failure_still_succeeds() {
    let server = MockServer::start().await;
    mock_search(&server, "good", &["m1", "m2"]).await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .and(query_param("q", "bad"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
        .mount(&server)
        .await;
    mock_message(
        &server,
        "m1",
        "Netflix <info@mailer.netflix.com>",
        "Your invoice is ready",
        "Mon, 15 Jan 2024 08:30:00 +0000",
    )
    .await;
    mock_message(&server, "m2", "friend@example.org", "Lunch?", "Tue, 16 Jan 2024 12:00:00 +0000")
        .await;

    let h = harness(&server, &["good", "bad"]);
    let report = h.scanner.run(USER, &h.connection, None, None).await;

    assert!(report.ok);
    assert!(report.error.is_none());
    assert_eq!(report.messages_searched, 2);
    assert_eq!(report.messages_fetched, 2);
    assert_eq!(report.query_stats.len(), 2);
    assert!(report.query_stats[0].ok);
    assert_eq!(report.query_stats[0].message_count, 2);
    assert!(!report.query_stats[1].ok);
    assert!(report.query_stats[1].error.is_some());

    assert_eq!(report.detected.len(), 1);
    assert_eq!(report.detected[0].name, "Netflix");
    assert_eq!(report.created, 1);

    let subs = h.subscriptions.list(USER);
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].name, "Netflix");
    assert_eq!(subs[0].price, Some(0.0));
    assert_eq!(subs[0].payment_method.as_deref(), Some("Unknown"));
    assert_eq!(subs[0].started_on.unwrap().to_string(), "2024-01-15");
    assert_eq!(subs[0].renewal_date.unwrap().to_string(), "2024-02-14");
    assert!(subs[0].notes.contains("[source:netflix.com]"));

    let connection = h.connections.get(USER, &h.connection.id).unwrap();
    assert_eq!(connection.last_scan_status, Some(ScanOutcome::Success));
    assert!(connection.last_scanned_at.is_some());
}

#[tokio::test]
async fn test_ids_are_merged_across_queries() {
    let server = MockServer::start().await;
    mock_search(&server, "one", &["m1", "m2"]).await;
    mock_search(&server, "two", &["m2", "m3"]).await;
    for (id, day) in [("m1", 1), ("m2", 2), ("m3", 3)] {
        mock_message(
            &server,
            id,
            "billing@spotify.com",
            "Your receipt",
            &format!("2024-03-0{}", day),
        )
        .await;
    }

    let h = harness(&server, &["one", "two"]);
    let report = h.scanner.run(USER, &h.connection, None, None).await;

    assert!(report.ok);
    assert_eq!(report.messages_searched, 3);
    assert_eq!(report.detected.len(), 1);
    // The most recent message wins for the last-seen date.
    assert_eq!(
        report.detected[0].last_seen.unwrap().date_naive().to_string(),
        "2024-03-03"
    );
}

#[tokio::test]
async fn test_all_queries_failing_fails_scan() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let h = harness(&server, &["a", "b"]);
    let (stages, callback) = recorder();
    let callback: &ProgressFn = &callback;
    let report = h.scanner.run(USER, &h.connection, Some(callback), None).await;

    assert!(!report.ok);
    let error = report.error.unwrap();
    assert_eq!(error.status, Some(503));
    assert_eq!(report.query_stats.len(), 2);
    assert!(report.query_stats.iter().all(|s| !s.ok));

    // A failed scan jumps straight to Done.
    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            ScanStage::Connecting,
            ScanStage::SearchingMessages,
            ScanStage::Done
        ]
    );

    let connection = h.connections.get(USER, &h.connection.id).unwrap();
    assert_eq!(connection.last_scan_status, Some(ScanOutcome::Error));
    assert!(connection.last_scan_error.is_some());
}

#[tokio::test]
async fn test_auth_failure_during_fetch_aborts() {
    let server = MockServer::start().await;
    mock_search(&server, "q", &["m1", "m2"]).await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/m1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "Request had invalid authentication credentials."}
        })))
        .mount(&server)
        .await;
    mock_message(&server, "m2", "billing@netflix.com", "Receipt", "2024-01-01").await;

    let h = harness(&server, &["q"]);
    let report = h.scanner.run(USER, &h.connection, None, None).await;

    assert!(!report.ok);
    let error = report.error.unwrap();
    assert_eq!(error.status, Some(401));
    assert!(error.message.contains("invalid authentication"));
    assert!(h.subscriptions.list(USER).is_empty());

    let connection = h.connections.get(USER, &h.connection.id).unwrap();
    assert_eq!(connection.last_scan_status, Some(ScanOutcome::Error));
}

#[tokio::test]
async fn test_non_auth_fetch_failure_skips_message() {
    let server = MockServer::start().await;
    mock_search(&server, "q", &["gone", "m2"]).await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;
    mock_message(&server, "m2", "billing@netflix.com", "Receipt", "2024-01-01").await;

    let h = harness(&server, &["q"]);
    let report = h.scanner.run(USER, &h.connection, None, None).await;

    assert!(report.ok);
    assert_eq!(report.messages_searched, 2);
    assert_eq!(report.messages_fetched, 1);
    assert_eq!(report.created, 1);
}

/// Responds only after the client's request timeout has expired.
fn stalled() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(json!({"messages": []}))
        .set_delay(Duration::from_secs(2))
}

const SHORT_TIMEOUT: Duration = Duration::from_millis(300);

#[tokio::test]
async fn test_network_failure_on_one_query_still_succeeds() {
    let server = MockServer::start().await;
    mock_search(&server, "good", &["m1"]).await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .and(query_param("q", "stalled"))
        .respond_with(stalled())
        .mount(&server)
        .await;
    mock_message(&server, "m1", "billing@netflix.com", "Receipt", "2024-01-01").await;

    let h = harness_with_client(
        GmailClient::new(server.uri()).with_timeout(SHORT_TIMEOUT),
        &["good", "stalled"],
    );
    let report = h.scanner.run(USER, &h.connection, None, None).await;

    assert!(report.ok);
    assert!(report.query_stats[0].ok);
    assert!(!report.query_stats[1].ok);
    assert!(report.query_stats[1].error.is_some());
    assert_eq!(report.created, 1);
}

#[tokio::test]
async fn test_network_failure_during_fetch_skips_message() {
    let server = MockServer::start().await;
    mock_search(&server, "q", &["stalled", "m2"]).await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/stalled"))
        .respond_with(stalled())
        .mount(&server)
        .await;
    mock_message(&server, "m2", "billing@netflix.com", "Receipt", "2024-01-01").await;

    let h = harness_with_client(
        GmailClient::new(server.uri()).with_timeout(SHORT_TIMEOUT),
        &["q"],
    );
    let report = h.scanner.run(USER, &h.connection, None, None).await;

    assert!(report.ok);
    assert_eq!(report.messages_searched, 2);
    assert_eq!(report.messages_fetched, 1);
    assert_eq!(report.created, 1);
}

#[tokio::test]
async fn test_unreachable_api_fails_scan() {
    // Nothing listens on a port we bound and released.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let h = harness_with_client(GmailClient::new(format!("http://{}", addr)), &["a", "b"]);
    let report = h.scanner.run(USER, &h.connection, None, None).await;

    assert!(!report.ok);
    let error = report.error.unwrap();
    assert_eq!(error.status, None);
    assert_eq!(error.likely_cause, FailureCause::Network.likely_cause());
    assert_eq!(report.query_stats.len(), 2);
    assert!(report
        .query_stats
        .iter()
        .all(|s| !s.ok && s.error.is_some()));

    let connection = h.connections.get(USER, &h.connection.id).unwrap();
    assert_eq!(connection.last_scan_status, Some(ScanOutcome::Error));
}

#[tokio::test]
async fn test_progress_reports_every_stage_once() {
    let server = MockServer::start().await;
    mock_search(&server, "q", &[]).await;

    let h = harness(&server, &["q"]);
    let (stages, callback) = recorder();
    let callback: &ProgressFn = &callback;
    let report = h.scanner.run(USER, &h.connection, Some(callback), None).await;

    assert!(report.ok);
    assert_eq!(report.messages_searched, 0);
    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            ScanStage::Connecting,
            ScanStage::SearchingMessages,
            ScanStage::FetchingMetadata,
            ScanStage::DetectingSubscriptions,
            ScanStage::Done
        ]
    );
}

#[tokio::test]
async fn test_existing_subscriptions_are_refreshed() {
    let server = MockServer::start().await;
    mock_search(&server, "q", &["m1", "m2"]).await;
    mock_message(&server, "m1", "billing@netflix.com", "Receipt", "2024-05-01").await;
    mock_message(&server, "m2", "no-reply@my-gym.com", "Payment received", "2024-05-02").await;

    let h = harness(&server, &["q"]);
    // Matched by name, case-insensitively.
    let by_name = h
        .subscriptions
        .create(
            USER,
            SubscriptionDraft {
                price: Some(15.49),
                ..draft("NETFLIX")
            },
        )
        .unwrap()
        .value;
    // Matched by the source marker after the user renamed it.
    let by_marker = h
        .subscriptions
        .create(
            USER,
            SubscriptionDraft {
                notes: "Detected from email scan\n[source:my-gym.com]".to_string(),
                status: subtrack::models::SubscriptionStatus::Inactive,
                ..draft("Downtown Fitness")
            },
        )
        .unwrap()
        .value;

    let report = h.scanner.run(USER, &h.connection, None, None).await;

    assert!(report.ok);
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 2);

    let refreshed = h.subscriptions.get(USER, &by_name.id).unwrap();
    assert_eq!(refreshed.price, Some(15.49));
    assert!(refreshed.notes.contains("[source:netflix.com]"));
    assert!(refreshed.notes.ends_with("Last seen in email: 2024-05-01"));

    let renamed = h.subscriptions.get(USER, &by_marker.id).unwrap();
    assert_eq!(renamed.name, "Downtown Fitness");
    assert_eq!(renamed.status, subtrack::models::SubscriptionStatus::Active);
    assert_eq!(renamed.notes.matches("[source:my-gym.com]").count(), 1);
    assert!(renamed.notes.ends_with("Last seen in email: 2024-05-02"));
}

fn draft(name: &str) -> SubscriptionDraft {
    SubscriptionDraft {
        name: name.to_string(),
        price: None,
        currency: "USD".to_string(),
        cycle: None,
        payment_method: None,
        started_on: None,
        renewal_date: None,
        status: subtrack::models::SubscriptionStatus::Active,
        notes: String::new(),
        reminder: false,
        is_visible: true,
        image_url: None,
    }
}

#[tokio::test]
async fn test_cancel_before_reconcile_leaves_registry_untouched() {
    let server = MockServer::start().await;
    mock_search(&server, "q", &["m1"]).await;
    mock_message(&server, "m1", "billing@netflix.com", "Receipt", "2024-01-01").await;

    let h = harness(&server, &["q"]);
    let flag = CancellationFlag::new();
    let trigger = flag.clone();
    let callback: &ProgressFn = &move |stage| {
        if stage == ScanStage::DetectingSubscriptions {
            trigger.cancel();
        }
    };

    let report = h
        .scanner
        .run(USER, &h.connection, Some(callback), Some(&flag))
        .await;

    assert!(!report.ok);
    assert_eq!(report.messages_fetched, 1);
    assert_eq!(report.error.unwrap().message, "Scan cancelled");
    assert!(h.subscriptions.list(USER).is_empty());
}

#[tokio::test]
async fn test_scan_endpoint_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "m1"}]
        })))
        .mount(&server)
        .await;
    mock_message(&server, "m1", "Spotify <no-reply@spotify.com>", "Your plan", "2024-02-01").await;

    let config = Config {
        gmail_api_base: server.uri(),
        ..Config::test_default()
    };
    let (app, state) = common::create_test_app_with_config(config);

    // No connection yet.
    let response = app
        .clone()
        .oneshot(common::authed_request("POST", "/api/scan", USER, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let _ = state.connections.upsert_connection(
        USER,
        ConnectionCredentials {
            provider: MailProvider::Gmail,
            email: USER.to_string(),
            access_token: "ya29.token".to_string(),
            refresh_token: None,
            token_expires_at: None,
        },
    );

    let response = app
        .clone()
        .oneshot(common::authed_request("POST", "/api/scan", USER, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = common::body_json(response).await;
    assert_eq!(report["ok"], true);
    // Every default query returns the same id.
    assert_eq!(report["messages_searched"], 1);
    assert_eq!(report["created"], 1);
    assert_eq!(report["detected"][0]["name"], "Spotify");

    assert_eq!(
        state.onboarding.get(USER).scan_status,
        subtrack::models::ScanStatus::Complete
    );

    let response = app
        .clone()
        .oneshot(common::authed_request("GET", "/api/scan/progress", USER, None))
        .await
        .unwrap();
    let progress = common::body_json(response).await;
    assert_eq!(progress["running"], false);
    assert_eq!(progress["stage"], "done");

    let response = app
        .oneshot(common::authed_request("POST", "/api/scan/cancel", USER, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scan_finishes_after_client_disconnects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "m1"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/m1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "id": "m1",
                    "payload": {"headers": [
                        {"name": "From", "value": "Spotify <no-reply@spotify.com>"},
                        {"name": "Subject", "value": "Your plan"},
                        {"name": "Date", "value": "2024-02-01"}
                    ]}
                }))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let config = Config {
        gmail_api_base: server.uri(),
        ..Config::test_default()
    };
    let (app, state) = common::create_test_app_with_config(config);
    let connection = state
        .connections
        .upsert_connection(
            USER,
            ConnectionCredentials {
                provider: MailProvider::Gmail,
                email: USER.to_string(),
                access_token: "ya29.token".to_string(),
                refresh_token: None,
                token_expires_at: None,
            },
        )
        .value;

    // Give up on the response while the metadata fetch is still pending.
    let request = app.oneshot(common::authed_request("POST", "/api/scan", USER, None));
    assert!(tokio::time::timeout(Duration::from_millis(200), request)
        .await
        .is_err());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(!state.scan_progress.is_running(USER));
    let connection = state.connections.get(USER, &connection.id).unwrap();
    assert_eq!(connection.last_scan_status, Some(ScanOutcome::Success));
    let subs = state.subscriptions.list(USER);
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].name, "Spotify");
    assert_eq!(
        state.onboarding.get(USER).scan_status,
        subtrack::models::ScanStatus::Complete
    );
}

#[tokio::test]
async fn test_scan_rejected_whilerunning() {
    let (app, state) = common::create_test_app();
    let _ = state.connections.upsert_connection(
        USER,
        ConnectionCredentials {
            provider: MailProvider::Gmail,
            email: USER.to_string(),
            access_token: "ya29.token".to_string(),
            refresh_token: None,
            token_expires_at: None,
        },
    );

    let running = state.scan_progress.begin(USER).unwrap();

    let response = app
        .clone()
        .oneshot(common::authed_request("POST", "/api/scan", USER, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(common::authed_request("POST", "/api/scan/cancel", USER, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(running.flag().is_cancelled());
}
