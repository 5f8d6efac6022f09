// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Inbox scan orchestration.
//!
//! Handles the end-to-end workflow:
//! 1. Run the fixed search queries and merge message ids (ordered, unique)
//! 2. Fetch From/Subject/Date metadata in sequential batches
//! 3. Run the detector and aggregate by sender domain
//! 4. Reconcile detections with the subscription registry
//! 5. Record the outcome on the email connection
//!
//! `run` never returns an error: every failure becomes a `ScanReport` with
//! `ok == false`.

use crate::config::ScanSettings;
use crate::models::{
    BillingCycle, EmailConnection, ScanOutcome, Subscription, SubscriptionDraft,
    SubscriptionStatus, SubscriptionUpdate, UNKNOWN_PAYMENT_METHOD,
};
use crate::services::connections::EmailConnectionRegistry;
use crate::services::detector::{self, Detection};
use crate::services::gmail::{GmailClient, MailApiError, MessageMetadata};
use crate::services::subscriptions::SubscriptionRegistry;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Search queries run on every scan, in order.
pub const SEARCH_QUERIES: &[&str] = &[
    "subject:(subscription OR renewal OR \"your plan\") newer_than:1y",
    "subject:(receipt OR invoice OR payment) newer_than:1y",
    "subject:(trial OR membership) newer_than:1y",
];

/// Days from the email date to the assumed first renewal.
const DEFAULT_RENEWAL_DAYS: i64 = 30;

const PROVENANCE_NOTE: &str = "Detected from email scan";
const LAST_SEEN_PREFIX: &str = "Last seen in email: ";

/// Scan stages, reported once each in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    Connecting,
    SearchingMessages,
    FetchingMetadata,
    DetectingSubscriptions,
    Done,
}

impl ScanStage {
    pub fn label(self) -> &'static str {
        match self {
            ScanStage::Connecting => "Connecting…",
            ScanStage::SearchingMessages => "Searching messages…",
            ScanStage::FetchingMetadata => "Fetching metadata…",
            ScanStage::DetectingSubscriptions => "Detecting subscriptions…",
            ScanStage::Done => "Done",
        }
    }
}

/// Progress callback.
pub type ProgressFn = dyn Fn(ScanStage) + Send + Sync;

/// Cooperative cancellation, checked before each batch and before reconciliation.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one search query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryStat {
    pub query: String,
    pub ok: bool,
    pub message_count: usize,
    pub error: Option<String>,
}

/// Why a scan failed, for the technical-detail panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFailure {
    pub status: Option<u16>,
    pub message: String,
    pub likely_cause: String,
}

impl From<&MailApiError> for ScanFailure {
    fn from(err: &MailApiError) -> Self {
        Self {
            status: err.status,
            message: err.message.clone(),
            likely_cause: err.cause.likely_cause().to_string(),
        }
    }
}

/// One aggregated detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedVendor {
    pub domain: String,
    pub name: String,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub ok: bool,
    /// Unique message ids across all queries
    pub messages_searched: usize,
    pub messages_fetched: usize,
    pub detected: Vec<DetectedVendor>,
    pub created: usize,
    pub updated: usize,
    pub query_stats: Vec<QueryStat>,
    pub error: Option<ScanFailure>,
}

/// Per-user scan bookkeeping for polling clients: the last reported stage
/// and the cancellation flag of the scan in flight.
#[derive(Clone, Default)]
pub struct ScanProgressTracker {
    stages: Arc<DashMap<String, ScanStage>>,
    active: Arc<DashMap<String, CancellationFlag>>,
}

impl ScanProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: &str, stage: ScanStage) {
        self.stages.insert(user_id.to_string(), stage);
    }

    pub fn get(&self, user_id: &str) -> Option<ScanStage> {
        self.stages.get(user_id).map(|s| *s)
    }

    pub fn clear(&self, user_id: &str) {
        self.stages.remove(user_id);
    }

    /// Register a scan for `user_id`; `None` if one is already running.
    ///
    /// The registration ends when the returned guard is dropped.
    pub fn begin(&self, user_id: &str) -> Option<ActiveScan> {
        let flag = CancellationFlag::new();
        match self.active.entry(user_id.to_string()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(v) => {
                v.insert(flag.clone());
            }
        }
        self.clear(user_id);

        Some(ActiveScan {
            tracker: self.clone(),
            user_id: user_id.to_string(),
            flag,
        })
    }

    pub fn is_running(&self, user_id: &str) -> bool {
        self.active.contains_key(user_id)
    }

    /// Request cancellation of the user's running scan.
    pub fn cancel(&self, user_id: &str) -> bool {
        match self.active.get(user_id) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }
}

/// A registered, running scan.
pub struct ActiveScan {
    tracker: ScanProgressTracker,
    user_id: String,
    flag: CancellationFlag,
}

impl ActiveScan {
    pub fn flag(&self) -> &CancellationFlag {
        &self.flag
    }
}

impl Drop for ActiveScan {
    fn drop(&mut self) {
        self.tracker.active.remove(&self.user_id);
    }
}

/// Fires each stage at most once and never moves backwards.
struct Progress<'a> {
    callback: Option<&'a (dyn Fn(ScanStage) + Send + Sync + 'a)>,
    last: Option<ScanStage>,
}

impl<'a> Progress<'a> {
    fn advance(&mut self, stage: ScanStage) {
        if self.last.is_some_and(|last| last >= stage) {
            return;
        }
        self.last = Some(stage);
        tracing::debug!(stage = stage.label(), "Scan progress");
        if let Some(cb) = self.callback {
            cb(stage);
        }
    }
}

enum Abort {
    Api(MailApiError),
    Cancelled,
}

impl Abort {
    fn failure(&self) -> ScanFailure {
        match self {
            Abort::Api(e) => ScanFailure::from(e),
            Abort::Cancelled => ScanFailure {
                status: None,
                message: "Scan cancelled".to_string(),
                likely_cause: "The scan was cancelled before it finished.".to_string(),
            },
        }
    }
}

#[derive(Clone)]
pub struct ScanOrchestrator {
    gmail: GmailClient,
    subscriptions: SubscriptionRegistry,
    connections: EmailConnectionRegistry,
    settings: ScanSettings,
    queries: Vec<String>,
}

impl ScanOrchestrator {
    pub fn new(
        gmail: GmailClient,
        subscriptions: SubscriptionRegistry,
        connections: EmailConnectionRegistry,
        settings: ScanSettings,
    ) -> Self {
        Self {
            gmail,
            subscriptions,
            connections,
            settings,
            queries: SEARCH_QUERIES.iter().map(|q| q.to_string()).collect(),
        }
    }

    /// Replace the search queries.
    pub fn with_queries(mut self, queries: Vec<String>) -> Self {
        self.queries = queries;
        self
    }

    /// Scan the mailbox behind `connection` for `user_id`.
    pub async fn run(
        &self,
        user_id: &str,
        connection: &EmailConnection,
        progress: Option<&ProgressFn>,
        cancel: Option<&CancellationFlag>,
    ) -> ScanReport {
        let mut progress = Progress {
            callback: progress,
            last: None,
        };
        let mut report = ScanReport::default();

        tracing::info!(user_id, connection_id = %connection.id, "Starting inbox scan");

        let result = self
            .scan(user_id, connection, &mut progress, cancel, &mut report)
            .await;

        let (outcome, error_message) = match &result {
            Ok(()) => {
                report.ok = true;
                tracing::info!(
                    user_id,
                    messages = report.messages_searched,
                    detected = report.detected.len(),
                    created = report.created,
                    updated = report.updated,
                    "Scan complete"
                );
                (ScanOutcome::Success, None)
            }
            Err(abort) => {
                let failure = abort.failure();
                tracing::warn!(
                    user_id,
                    status = ?failure.status,
                    error = %failure.message,
                    "Scan failed"
                );
                let message = failure.message.clone();
                report.error = Some(failure);
                (ScanOutcome::Error, Some(message))
            }
        };

        match self
            .connections
            .record_scan_result(user_id, &connection.id, outcome, error_message)
        {
            Ok(persisted) if !persisted.is_persisted() => {
                tracing::warn!(user_id, "Scan result not persisted");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(user_id, error = %e, "Failed to record scan result"),
        }

        progress.advance(ScanStage::Done);
        report
    }

    async fn scan(
        &self,
        user_id: &str,
        connection: &EmailConnection,
        progress: &mut Progress<'_>,
        cancel: Option<&CancellationFlag>,
        report: &mut ScanReport,
    ) -> Result<(), Abort> {
        let cancelled = || cancel.is_some_and(CancellationFlag::is_cancelled);
        let token = connection.access_token.as_str();

        progress.advance(ScanStage::Connecting);
        if cancelled() {
            return Err(Abort::Cancelled);
        }

        progress.advance(ScanStage::SearchingMessages);
        let ids = self.search(token, report).await?;
        report.messages_searched = ids.len();

        progress.advance(ScanStage::FetchingMetadata);
        let messages = self.fetch_metadata(token, &ids, cancelled).await?;
        report.messages_fetched = messages.len();

        progress.advance(ScanStage::DetectingSubscriptions);
        let detections = aggregate(&messages);
        if cancelled() {
            return Err(Abort::Cancelled);
        }

        let (created, updated) = self.reconcile(user_id, &detections);
        report.created = created;
        report.updated = updated;
        report.detected = detections
            .into_iter()
            .map(|d| DetectedVendor {
                domain: d.domain,
                name: d.name,
                last_seen: d.email_date,
            })
            .collect();
        Ok(())
    }

    /// Run every query; fails only if all of them failed.
    async fn search(&self, token: &str, report: &mut ScanReport) -> Result<Vec<String>, Abort> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut last_error = None;

        for query in &self.queries {
            match self
                .gmail
                .search_messages(token, query, self.settings.max_results)
                .await
            {
                Ok(found) => {
                    report.query_stats.push(QueryStat {
                        query: query.clone(),
                        ok: true,
                        message_count: found.len(),
                        error: None,
                    });
                    for id in found {
                        if seen.insert(id.clone()) {
                            ids.push(id);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "Search query failed");
                    report.query_stats.push(QueryStat {
                        query: query.clone(),
                        ok: false,
                        message_count: 0,
                        error: Some(e.to_string()),
                    });
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if report.query_stats.iter().all(|s| !s.ok) => Err(Abort::Api(e)),
            _ => Ok(ids),
        }
    }

    /// Sequential batches; an auth failure aborts, other failures skip the message.
    async fn fetch_metadata(
        &self,
        token: &str,
        ids: &[String],
        cancelled: impl Fn() -> bool,
    ) -> Result<Vec<MessageMetadata>, Abort> {
        let batch_size = self.settings.batch_size.max(1);
        let pause = std::time::Duration::from_millis(self.settings.batch_pause_ms);
        let mut messages = Vec::with_capacity(ids.len());

        for (batch_idx, batch) in ids.chunks(batch_size).enumerate() {
            if cancelled() {
                return Err(Abort::Cancelled);
            }
            if batch_idx > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            for id in batch {
                match self.gmail.get_message_metadata(token, id).await {
                    Ok(meta) => messages.push(meta),
                    Err(e) if e.is_auth_failure() => return Err(Abort::Api(e)),
                    Err(e) => {
                        tracing::debug!(message_id = %id, error = %e, "Skipping message");
                    }
                }
            }
        }

        Ok(messages)
    }

    /// Create or refresh one subscription per detection. Returns (created, updated).
    fn reconcile(&self, user_id: &str, detections: &[Detection]) -> (usize, usize) {
        let mut existing = self.subscriptions.list(user_id);
        let today = Utc::now().date_naive();
        let (mut created, mut updated) = (0, 0);

        for detection in detections {
            let seen_on = detection.email_date.map(|d| d.date_naive()).unwrap_or(today);

            match existing.iter_mut().find(|s| matches_detection(s, detection)) {
                Some(sub) => {
                    let update = SubscriptionUpdate {
                        notes: Some(with_last_seen(&sub.notes, &detection.domain, seen_on)),
                        status: Some(SubscriptionStatus::Active),
                        ..Default::default()
                    };
                    match self.subscriptions.update(user_id, &sub.id, update) {
                        Ok(persisted) => {
                            *sub = persisted.value;
                            updated += 1;
                        }
                        Err(e) => {
                            tracing::warn!(user_id, name = %sub.name, error = %e, "Failed to update subscription");
                        }
                    }
                }
                None => match self.subscriptions.create(user_id, draft_from(detection, seen_on)) {
                    Ok(persisted) => {
                        existing.push(persisted.value);
                        created += 1;
                    }
                    Err(e) => {
                        tracing::warn!(user_id, name = %detection.name, error = %e, "Failed to create subscription");
                    }
                },
            }
        }

        (created, updated)
    }
}

/// Detect per message and keep the most recent detection per domain.
///
/// Ties (and undated later messages) keep the first seen.
pub fn aggregate(messages: &[MessageMetadata]) -> Vec<Detection> {
    let mut by_domain: HashMap<String, usize> = HashMap::new();
    let mut detections: Vec<Detection> = Vec::new();

    for meta in messages {
        let Some(domain) = meta.from.as_deref().and_then(detector::sender_domain) else {
            continue;
        };
        let Some(detection) = detector::detect(
            &domain,
            meta.subject.as_deref().unwrap_or_default(),
            meta.date.as_deref().unwrap_or_default(),
        ) else {
            continue;
        };

        match by_domain.get(&detection.domain) {
            Some(&idx) => {
                if detection.email_date > detections[idx].email_date {
                    detections[idx] = detection;
                }
            }
            None => {
                by_domain.insert(detection.domain.clone(), detections.len());
                detections.push(detection);
            }
        }
    }

    detections
}

fn source_marker(domain: &str) -> String {
    format!("[source:{}]", domain)
}

/// Case-insensitive over full Unicode, so "ÉLAN" and "élan" are the same vendor.
fn matches_detection(sub: &Subscription, detection: &Detection) -> bool {
    sub.name.to_lowercase() == detection.name.to_lowercase()
        || sub.notes.contains(&source_marker(&detection.domain))
}

/// Replace any "last seen" line and make sure the source marker is present.
fn with_last_seen(notes: &str, domain: &str, seen_on: NaiveDate) -> String {
    let marker = source_marker(domain);
    let mut lines: Vec<String> = notes
        .lines()
        .filter(|l| !l.starts_with(LAST_SEEN_PREFIX))
        .map(str::to_string)
        .collect();
    if !notes.contains(&marker) {
        lines.push(marker);
    }
    lines.push(format!("{}{}", LAST_SEEN_PREFIX, seen_on));
    lines.join("\n")
}

fn draft_from(detection: &Detection, seen_on: NaiveDate) -> SubscriptionDraft {
    SubscriptionDraft {
        name: detection.name.clone(),
        price: Some(0.0),
        currency: "USD".to_string(),
        cycle: Some(BillingCycle::Monthly),
        payment_method: Some(UNKNOWN_PAYMENT_METHOD.to_string()),
        started_on: Some(seen_on),
        renewal_date: Some(seen_on + Duration::days(DEFAULT_RENEWAL_DAYS)),
        status: SubscriptionStatus::Active,
        notes: format!(
            "{}\n{}\n{}{}",
            PROVENANCE_NOTE,
            source_marker(&detection.domain),
            LAST_SEEN_PREFIX,
            seen_on
        ),
        reminder: false,
        is_visible: true,
        image_url: None,
    }
}
