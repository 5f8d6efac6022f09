// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Onboarding progress and next-route decision.

use crate::db::{collections, Persisted, RecordStore};
use crate::models::{ExtensionStatus, OnboardingRoute, OnboardingState, ScanStatus};
use chrono::Utc;

/// Decide where to send the user next.
///
/// Pure over its three inputs and re-evaluated on every call.
pub fn compute_next_route(
    has_credential: bool,
    state: &OnboardingState,
    subscription_count: usize,
) -> OnboardingRoute {
    let scan_complete = state.scan_status == ScanStatus::Complete;

    if !has_credential && !scan_complete {
        return OnboardingRoute::ConnectEmail;
    }

    if state.email_connected_count == 0 && subscription_count == 0 && !has_credential {
        return OnboardingRoute::ConnectEmail;
    }

    if (state.email_connected_count > 0 || has_credential) && !scan_complete {
        return match state.scan_status {
            ScanStatus::InProgress => OnboardingRoute::Scanning,
            ScanStatus::NotStarted if has_credential => OnboardingRoute::Scanning,
            _ => OnboardingRoute::ConnectEmail,
        };
    }

    if scan_complete && state.browser_extension_status == ExtensionStatus::Unknown {
        return OnboardingRoute::BrowserExtension;
    }

    OnboardingRoute::Subscriptions
}

/// Persisted onboarding state, one object per user.
#[derive(Clone)]
pub struct OnboardingService {
    store: RecordStore,
}

impl OnboardingService {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Current state; defaults for a new user.
    pub fn get(&self, user_id: &str) -> OnboardingState {
        self.store
            .load_object(collections::ONBOARDING, user_id)
            .unwrap_or_default()
    }

    pub fn mark_email_connected(&self, user_id: &str, count: u32) -> Persisted<OnboardingState> {
        self.patch(user_id, |s| s.email_connected_count = count)
    }

    pub fn mark_scan_started(&self, user_id: &str) -> Persisted<OnboardingState> {
        self.patch(user_id, |s| s.scan_status = ScanStatus::InProgress)
    }

    pub fn mark_scan_complete(&self, user_id: &str) -> Persisted<OnboardingState> {
        self.patch(user_id, |s| s.scan_status = ScanStatus::Complete)
    }

    pub fn mark_extension_connected(&self, user_id: &str) -> Persisted<OnboardingState> {
        self.patch(user_id, |s| {
            s.browser_extension_status = ExtensionStatus::Connected
        })
    }

    pub fn mark_extension_skipped(&self, user_id: &str) -> Persisted<OnboardingState> {
        self.patch(user_id, |s| s.browser_extension_status = ExtensionStatus::Skipped)
    }

    /// Start onboarding over from the defaults.
    pub fn reset(&self, user_id: &str) -> Persisted<OnboardingState> {
        let state = OnboardingState::default();
        let write = self
            .store
            .save_object(collections::ONBOARDING, user_id, &state);
        tracing::info!(user_id, "Reset onboarding");
        Persisted::new(state, write)
    }

    // Patches are merged into the stored state; transitions are not
    // checked for monotonicity.
    fn patch(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut OnboardingState),
    ) -> Persisted<OnboardingState> {
        let mut state = self.get(user_id);
        f(&mut state);

        if state.completed_at.is_none() && state.is_finished() {
            state.completed_at = Some(Utc::now());
            tracing::info!(user_id, "Onboarding completed");
        }

        let write = self
            .store
            .save_object(collections::ONBOARDING, user_id, &state);
        Persisted::new(state, write)
    }
}
