// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Onboarding progress: connect email → scan → browser extension.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ScanStatus {
    #[default]
    NotStarted,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ExtensionStatus {
    #[default]
    Unknown,
    Connected,
    Skipped,
}

/// Per-user onboarding progress.
///
/// Stored at: `onboarding:{user_id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct OnboardingState {
    #[serde(default)]
    pub email_connected_count: u32,
    #[serde(default)]
    pub scan_status: ScanStatus,
    #[serde(default)]
    pub browser_extension_status: ExtensionStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl OnboardingState {
    /// Scan finished and the extension step was answered either way.
    pub fn is_finished(&self) -> bool {
        self.scan_status == ScanStatus::Complete
            && self.browser_extension_status != ExtensionStatus::Unknown
    }
}

/// Where the front end should send the user next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum OnboardingRoute {
    ConnectEmail,
    Scanning,
    BrowserExtension,
    Subscriptions,
}

impl OnboardingRoute {
    /// Front-end path for the route.
    pub fn path(self) -> &'static str {
        match self {
            OnboardingRoute::ConnectEmail => "/onboarding/connect-email",
            OnboardingRoute::Scanning => "/onboarding/scanning",
            OnboardingRoute::BrowserExtension => "/onboarding/browser-extension",
            OnboardingRoute::Subscriptions => "/subscriptions",
        }
    }
}
