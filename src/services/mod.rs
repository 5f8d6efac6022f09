// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod accounts;
pub mod connections;
pub mod detector;
pub mod events;
pub mod gmail;
pub mod google_identity;
pub mod onboarding;
pub mod profiles;
pub mod scan;
pub mod subscriptions;

pub use accounts::AccountService;
pub use connections::{ConnectionCredentials, EmailConnectionRegistry};
pub use events::{EventSubscription, RegistryEvent, RegistryEvents};
pub use gmail::{FailureCause, GmailClient, MailApiError};
pub use google_identity::{GoogleIdentityClient, GoogleUserInfo};
pub use onboarding::{compute_next_route, OnboardingService};
pub use profiles::{ProfileService, ProfileUpdate};
pub use scan::{
    ActiveScan, CancellationFlag, ScanOrchestrator, ScanProgressTracker, ScanReport, ScanStage,
};
pub use subscriptions::{SubscriptionFilter, SubscriptionRegistry, SubscriptionSummary};
