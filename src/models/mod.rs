// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod email_connection;
pub mod onboarding;
pub mod subscription;
pub mod user;

pub use email_connection::{ConnectionView, EmailConnection, MailProvider, ScanOutcome};
pub use onboarding::{ExtensionStatus, OnboardingRoute, OnboardingState, ScanStatus};
pub use subscription::{
    BillingCycle, Subscription, SubscriptionDraft, SubscriptionStatus, SubscriptionUpdate,
    UNKNOWN_PAYMENT_METHOD,
};
pub use user::{AuthProvider, Profile, UserAccount};
