// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! SubTrack: find and manage recurring subscriptions
//!
//! This crate provides the backend API for scanning a user's mailbox for
//! subscription receipts and tracking the subscriptions it finds.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::RecordStore;
use services::{
    AccountService, EmailConnectionRegistry, GmailClient, GoogleIdentityClient,
    OnboardingService, ProfileService, RegistryEvents, ScanOrchestrator, ScanProgressTracker,
    SubscriptionRegistry,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: RecordStore,
    pub accounts: AccountService,
    pub profiles: ProfileService,
    pub connections: EmailConnectionRegistry,
    pub subscriptions: SubscriptionRegistry,
    pub onboarding: OnboardingService,
    pub google_identity: GoogleIdentityClient,
    pub scanner: ScanOrchestrator,
    pub scan_progress: ScanProgressTracker,
}

impl AppState {
    /// Wire every service over one record store.
    pub fn new(config: Config, store: RecordStore) -> Self {
        let events = RegistryEvents::new();
        let connections = EmailConnectionRegistry::new(store.clone());
        let subscriptions = SubscriptionRegistry::new(store.clone(), events);
        let scanner = ScanOrchestrator::new(
            GmailClient::new(config.gmail_api_base.clone()),
            subscriptions.clone(),
            connections.clone(),
            config.scan.clone(),
        );
        let google_identity = GoogleIdentityClient::new(
            config.google_client_id.clone(),
            config.google_userinfo_url.clone(),
        );

        Self {
            accounts: AccountService::new(store.clone()),
            profiles: ProfileService::new(store.clone()),
            onboarding: OnboardingService::new(store.clone()),
            connections,
            subscriptions,
            google_identity,
            scanner,
            scan_progress: ScanProgressTracker::new(),
            store,
            config,
        }
    }
}
