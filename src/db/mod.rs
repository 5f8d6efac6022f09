// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (per-user record store over a key-value backend).

pub mod backend;
pub mod store;

pub use backend::{FileBackend, KeyValueBackend, MemoryBackend};
pub use store::{Persisted, RecordStore, StoreError};

/// Collection names as constants.
pub mod collections {
    pub const EMAIL_CONNECTIONS: &str = "email_connections";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    /// Onboarding progress (single object per user)
    pub const ONBOARDING: &str = "onboarding";
    /// Mock user credentials (single object per user)
    pub const USERS: &str = "users";
    pub const PROFILES: &str = "profiles";
}
