// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! User account and profile models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Password,
    Google,
}

/// Account record (stored at `users:{email}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    /// Lowercased email, also the user id for every other collection
    pub email: String,
    pub display_name: Option<String>,
    /// `salt_hex$hash_hex` (PBKDF2-HMAC-SHA256); `None` for Google-only accounts
    pub password_hash: Option<String>,
    pub auth_provider: AuthProvider,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_reminder_days() -> u32 {
    3
}

/// Free-form profile settings (stored at `profiles:{email}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default = "default_currency")]
    pub preferred_currency: String,
    /// Days before renewal to send a reminder
    #[serde(default = "default_reminder_days")]
    pub reminder_days_before: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            display_name: None,
            avatar_url: None,
            preferred_currency: default_currency(),
            reminder_days_before: default_reminder_days(),
            updated_at: None,
        }
    }
}
