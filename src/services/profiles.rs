// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user profile settings.

use crate::db::{collections, Persisted, RecordStore};
use crate::error::Result;
use crate::models::Profile;
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

/// Partial profile update; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(max = 120))]
    pub display_name: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
    #[validate(length(equal = 3))]
    pub preferred_currency: Option<String>,
    #[validate(range(max = 60))]
    pub reminder_days_before: Option<u32>,
}

#[derive(Clone)]
pub struct ProfileService {
    store: RecordStore,
}

impl ProfileService {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn get(&self, user_id: &str) -> Profile {
        self.store
            .load_object(collections::PROFILES, user_id)
            .unwrap_or_default()
    }

    pub fn update(&self, user_id: &str, update: ProfileUpdate) -> Result<Persisted<Profile>> {
        update.validate()?;

        let mut profile = self.get(user_id);
        if let Some(name) = update.display_name {
            profile.display_name = Some(name).filter(|n| !n.trim().is_empty());
        }
        if let Some(url) = update.avatar_url {
            profile.avatar_url = Some(url);
        }
        if let Some(currency) = update.preferred_currency {
            profile.preferred_currency = currency.to_uppercase();
        }
        if let Some(days) = update.reminder_days_before {
            profile.reminder_days_before = days;
        }
        profile.updated_at = Some(Utc::now());

        let write = self
            .store
            .save_object(collections::PROFILES, user_id, &profile);
        Ok(Persisted::new(profile, write))
    }

    /// Fill an empty profile from sign-in data without overwriting edits.
    pub fn seed(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Persisted<Profile> {
        let mut profile = self.get(user_id);
        if profile.display_name.is_none() {
            profile.display_name = display_name.map(str::to_string);
        }
        if profile.avatar_url.is_none() {
            profile.avatar_url = avatar_url.map(str::to_string);
        }

        let write = self
            .store
            .save_object(collections::PROFILES, user_id, &profile);
        Persisted::new(profile, write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    const USER: &str = "a@example.com";

    #[test]
    fn test_defaults_for_new_user() {
        let svc = ProfileService::new(RecordStore::in_memory());
        let profile = svc.get(USER);
        assert_eq!(profile.preferred_currency, "USD");
        assert_eq!(profile.reminder_days_before, 3);
    }

    #[test]
    fn test_partial_update() {
        let svc = ProfileService::new(RecordStore::in_memory());
        let _ = svc.seed(USER, Some("Alice"), None);

        let updated = svc
            .update(
                USER,
                ProfileUpdate {
                    preferred_currency: Some("eur".to_string()),
                    ..Default::default()
                },
            )
            .unwrap()
            .value;

        assert_eq!(updated.display_name.as_deref(), Some("Alice"));
        assert_eq!(updated.preferred_currency, "EUR");
        assert!(updated.updated_at.is_some());
        assert_eq!(svc.get(USER), updated);
    }

    #[test]
    fn test_invalid_update_rejected() {
        let svc = ProfileService::new(RecordStore::in_memory());
        let result = svc.update(
            USER,
            ProfileUpdate {
                preferred_currency: Some("EURO".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_seed_does_not_overwrite() {
        let svc = ProfileService::new(RecordStore::in_memory());
        let _ = svc.seed(USER, Some("First"), None);
        let second = svc.seed(USER, Some("Second"), Some("https://x/a.png")).value;
        assert_eq!(second.display_name.as_deref(), Some("First"));
        assert_eq!(second.avatar_url.as_deref(), Some("https://x/a.png"));
    }
}
