// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription registry: CRUD over a user's subscriptions.
//!
//! Every successful mutation publishes a `RegistryEvent` so observers can
//! refresh without polling.

use crate::db::{collections, Persisted, RecordStore};
use crate::error::{AppError, Result};
use crate::models::{Subscription, SubscriptionDraft, SubscriptionStatus, SubscriptionUpdate};
use crate::services::events::{RegistryEvent, RegistryEvents};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Listing filter; all criteria are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilter {
    /// Matches the displayed status (Review overrides stored status)
    pub status: Option<SubscriptionStatus>,
    /// Case-insensitive substring of the name
    pub search: Option<String>,
    /// Include hidden subscriptions
    #[serde(default)]
    pub include_hidden: bool,
}

impl SubscriptionFilter {
    fn matches(&self, sub: &Subscription) -> bool {
        if !self.include_hidden && !sub.is_visible {
            return false;
        }
        if self.status.is_some_and(|s| s != sub.display_status()) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => sub.name.to_lowercase().contains(&q.to_lowercase()),
            _ => true,
        }
    }
}

/// Dashboard totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriptionSummary {
    pub total: usize,
    /// Counts by displayed status
    pub by_status: HashMap<SubscriptionStatus, usize>,
    /// Sum of monthly-normalized prices of visible, active subscriptions
    pub monthly_spend: f64,
}

#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: RecordStore,
    events: RegistryEvents,
}

impl SubscriptionRegistry {
    pub fn new(store: RecordStore, events: RegistryEvents) -> Self {
        Self { store, events }
    }

    pub fn events(&self) -> &RegistryEvents {
        &self.events
    }

    pub fn list(&self, user_id: &str) -> Vec<Subscription> {
        self.store.list(collections::SUBSCRIPTIONS, user_id)
    }

    pub fn list_filtered(&self, user_id: &str, filter: &SubscriptionFilter) -> Vec<Subscription> {
        self.list(user_id)
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect()
    }

    pub fn get(&self, user_id: &str, id: &str) -> Result<Subscription> {
        self.list(user_id)
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Subscription {}", id)))
    }

    pub fn count(&self, user_id: &str) -> usize {
        self.list(user_id).len()
    }

    pub fn create(&self, user_id: &str, draft: SubscriptionDraft) -> Result<Persisted<Subscription>> {
        draft.validate()?;
        check_price(draft.price)?;

        let mut subscriptions = self.list(user_id);
        let subscription = draft.into_subscription(uuid::Uuid::new_v4().to_string());
        subscriptions.push(subscription.clone());

        let write = self
            .store
            .save(collections::SUBSCRIPTIONS, user_id, &subscriptions);

        tracing::info!(user_id, id = %subscription.id, name = %subscription.name, "Created subscription");
        self.events.publish(RegistryEvent::Created {
            user_id: user_id.to_string(),
            subscription_id: subscription.id.clone(),
        });
        Ok(Persisted::new(subscription, write))
    }

    pub fn update(
        &self,
        user_id: &str,
        id: &str,
        update: SubscriptionUpdate,
    ) -> Result<Persisted<Subscription>> {
        update.validate()?;
        check_price(update.price)?;

        let mut subscriptions = self.list(user_id);
        let target = subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Subscription {}", id)))?;

        update.apply(target);
        let updated = target.clone();

        let write = self
            .store
            .save(collections::SUBSCRIPTIONS, user_id, &subscriptions);

        tracing::debug!(user_id, id, "Updated subscription");
        self.events.publish(RegistryEvent::Updated {
            user_id: user_id.to_string(),
            subscription_id: updated.id.clone(),
        });
        Ok(Persisted::new(updated, write))
    }

    pub fn delete(&self, user_id: &str, id: &str) -> Result<Persisted<Subscription>> {
        let mut subscriptions = self.list(user_id);
        let idx = subscriptions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Subscription {}", id)))?;
        let removed = subscriptions.remove(idx);

        let write = self
            .store
            .save(collections::SUBSCRIPTIONS, user_id, &subscriptions);

        tracing::info!(user_id, id, "Deleted subscription");
        self.events.publish(RegistryEvent::Deleted {
            user_id: user_id.to_string(),
            subscription_id: removed.id.clone(),
        });
        Ok(Persisted::new(removed, write))
    }

    /// Copy a subscription under a fresh id; every other field is kept.
    pub fn duplicate(&self, user_id: &str, id: &str) -> Result<Persisted<Subscription>> {
        let source = self.get(user_id, id)?;
        self.create(user_id, SubscriptionDraft::from(source))
    }

    pub fn summary(&self, user_id: &str) -> SubscriptionSummary {
        let mut summary = SubscriptionSummary::default();
        for sub in self.list(user_id) {
            summary.total += 1;
            let status = sub.display_status();
            *summary.by_status.entry(status).or_insert(0) += 1;

            if sub.is_visible && status == SubscriptionStatus::Active {
                summary.monthly_spend += sub.monthly_cost().unwrap_or(0.0);
            }
        }
        summary
    }
}

fn check_price(price: Option<f64>) -> Result<()> {
    match price {
        Some(p) if !p.is_finite() => Err(AppError::BadRequest(
            "price must be a finite number".to_string(),
        )),
        _ => Ok(()),
    }
}
