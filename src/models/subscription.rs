// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Subscription model for storage and API.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Payment method sentinel for subscriptions whose payment source is not known yet.
pub const UNKNOWN_PAYMENT_METHOD: &str = "Unknown";

/// Billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum BillingCycle {
    Monthly,
    Annually,
}

impl BillingCycle {
    fn months(self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Annually => 12,
        }
    }
}

/// Subscription status as stored, or as displayed after review rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Review,
}

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Stored subscription record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Subscription {
    /// Unique within the user's collection (UUID v4)
    pub id: String,
    pub name: String,
    /// Price per cycle; `None` while unknown
    pub price: Option<f64>,
    /// ISO 4217 code
    pub currency: String,
    pub cycle: Option<BillingCycle>,
    /// "Unknown" is a valid sentinel
    pub payment_method: Option<String>,
    pub started_on: Option<NaiveDate>,
    pub renewal_date: Option<NaiveDate>,
    /// Status assigned by the user or the scanner (see `display_status`)
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub reminder: bool,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    pub image_url: Option<String>,
}

impl Subscription {
    /// Whether the record is missing information the user needs to confirm.
    pub fn needs_review(&self) -> bool {
        let payment_unknown = match self.payment_method.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(method) => method == UNKNOWN_PAYMENT_METHOD,
        };

        payment_unknown
            || self.name.trim().is_empty()
            || self.price.is_none()
            || self.cycle.is_none()
            || self.renewal_date.is_none()
    }

    /// Status shown to the user. Review overrides the stored status but is never written back.
    pub fn display_status(&self) -> SubscriptionStatus {
        if self.needs_review() {
            SubscriptionStatus::Review
        } else {
            self.status
        }
    }

    /// Price normalized to a monthly amount.
    pub fn monthly_cost(&self) -> Option<f64> {
        let price = self.price?;
        Some(price / f64::from(self.cycle?.months()))
    }

    /// First renewal on or after `today`, rolling the stored date forward by whole cycles.
    pub fn next_renewal(&self, today: NaiveDate) -> Option<NaiveDate> {
        let step = Months::new(self.cycle?.months());
        let mut date = self.renewal_date?;
        while date < today {
            date = date.checked_add_months(step)?;
        }
        Some(date)
    }
}

/// Fields of a new subscription (everything but the id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SubscriptionDraft {
    #[validate(length(max = 120))]
    pub name: String,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,
    pub cycle: Option<BillingCycle>,
    pub payment_method: Option<String>,
    pub started_on: Option<NaiveDate>,
    pub renewal_date: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub status: SubscriptionStatus,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: String,
    #[serde(default)]
    pub reminder: bool,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[validate(url)]
    pub image_url: Option<String>,
}

fn default_active() -> SubscriptionStatus {
    SubscriptionStatus::Active
}

impl SubscriptionDraft {
    pub fn into_subscription(self, id: String) -> Subscription {
        Subscription {
            id,
            name: self.name,
            price: self.price,
            currency: self.currency,
            cycle: self.cycle,
            payment_method: self.payment_method,
            started_on: self.started_on,
            renewal_date: self.renewal_date,
            status: self.status,
            notes: self.notes,
            reminder: self.reminder,
            is_visible: self.is_visible,
            image_url: self.image_url,
        }
    }
}

impl From<Subscription> for SubscriptionDraft {
    fn from(s: Subscription) -> Self {
        Self {
            name: s.name,
            price: s.price,
            currency: s.currency,
            cycle: s.cycle,
            payment_method: s.payment_method,
            started_on: s.started_on,
            renewal_date: s.renewal_date,
            status: s.status,
            notes: s.notes,
            reminder: s.reminder,
            is_visible: s.is_visible,
            image_url: s.image_url,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SubscriptionUpdate {
    #[validate(length(max = 120))]
    pub name: Option<String>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub cycle: Option<BillingCycle>,
    pub payment_method: Option<String>,
    pub started_on: Option<NaiveDate>,
    pub renewal_date: Option<NaiveDate>,
    pub status: Option<SubscriptionStatus>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub reminder: Option<bool>,
    pub is_visible: Option<bool>,
    #[validate(url)]
    pub image_url: Option<String>,
}

impl SubscriptionUpdate {
    pub fn apply(self, target: &mut Subscription) {
        if let Some(v) = self.name {
            target.name = v;
        }
        if let Some(v) = self.price {
            target.price = Some(v);
        }
        if let Some(v) = self.currency {
            target.currency = v;
        }
        if let Some(v) = self.cycle {
            target.cycle = Some(v);
        }
        if let Some(v) = self.payment_method {
            target.payment_method = Some(v);
        }
        if let Some(v) = self.started_on {
            target.started_on = Some(v);
        }
        if let Some(v) = self.renewal_date {
            target.renewal_date = Some(v);
        }
        if let Some(v) = self.status {
            target.status = v;
        }
        if let Some(v) = self.notes {
            target.notes = v;
        }
        if let Some(v) = self.reminder {
            target.reminder = v;
        }
        if let Some(v) = self.is_visible {
            target.is_visible = v;
        }
        if let Some(v) = self.image_url {
            target.image_url = Some(v);
        }
    }
}
