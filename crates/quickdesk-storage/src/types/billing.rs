//! Subscription and payment records.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OrganizationId, ParseEnumError, PaymentId, SubscriptionId};

/// Subscription status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Canceled,
    Expired,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "TRIAL",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::PastDue => "PAST_DUE",
            SubscriptionStatus::Canceled => "CANCELED",
            SubscriptionStatus::Expired => "EXPIRED",
            SubscriptionStatus::Incomplete => "INCOMPLETE",
        }
    }

    /// Statuses under which new members may be added.
    pub fn allows_new_members(&self) -> bool {
        matches!(self, SubscriptionStatus::Trial | SubscriptionStatus::Active)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRIAL" => Ok(SubscriptionStatus::Trial),
            "ACTIVE" => Ok(SubscriptionStatus::Active),
            "PAST_DUE" => Ok(SubscriptionStatus::PastDue),
            "CANCELED" => Ok(SubscriptionStatus::Canceled),
            "EXPIRED" => Ok(SubscriptionStatus::Expired),
            "INCOMPLETE" => Ok(SubscriptionStatus::Incomplete),
            _ => Err(ParseEnumError {
                kind: "subscription status",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription record (one per organization)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: SubscriptionId,
    pub organization_id: OrganizationId,
    pub status: SubscriptionStatus,
    /// Non-client members without a license (informational).
    pub agent_count: u32,
    /// Purchased seats. Only grows through a confirmed payment.
    pub agent_slots: u32,
    /// Minor currency units.
    pub price_per_agent: i64,
    /// `agent_slots * price_per_agent`.
    pub total_amount: i64,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn expected_total(&self) -> i64 {
        i64::from(self.agent_slots) * self.price_per_agent
    }
}

/// Partial subscription update, applied by the backend in one write.
///
/// `agent_count` and `total_amount` are recomputed from live member rows in
/// that same write, so concurrent updates never overwrite each other's
/// fields. Slots can only be added.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriptionUpdate {
    /// Apply only while the stored status is this one.
    pub expect_status: Option<SubscriptionStatus>,
    pub status: Option<SubscriptionStatus>,
    pub add_agent_slots: u32,
    pub current_period: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl SubscriptionUpdate {
    /// Only recompute the derived billing figures.
    pub fn refresh() -> Self {
        Self::default()
    }

    pub fn status(status: SubscriptionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Guard the update with a compare-and-set on the status.
    pub fn expecting(mut self, status: SubscriptionStatus) -> Self {
        self.expect_status = Some(status);
        self
    }

    /// Apply to a record. `unlicensed_agents` is the live count.
    pub fn apply_to(&self, subscription: &mut Subscription, unlicensed_agents: u32) {
        if let Some(status) = self.status {
            subscription.status = status;
        }
        subscription.agent_slots = subscription
            .agent_slots
            .saturating_add(self.add_agent_slots);
        if let Some((start, end)) = self.current_period {
            subscription.current_period_start = Some(start);
            subscription.current_period_end = Some(end);
        }
        if let Some(canceled_at) = self.canceled_at {
            subscription.canceled_at = Some(canceled_at);
        }
        subscription.agent_count = unlicensed_agents;
        subscription.total_amount = subscription.expected_total();
    }
}

/// Parameters for creating a subscription
#[derive(Clone, Debug)]
pub struct CreateSubscriptionParams {
    pub status: SubscriptionStatus,
    pub agent_slots: u32,
    pub price_per_agent: i64,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

/// Payment status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Canceled => "CANCELED",
        }
    }

    /// Terminal payments are immutable.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELED" => Ok(PaymentStatus::Canceled),
            _ => Err(ParseEnumError {
                kind: "payment status",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub organization_id: OrganizationId,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub agent_count: u32,
    /// Gateway-specific fields (checkout URL, session id, purchase marker).
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a payment (always created PENDING)
#[derive(Clone, Debug)]
pub struct CreatePaymentParams {
    pub amount: i64,
    pub currency: String,
    pub agent_count: u32,
    pub metadata: BTreeMap<String, String>,
}
