//! quickdesk-billing - seat licensing and payments for quickdesk
//!
//! This crate covers:
//! - License/seat accounting (who holds one of the purchased agent slots)
//! - Member lifecycle (add, invite, verify) gated on seat availability
//! - Subscription trial and status handling
//! - Slot purchases through a payment gateway, confirmed by webhook or poll
//!
//! # Architecture
//!
//! Billing is tied to purchased `agent_slots`, not to how many agents exist:
//! - `total_amount = agent_slots * price_per_agent`
//! - slots only grow when a payment is confirmed `PAID`
//! - a license can only be activated while a slot is free

use chrono::{DateTime, Utc};
use quickdesk_storage::StoreError;
use thiserror::Error;

mod members;
mod payments;
mod seats;
mod subscription;
mod webhook;

pub use members::{LogMailer, MailError, Mailer, MemberService};
pub use payments::{
    CheckoutRequest, CheckoutSession, GatewayPaymentStatus, MockPaymentGateway, PaymentGateway,
    PaymentService, CHECKOUT_SESSION_KEY, CHECKOUT_URL_KEY, PURCHASE_AGENT_SLOTS, PURCHASE_KEY,
};
pub use seats::{available_slots, can_activate_license, AddMembersCheck, LicenseService, LicenseStatus};
pub use subscription::SubscriptionService;
pub use webhook::{
    parse_webhook_event, BillingWebhookEvent, DefaultWebhookHandler, WebhookHandler,
};

/// Billing service errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("No available licenses")]
    NoAvailableLicenses,

    #[error("Insufficient licenses: requested {requested}, available {available}")]
    InsufficientLicenses { requested: usize, available: u32 },

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    State(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    #[error("Invalid webhook payload: {0}")]
    InvalidWebhookPayload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration for billing
#[derive(Clone, Debug)]
pub struct BillingConfig {
    /// Payment gateway secret key
    pub secret_key: String,

    /// Webhook secret for signature verification (empty disables verification)
    pub webhook_secret: String,

    /// Monthly price of one agent slot, in minor currency units
    pub price_per_agent: i64,

    /// ISO currency code (default: PHP)
    pub currency: String,

    /// Trial period in days (default: 14)
    pub trial_days: u32,
}

impl BillingConfig {
    /// Create a new billing configuration from environment variables
    pub fn from_env() -> Result<Self, BillingError> {
        let secret_key = std::env::var("PAYMONGO_SECRET_KEY")
            .map_err(|_| BillingError::Config("PAYMONGO_SECRET_KEY not set".into()))?;

        let webhook_secret = std::env::var("PAYMONGO_WEBHOOK_SECRET").unwrap_or_default();
        if webhook_secret.is_empty() {
            tracing::warn!("PAYMONGO_WEBHOOK_SECRET not set, webhook signatures will not be verified");
        }

        let price_per_agent = std::env::var("QUICKDESK_PRICE_PER_AGENT")
            .map_err(|_| BillingError::Config("QUICKDESK_PRICE_PER_AGENT not set".into()))
            .and_then(|v| {
                v.parse::<i64>().ok().filter(|p| *p >= 0).ok_or_else(|| {
                    BillingError::Config(format!(
                        "Invalid QUICKDESK_PRICE_PER_AGENT value '{}': expected a non-negative number",
                        v
                    ))
                })
            })?;

        let trial_days = match std::env::var("QUICKDESK_TRIAL_DAYS") {
            Ok(v) => v.parse().map_err(|_| {
                BillingError::Config(format!(
                    "Invalid QUICKDESK_TRIAL_DAYS value '{}': expected a number",
                    v
                ))
            })?,
            Err(_) => 14,
        };

        Ok(Self {
            secret_key,
            webhook_secret,
            price_per_agent,
            currency: std::env::var("QUICKDESK_CURRENCY").unwrap_or_else(|_| "PHP".into()),
            trial_days,
        })
    }

    /// Create a test configuration (for development/testing)
    pub fn test() -> Self {
        Self {
            secret_key: "sk_test_quickdesk".into(),
            webhook_secret: String::new(),
            price_per_agent: 500,
            currency: "PHP".into(),
            trial_days: 14,
        }
    }

    pub fn trial_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::days(i64::from(self.trial_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_config_test() {
        let config = BillingConfig::test();
        assert_eq!(config.trial_days, 14);
        assert_eq!(config.currency, "PHP");
        assert!(config.webhook_secret.is_empty());
    }

    #[test]
    fn test_trial_end() {
        let config = BillingConfig::test();
        let now = Utc::now();
        assert_eq!(config.trial_end(now) - now, chrono::Duration::days(14));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            BillingError::NoAvailableLicenses.to_string(),
            "No available licenses"
        );
        assert_eq!(
            BillingError::InsufficientLicenses {
                requested: 3,
                available: 1
            }
            .to_string(),
            "Insufficient licenses: requested 3, available 1"
        );
        assert_eq!(
            BillingError::ExternalService("card declined".into()).to_string(),
            "External service error: card declined"
        );
    }
}
