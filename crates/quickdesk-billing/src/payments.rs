//! Agent slot purchases.
//!
//! A checkout creates a `PENDING` payment. It becomes `PAID` only after the
//! gateway confirms it (webhook or explicit sync), at which point the
//! purchased slots are added to the subscription. Terminal payments never
//! change again.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use parking_lot::Mutex;
use quickdesk_storage::{
    CreatePaymentParams, OrganizationId, Payment, PaymentId, PaymentStatus, Store, StoreError,
    Subscription, SubscriptionStatus, SubscriptionUpdate,
};
use tracing::{info, warn};

use crate::seats::load_subscription;
use crate::{BillingConfig, BillingError};

pub const CHECKOUT_URL_KEY: &str = "checkout_url";
pub const CHECKOUT_SESSION_KEY: &str = "checkout_session_id";
/// Marks a payment as a slot purchase.
pub const PURCHASE_KEY: &str = "purchase";
pub const PURCHASE_AGENT_SLOTS: &str = "agent_slots";

/// What we ask the gateway to charge
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub organization_id: OrganizationId,
    pub amount: i64,
    pub currency: String,
    pub agent_count: u32,
    pub description: String,
}

/// Result of creating a checkout session
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,

    /// URL to redirect the user to for payment
    pub checkout_url: String,
}

/// Payment state as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Unpaid,
    Paid,
    Failed,
    Expired,
}

/// Payment gateway client
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError>;

    async fn checkout_status(&self, session_id: &str) -> Result<GatewayPaymentStatus, BillingError>;
}

/// Mock gateway for development and testing
#[derive(Default)]
pub struct MockPaymentGateway {
    sessions: Mutex<HashMap<String, GatewayPaymentStatus>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the customer finishing (or abandoning) a checkout.
    pub fn set_status(&self, session_id: &str, status: GatewayPaymentStatus) {
        self.sessions.lock().insert(session_id.to_string(), status);
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        let session_id = format!("cs_mock_{}", uuid::Uuid::new_v4().simple());
        let checkout_url = format!("https://checkout.mock.invalid/{}", session_id);
        self.sessions
            .lock()
            .insert(session_id.clone(), GatewayPaymentStatus::Unpaid);

        info!(
            org_id = %request.organization_id,
            amount = request.amount,
            agent_count = request.agent_count,
            "Mock checkout session created"
        );

        Ok(CheckoutSession {
            session_id,
            checkout_url,
        })
    }

    async fn checkout_status(&self, session_id: &str) -> Result<GatewayPaymentStatus, BillingError> {
        self.sessions
            .lock()
            .get(session_id)
            .copied()
            .ok_or_else(|| {
                BillingError::ExternalService(format!("No such checkout_session: {}", session_id))
            })
    }
}

pub struct PaymentService<S: Store + ?Sized> {
    config: BillingConfig,
    store: Arc<S>,
    gateway: Arc<dyn PaymentGateway>,
}

impl<S: Store + ?Sized> PaymentService<S> {
    pub fn new(config: BillingConfig, store: Arc<S>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            config,
            store,
            gateway,
        }
    }

    /// Start buying `agent_count` additional slots.
    pub async fn create_slot_checkout(
        &self,
        org_id: &OrganizationId,
        agent_count: u32,
    ) -> Result<Payment, BillingError> {
        if agent_count == 0 {
            return Err(BillingError::State("agent count must be at least 1".into()));
        }
        load_subscription(&*self.store, org_id).await?;

        let existing = self.store.list_payments(org_id).await?;
        if existing.iter().any(|p| p.status == PaymentStatus::Pending) {
            return Err(BillingError::State(
                "a payment is already pending for this organization".into(),
            ));
        }

        let amount = i64::from(agent_count) * self.config.price_per_agent;
        let request = CheckoutRequest {
            organization_id: *org_id,
            amount,
            currency: self.config.currency.clone(),
            agent_count,
            description: format!("{} agent slot(s)", agent_count),
        };
        let session = self.gateway.create_checkout_session(&request).await?;

        let metadata = BTreeMap::from([
            (CHECKOUT_URL_KEY.to_string(), session.checkout_url),
            (CHECKOUT_SESSION_KEY.to_string(), session.session_id),
            (PURCHASE_KEY.to_string(), PURCHASE_AGENT_SLOTS.to_string()),
        ]);
        let payment = self
            .store
            .create_payment(
                org_id,
                &CreatePaymentParams {
                    amount,
                    currency: self.config.currency.clone(),
                    agent_count,
                    metadata,
                },
            )
            .await?;

        info!(
            org_id = %org_id,
            payment_id = %payment.id,
            amount,
            agent_count,
            "Slot checkout created"
        );
        Ok(payment)
    }

    /// Cancel (delete) a payment that is still pending.
    pub async fn cancel_pending(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
    ) -> Result<(), BillingError> {
        let payment = self.payment(org_id, payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(BillingError::State(format!(
                "only pending payments can be canceled; this one is {}",
                payment.status
            )));
        }
        self.store.delete_payment(org_id, payment_id).await?;
        info!(org_id = %org_id, payment_id = %payment_id, "Pending payment canceled");
        Ok(())
    }

    /// Apply a gateway `PAID` confirmation. Redelivery is a no-op.
    ///
    /// The status change and the slot credit are a single store write, so a
    /// payment is never `PAID` without its slots.
    pub async fn mark_paid(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        let payment = self.payment(org_id, payment_id).await?;
        let add_agent_slots =
            if payment.metadata.get(PURCHASE_KEY).map(String::as_str) == Some(PURCHASE_AGENT_SLOTS) {
                payment.agent_count
            } else {
                0
            };
        let period_end = now
            .checked_add_months(Months::new(1))
            .unwrap_or(now + Duration::days(30));
        let update = SubscriptionUpdate {
            add_agent_slots,
            current_period: Some((now, period_end)),
            ..SubscriptionUpdate::status(SubscriptionStatus::Active)
        };

        let subscription = match self.store.confirm_payment(org_id, payment_id, &update).await {
            Ok((_, subscription)) => subscription,
            Err(StoreError::Conflict) => {
                let current = self.payment(org_id, payment_id).await?;
                if current.status == PaymentStatus::Paid {
                    info!(org_id = %org_id, payment_id = %payment_id, "Payment already applied");
                    return load_subscription(&*self.store, org_id).await;
                }
                return Err(BillingError::State(format!(
                    "payment is {} and cannot be marked paid",
                    current.status
                )));
            }
            Err(StoreError::NotFound) => {
                // Either record may be missing; report the one that is.
                self.payment(org_id, payment_id).await?;
                return Err(BillingError::SubscriptionNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            org_id = %org_id,
            payment_id = %payment_id,
            agent_slots = subscription.agent_slots,
            "Payment applied"
        );
        Ok(subscription)
    }

    pub async fn mark_failed(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
    ) -> Result<Payment, BillingError> {
        match self
            .store
            .transition_payment(org_id, payment_id, PaymentStatus::Pending, PaymentStatus::Failed)
            .await
        {
            Ok(payment) => {
                warn!(org_id = %org_id, payment_id = %payment_id, "Payment failed");
                Ok(payment)
            }
            Err(StoreError::Conflict) => {
                let current = self.payment(org_id, payment_id).await?;
                if current.status == PaymentStatus::Failed {
                    Ok(current)
                } else {
                    Err(BillingError::State(format!(
                        "payment is {} and cannot be marked failed",
                        current.status
                    )))
                }
            }
            Err(StoreError::NotFound) => {
                Err(BillingError::NotFound(format!("payment {}", payment_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ask the gateway about a pending payment and apply the answer.
    pub async fn sync_with_gateway(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
        now: DateTime<Utc>,
    ) -> Result<Payment, BillingError> {
        let payment = self.payment(org_id, payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Ok(payment);
        }
        let session_id = payment.metadata.get(CHECKOUT_SESSION_KEY).ok_or_else(|| {
            BillingError::State("payment has no checkout session to check".into())
        })?;

        match self.gateway.checkout_status(session_id).await? {
            GatewayPaymentStatus::Paid => {
                self.mark_paid(org_id, payment_id, now).await?;
            }
            GatewayPaymentStatus::Failed | GatewayPaymentStatus::Expired => {
                self.mark_failed(org_id, payment_id).await?;
            }
            GatewayPaymentStatus::Unpaid => {}
        }
        self.payment(org_id, payment_id).await
    }

    pub async fn list_payments(&self, org_id: &OrganizationId) -> Result<Vec<Payment>, BillingError> {
        Ok(self.store.list_payments(org_id).await?)
    }

    /// Find the payment created for a gateway checkout session.
    pub async fn find_by_session(
        &self,
        org_id: &OrganizationId,
        session_id: &str,
    ) -> Result<Payment, BillingError> {
        self.store
            .list_payments(org_id)
            .await?
            .into_iter()
            .find(|p| p.metadata.get(CHECKOUT_SESSION_KEY).map(String::as_str) == Some(session_id))
            .ok_or_else(|| BillingError::NotFound(format!("payment for session {}", session_id)))
    }

    async fn payment(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
    ) -> Result<Payment, BillingError> {
        match self.store.get_payment(org_id, payment_id).await {
            Ok(payment) => Ok(payment),
            Err(StoreError::NotFound) => {
                Err(BillingError::NotFound(format!("payment {}", payment_id)))
            }
            Err(e) => Err(e.into()),
        }
    }
}
