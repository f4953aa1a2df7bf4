//! Payment gateway webhook handling
//!
//! Keeps payments in sync with the gateway. Events arrive in the PayMongo
//! shape: `data.attributes.type` names the event and
//! `data.attributes.data` holds the resource it refers to.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use quickdesk_storage::{OrganizationId, Store};
use sha2::Sha256;
use tracing::{info, warn};

use crate::payments::{PaymentService, CHECKOUT_SESSION_KEY};
use crate::BillingError;

type HmacSha256 = Hmac<Sha256>;

/// Metadata key carrying the organization on gateway resources.
const ORGANIZATION_KEY: &str = "organization_id";

/// Parsed billing webhook event
#[derive(Debug, Clone, PartialEq)]
pub enum BillingWebhookEvent {
    /// Customer paid a checkout session
    CheckoutPaid {
        session_id: String,
        organization_id: Option<String>,
    },

    /// A payment attempt failed
    PaymentFailed {
        gateway_payment_id: String,
        organization_id: Option<String>,
        checkout_session_id: Option<String>,
    },

    /// Unknown or unhandled event
    Unknown { event_type: String },
}

/// Handler for billing webhook events
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Handle an incoming webhook event
    async fn handle_event(&self, event: BillingWebhookEvent) -> Result<(), BillingError>;
}

/// Applies webhook events to local payments
pub struct DefaultWebhookHandler<S: Store + ?Sized> {
    payments: Arc<PaymentService<S>>,
}

impl<S: Store + ?Sized> DefaultWebhookHandler<S> {
    pub fn new(payments: Arc<PaymentService<S>>) -> Self {
        Self { payments }
    }
}

fn parse_org(raw: Option<&str>) -> Option<OrganizationId> {
    raw.and_then(|s| s.parse().ok())
}

#[async_trait]
impl<S: Store + ?Sized + 'static> WebhookHandler for DefaultWebhookHandler<S> {
    async fn handle_event(&self, event: BillingWebhookEvent) -> Result<(), BillingError> {
        match event {
            BillingWebhookEvent::CheckoutPaid {
                session_id,
                organization_id,
            } => {
                info!(%session_id, ?organization_id, "Checkout paid");

                let Some(org_id) = parse_org(organization_id.as_deref()) else {
                    warn!(%session_id, "Checkout has no usable organization_id, ignoring");
                    return Ok(());
                };
                match self.payments.find_by_session(&org_id, &session_id).await {
                    Ok(payment) => {
                        self.payments.mark_paid(&org_id, &payment.id, Utc::now()).await?;
                        Ok(())
                    }
                    Err(BillingError::NotFound(what)) => {
                        warn!(org_id = %org_id, %what, "No local payment for checkout session");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }

            BillingWebhookEvent::PaymentFailed {
                gateway_payment_id,
                organization_id,
                checkout_session_id,
            } => {
                warn!(%gateway_payment_id, ?organization_id, "Payment failed");

                let (Some(org_id), Some(session_id)) =
                    (parse_org(organization_id.as_deref()), checkout_session_id)
                else {
                    warn!(%gateway_payment_id, "Failed payment cannot be matched, ignoring");
                    return Ok(());
                };
                match self.payments.find_by_session(&org_id, &session_id).await {
                    Ok(payment) => {
                        self.payments.mark_failed(&org_id, &payment.id).await?;
                        Ok(())
                    }
                    Err(BillingError::NotFound(what)) => {
                        warn!(org_id = %org_id, %what, "No local payment for failed payment");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }

            BillingWebhookEvent::Unknown { event_type } => {
                info!(%event_type, "Unhandled webhook event type");
                Ok(())
            }
        }
    }
}

/// Parse a raw webhook payload into an event
///
/// * `payload` - Raw webhook body
/// * `signature` - `Paymongo-Signature` header value (`t=..,te=..,li=..`)
/// * `webhook_secret` - Webhook secret (empty string to disable verification)
///
/// When a secret is configured the signature must be present and must match
/// `HMAC-SHA256(secret, "{t}.{payload}")`: the `li` part for live-mode events,
/// `te` otherwise.
pub fn parse_webhook_event(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
) -> Result<BillingWebhookEvent, BillingError> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| BillingError::InvalidWebhookPayload(e.to_string()))?;
    let attributes = &value["data"]["attributes"];

    if !webhook_secret.is_empty() {
        let livemode = attributes["livemode"].as_bool().unwrap_or(false);
        verify_signature(payload, signature, webhook_secret, livemode)?;
    }

    let event_type = attributes["type"]
        .as_str()
        .ok_or_else(|| BillingError::InvalidWebhookPayload("missing event type".into()))?;
    let resource = &attributes["data"];
    let metadata = &resource["attributes"]["metadata"];
    let meta = |key: &str| metadata[key].as_str().map(str::to_string);

    match event_type {
        "checkout_session.payment.paid" => {
            let session_id = resource["id"].as_str().ok_or_else(|| {
                BillingError::InvalidWebhookPayload("missing checkout session id".into())
            })?;
            Ok(BillingWebhookEvent::CheckoutPaid {
                session_id: session_id.to_string(),
                organization_id: meta(ORGANIZATION_KEY),
            })
        }

        "payment.failed" => Ok(BillingWebhookEvent::PaymentFailed {
            gateway_payment_id: resource["id"].as_str().unwrap_or_default().to_string(),
            organization_id: meta(ORGANIZATION_KEY),
            checkout_session_id: meta(CHECKOUT_SESSION_KEY),
        }),

        _ => Ok(BillingWebhookEvent::Unknown {
            event_type: event_type.to_string(),
        }),
    }
}

fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    livemode: bool,
) -> Result<(), BillingError> {
    let mut timestamp = None;
    let mut test_sig = None;
    let mut live_sig = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("te", v)) => test_sig = Some(v),
            Some(("li", v)) => live_sig = Some(v),
            _ => {}
        }
    }

    let expected = if livemode { live_sig } else { test_sig };
    let (Some(timestamp), Some(expected)) = (timestamp, expected.filter(|s| !s.is_empty())) else {
        return Err(BillingError::InvalidWebhookSignature);
    };
    let expected = hex::decode(expected).map_err(|_| BillingError::InvalidWebhookSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::Config(format!("invalid webhook secret: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| BillingError::InvalidWebhookSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsk_test_secret";

    fn sign(payload: &str, timestamp: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn paid_payload(livemode: bool) -> String {
        serde_json::json!({
            "data": {
                "id": "evt_1",
                "attributes": {
                    "type": "checkout_session.payment.paid",
                    "livemode": livemode,
                    "data": {
                        "id": "cs_123",
                        "attributes": {
                            "metadata": {"organization_id": "0191f1b4-8e0a-7c3d-9d6b-3f1e2a4b5c6d"}
                        }
                    }
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_checkout_paid_without_secret() {
        let event = parse_webhook_event(&paid_payload(false), "", "").unwrap();
        assert_eq!(
            event,
            BillingWebhookEvent::CheckoutPaid {
                session_id: "cs_123".into(),
                organization_id: Some("0191f1b4-8e0a-7c3d-9d6b-3f1e2a4b5c6d".into()),
            }
        );
    }

    #[test]
    fn test_valid_test_mode_signature() {
        let payload = paid_payload(false);
        let header = format!("t=1700000000,te={},li=", sign(&payload, "1700000000"));
        assert!(matches!(
            parse_webhook_event(&payload, &header, SECRET),
            Ok(BillingWebhookEvent::CheckoutPaid { .. })
        ));
    }

    #[test]
    fn test_live_mode_checks_live_signature() {
        let payload = paid_payload(true);
        let sig = sign(&payload, "1700000000");

        let header = format!("t=1700000000,te={},li=", sig);
        assert!(matches!(
            parse_webhook_event(&payload, &header, SECRET),
            Err(BillingError::InvalidWebhookSignature)
        ));

        let header = format!("t=1700000000,te=,li={}", sig);
        assert!(parse_webhook_event(&payload, &header, SECRET).is_ok());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let payload = paid_payload(false);
        let header = format!("t=1700000000,te={}", sign(&payload, "1700000000"));
        let tampered = payload.replace("cs_123", "cs_999");
        assert!(matches!(
            parse_webhook_event(&tampered, &header, SECRET),
            Err(BillingError::InvalidWebhookSignature)
        ));
    }

    #[test]
    fn test_missing_signature_with_secret_configured_is_rejected() {
        assert!(matches!(
            parse_webhook_event(&paid_payload(false), "", SECRET),
            Err(BillingError::InvalidWebhookSignature)
        ));
    }

    #[test]
    fn test_parse_payment_failed() {
        let payload = r#"{"data":{"attributes":{"type":"payment.failed","data":{"id":"pay_9",
            "attributes":{"metadata":{"checkout_session_id":"cs_1"}}}}}}"#;
        match parse_webhook_event(payload, "", "").unwrap() {
            BillingWebhookEvent::PaymentFailed {
                gateway_payment_id,
                organization_id,
                checkout_session_id,
            } => {
                assert_eq!(gateway_payment_id, "pay_9");
                assert_eq!(organization_id, None);
                assert_eq!(checkout_session_id.as_deref(), Some("cs_1"));
            }
            other => panic!("Expected PaymentFailed event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_event() {
        let payload = r#"{"data": {"attributes": {"type": "source.chargeable"}}}"#;
        assert_eq!(
            parse_webhook_event(payload, "", "").unwrap(),
            BillingWebhookEvent::Unknown {
                event_type: "source.chargeable".into()
            }
        );
    }

    #[test]
    fn test_garbage_payload() {
        assert!(matches!(
            parse_webhook_event("not json", "", ""),
            Err(BillingError::InvalidWebhookPayload(_))
        ));
    }
}
