//! Slot purchase commands
//!
//! The CLI has no live gateway connection; `confirm` and `fail` record what
//! the gateway reported, and `webhook` replays a delivered payload.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use quickdesk_billing::{parse_webhook_event, DefaultWebhookHandler, WebhookHandler};
use quickdesk_storage::{OrganizationId, PaymentId};

use crate::context::{print_json, CmdResult, Context};

pub async fn cmd_payment_checkout(ctx: &Context, org_id: &OrganizationId, agents: u32) -> CmdResult {
    print_json(&ctx.payments()?.create_slot_checkout(org_id, agents).await?)
}

pub async fn cmd_payment_cancel(
    ctx: &Context,
    org_id: &OrganizationId,
    payment_id: &PaymentId,
) -> CmdResult {
    ctx.payments()?.cancel_pending(org_id, payment_id).await?;
    println!("Payment {} canceled", payment_id);
    Ok(())
}

pub async fn cmd_payment_confirm(
    ctx: &Context,
    org_id: &OrganizationId,
    payment_id: &PaymentId,
) -> CmdResult {
    print_json(&ctx.payments()?.mark_paid(org_id, payment_id, Utc::now()).await?)
}

pub async fn cmd_payment_fail(
    ctx: &Context,
    org_id: &OrganizationId,
    payment_id: &PaymentId,
) -> CmdResult {
    print_json(&ctx.payments()?.mark_failed(org_id, payment_id).await?)
}

pub async fn cmd_payment_webhook(ctx: &Context, payload: &Path, signature: &str) -> CmdResult {
    let body = std::fs::read_to_string(payload)?;
    let config = ctx.billing_config()?;
    let event = parse_webhook_event(&body, signature, &config.webhook_secret)?;

    let handler = DefaultWebhookHandler::new(Arc::new(ctx.payments()?));
    handler.handle_event(event.clone()).await?;
    println!("Applied {:?}", event);
    Ok(())
}

pub async fn cmd_payment_list(ctx: &Context, org_id: &OrganizationId) -> CmdResult {
    print_json(&ctx.payments()?.list_payments(org_id).await?)
}
