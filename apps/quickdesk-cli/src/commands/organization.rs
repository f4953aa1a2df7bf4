//! Organization commands: create, list, show, settings, subscription

use std::path::Path;

use chrono::Utc;
use quickdesk_billing::BillingError;
use quickdesk_config::QuickdeskConfig;
use quickdesk_storage::{CreateOrganizationParams, DeadlineSettings, OrganizationId, Store};
use serde_json::json;
use tracing::info;

use crate::context::{print_json, CmdResult, Context};

/// Write the default config unless one already exists.
pub fn cmd_init(config_path: Option<&Path>) -> CmdResult {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => QuickdeskConfig::default_path()?,
    };
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    QuickdeskConfig::default().save_to(&path)?;
    println!("Config written to {}", path.display());
    Ok(())
}

pub async fn cmd_org_create(
    ctx: &Context,
    name: &str,
    owner_email: &str,
    trial_slots: u32,
) -> CmdResult {
    let org = ctx
        .store
        .create_organization(&CreateOrganizationParams {
            name: name.to_string(),
            owner_email: owner_email.to_string(),
        })
        .await?;
    if let Some(settings) = &ctx.config.deadline_settings {
        ctx.store.set_deadline_settings(&org.id, settings).await?;
    }
    let subscription = ctx
        .subscriptions()?
        .start_trial(&org.id, trial_slots, Utc::now())
        .await?;

    info!(org_id = %org.id, "Organization created");
    print_json(&json!({
        "organization": org,
        "subscription": subscription,
    }))
}

pub async fn cmd_org_list(ctx: &Context) -> CmdResult {
    print_json(&ctx.store.list_organizations().await)
}

pub async fn cmd_org_show(ctx: &Context, org_id: &OrganizationId) -> CmdResult {
    let org = ctx.store.get_organization(org_id).await?;
    let deadline_settings = ctx.store.get_deadline_settings(org_id).await?;
    let subscription = match ctx.subscriptions()?.get(org_id).await {
        Ok(subscription) => Some(subscription),
        Err(BillingError::SubscriptionNotFound) => None,
        Err(e) => return Err(e.into()),
    };
    print_json(&json!({
        "organization": org,
        "deadlineSettings": deadline_settings,
        "subscription": subscription,
    }))
}

pub async fn cmd_settings_deadlines(
    ctx: &Context,
    org_id: &OrganizationId,
    settings: DeadlineSettings,
) -> CmdResult {
    ctx.store.set_deadline_settings(org_id, &settings).await?;
    info!(org_id = %org_id, ?settings, "Deadline settings updated");
    print_json(&settings)
}

pub async fn cmd_subscription_show(ctx: &Context, org_id: &OrganizationId) -> CmdResult {
    print_json(&ctx.subscriptions()?.get(org_id).await?)
}

pub async fn cmd_subscription_refresh(ctx: &Context, org_id: &OrganizationId) -> CmdResult {
    print_json(&ctx.subscriptions()?.refresh_status(org_id, Utc::now()).await?)
}

pub async fn cmd_subscription_cancel(ctx: &Context, org_id: &OrganizationId) -> CmdResult {
    print_json(&ctx.subscriptions()?.cancel(org_id, Utc::now()).await?)
}
