//! Member and license commands

use quickdesk_billing::AddMembersCheck;
use quickdesk_storage::{CompanyId, CreateMemberParams, MemberId, OrganizationId};
use serde_json::json;

use crate::context::{print_json, CmdResult, Context};

pub async fn cmd_member_add(
    ctx: &Context,
    org_id: &OrganizationId,
    name: &str,
    email: &str,
    is_client: bool,
    company_id: Option<CompanyId>,
) -> CmdResult {
    let member = ctx
        .members()
        .add_member(
            org_id,
            &CreateMemberParams {
                name: name.to_string(),
                email: email.to_string(),
                is_client,
                company_id,
            },
        )
        .await?;
    print_json(&member)
}

pub async fn cmd_member_invite(
    ctx: &Context,
    org_id: &OrganizationId,
    member_id: &MemberId,
) -> CmdResult {
    print_json(&ctx.members().send_invitation(org_id, member_id).await?)
}

pub async fn cmd_member_verify(
    ctx: &Context,
    org_id: &OrganizationId,
    member_id: &MemberId,
) -> CmdResult {
    print_json(&ctx.members().complete_signup(org_id, member_id).await?)
}

pub async fn cmd_member_list(ctx: &Context, org_id: &OrganizationId) -> CmdResult {
    print_json(&ctx.members().list_members(org_id).await?)
}

pub async fn cmd_license_activate(
    ctx: &Context,
    org_id: &OrganizationId,
    member_id: &MemberId,
) -> CmdResult {
    print_json(&ctx.licenses().activate_license(org_id, member_id).await?)
}

pub async fn cmd_license_revoke(
    ctx: &Context,
    org_id: &OrganizationId,
    member_id: &MemberId,
) -> CmdResult {
    print_json(&ctx.licenses().revoke_license(org_id, member_id).await?)
}

pub async fn cmd_license_bulk(
    ctx: &Context,
    org_id: &OrganizationId,
    member_ids: &[MemberId],
) -> CmdResult {
    print_json(
        &ctx.licenses()
            .bulk_activate_licenses(org_id, member_ids)
            .await?,
    )
}

pub async fn cmd_license_status(ctx: &Context, org_id: &OrganizationId) -> CmdResult {
    print_json(&ctx.licenses().status(org_id).await?)
}

pub async fn cmd_license_can_add(ctx: &Context, org_id: &OrganizationId) -> CmdResult {
    let check = ctx.licenses().can_add_members(org_id).await?;
    let reason = match &check {
        AddMembersCheck::Allowed => None,
        AddMembersCheck::Blocked(reason) => Some(reason.as_str()),
    };
    print_json(&json!({
        "allowed": check.is_allowed(),
        "reason": reason,
    }))
}
