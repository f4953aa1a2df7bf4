//! Client company commands

use quickdesk_storage::{CompanyId, CreateEmployeeParams, OrganizationId, Store};

use crate::context::{print_json, CmdResult, Context};

pub async fn cmd_company_create(ctx: &Context, org_id: &OrganizationId, name: &str) -> CmdResult {
    print_json(&ctx.store.create_company(org_id, name).await?)
}

pub async fn cmd_company_add_employee(
    ctx: &Context,
    org_id: &OrganizationId,
    company_id: &CompanyId,
    name: &str,
    email: &str,
) -> CmdResult {
    // surface a clean "not found" before creating the record
    ctx.store.get_company(org_id, company_id).await?;
    let employee = ctx
        .store
        .create_employee(
            org_id,
            &CreateEmployeeParams {
                company_id: *company_id,
                name: name.to_string(),
                email: email.to_string(),
            },
        )
        .await?;
    print_json(&employee)
}
