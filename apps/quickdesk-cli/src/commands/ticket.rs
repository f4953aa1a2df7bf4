//! Ticket commands

use chrono::Utc;
use quickdesk_activity::Actor;
use quickdesk_storage::{
    ConversationId, MemberId, OrganizationId, Priority, TicketFilter, TicketId, TicketStatus,
};
use quickdesk_tickets::InboundMessage;
use serde_json::{json, Value};

use crate::context::{print_json, CmdResult, Context};

/// Read a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn cmd_ticket_ingest(
    ctx: &Context,
    org_id: &OrganizationId,
    conversation: &str,
    subject: &str,
    from_email: &str,
    from_name: &str,
) -> CmdResult {
    let outcome = ctx
        .tickets()
        .ingest_message(
            org_id,
            InboundMessage {
                conversation_id: ConversationId(conversation.to_string()),
                subject: subject.to_string(),
                sender_email: from_email.to_string(),
                sender_name: from_name.to_string(),
                received_at: Utc::now(),
            },
        )
        .await?;
    print_json(&json!({
        "created": outcome.created,
        "ticket": outcome.ticket,
    }))
}

pub async fn cmd_ticket_update(
    ctx: &Context,
    org_id: &OrganizationId,
    ticket_id: &TicketId,
    field: &str,
    value: &str,
    actor_id: &MemberId,
) -> CmdResult {
    let result = ctx
        .tickets()
        .update_field(org_id, ticket_id, field, &parse_value(value), actor_id)
        .await;
    print_json(&result)?;
    match result.error {
        Some(error) if !result.success => Err(error.into()),
        _ => Ok(()),
    }
}

pub async fn cmd_ticket_show(ctx: &Context, org_id: &OrganizationId, ticket_id: &TicketId) -> CmdResult {
    print_json(&ctx.tickets().get_ticket(org_id, ticket_id).await?)
}

pub async fn cmd_ticket_list(
    ctx: &Context,
    org_id: &OrganizationId,
    status: Option<TicketStatus>,
    priority: Option<Priority>,
    assignee: Option<MemberId>,
    archived: bool,
    limit: Option<usize>,
) -> CmdResult {
    let mut filter = TicketFilter::new().include_archived(archived);
    if let Some(status) = status {
        filter = filter.status(status);
    }
    if let Some(priority) = priority {
        filter = filter.priority(priority);
    }
    if let Some(assignee) = assignee {
        filter = filter.assignee(assignee);
    }
    if let Some(limit) = limit {
        filter = filter.limit(limit);
    }
    print_json(&ctx.tickets().list_tickets(org_id, &filter).await?)
}

pub async fn cmd_ticket_since(ctx: &Context, org_id: &OrganizationId, cursor: u64) -> CmdResult {
    print_json(&ctx.tickets().list_since(org_id, cursor).await?)
}

pub async fn cmd_ticket_unarchive(
    ctx: &Context,
    org_id: &OrganizationId,
    ticket_ids: &[TicketId],
) -> CmdResult {
    let result = ctx
        .tickets()
        .unarchive_tickets(org_id, ticket_ids, &Actor::system())
        .await;
    print_json(&result)?;
    match result.error {
        Some(error) if !result.success => Err(error.into()),
        _ => Ok(()),
    }
}

pub async fn cmd_ticket_delete(
    ctx: &Context,
    org_id: &OrganizationId,
    ticket_id: &TicketId,
) -> CmdResult {
    ctx.tickets().delete_ticket(org_id, ticket_id).await?;
    println!("Ticket {} deleted", ticket_id);
    Ok(())
}

pub async fn cmd_ticket_activity(
    ctx: &Context,
    org_id: &OrganizationId,
    ticket_id: &TicketId,
) -> CmdResult {
    print_json(&ctx.tickets().activity(org_id, ticket_id).await?)
}
