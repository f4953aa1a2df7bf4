use clap::Parser;
use quickdesk_events_memory::TaggedChange;
use quickdesk_storage::DeadlineSettings;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod context;

use cli::{
    Cli, Command, CompanyCommand, LicenseCommand, MemberCommand, OrgCommand, PaymentCommand,
    SettingsCommand, SubscriptionCommand, TicketCommand,
};
use commands::*;
use context::Context;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries command output; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Init = cli.command {
        return cmd_init(cli.config.as_deref());
    }

    let ctx = Context::open(cli.config.as_deref(), cli.state.clone())?;
    let mut changes = ctx.events.subscribe_all();
    let result = run(&ctx, cli.command).await;
    log_ticket_changes(&mut changes);
    // tickets and payments may be written before a later step fails
    ctx.save().await?;
    result
}

/// Log the ticket changes this invocation published.
fn log_ticket_changes(changes: &mut broadcast::Receiver<TaggedChange>) {
    while let Ok((org_id, event)) = changes.try_recv() {
        info!(
            org_id = %org_id,
            ticket_id = %event.ticket_id,
            ticket_number = event.ticket_number,
            kind = ?event.kind,
            revision = event.revision,
            "Ticket changed"
        );
    }
}

async fn run(ctx: &Context, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Init => {}
        Command::Org { org_cmd } => match org_cmd {
            OrgCommand::Create {
                name,
                owner_email,
                trial_slots,
            } => {
                cmd_org_create(ctx, &name, &owner_email, trial_slots).await?;
            }
            OrgCommand::List => {
                cmd_org_list(ctx).await?;
            }
            OrgCommand::Show { org } => {
                cmd_org_show(ctx, &org).await?;
            }
        },
        Command::Settings { settings_cmd } => match settings_cmd {
            SettingsCommand::Deadlines {
                org,
                urgent,
                high,
                medium,
                low,
            } => {
                let settings = DeadlineSettings {
                    urgent,
                    high,
                    medium,
                    low,
                };
                cmd_settings_deadlines(ctx, &org, settings).await?;
            }
        },
        Command::Subscription { subscription_cmd } => match subscription_cmd {
            SubscriptionCommand::Show { org } => {
                cmd_subscription_show(ctx, &org).await?;
            }
            SubscriptionCommand::Refresh { org } => {
                cmd_subscription_refresh(ctx, &org).await?;
            }
            SubscriptionCommand::Cancel { org } => {
                cmd_subscription_cancel(ctx, &org).await?;
            }
        },
        Command::Member { member_cmd } => match member_cmd {
            MemberCommand::Add {
                org,
                name,
                email,
                client,
                company,
            } => {
                cmd_member_add(ctx, &org, &name, &email, client, company).await?;
            }
            MemberCommand::Invite { org, member } => {
                cmd_member_invite(ctx, &org, &member).await?;
            }
            MemberCommand::Verify { org, member } => {
                cmd_member_verify(ctx, &org, &member).await?;
            }
            MemberCommand::List { org } => {
                cmd_member_list(ctx, &org).await?;
            }
        },
        Command::Company { company_cmd } => match company_cmd {
            CompanyCommand::Create { org, name } => {
                cmd_company_create(ctx, &org, &name).await?;
            }
            CompanyCommand::AddEmployee {
                org,
                company,
                name,
                email,
            } => {
                cmd_company_add_employee(ctx, &org, &company, &name, &email).await?;
            }
        },
        Command::License { license_cmd } => match license_cmd {
            LicenseCommand::Activate { org, member } => {
                cmd_license_activate(ctx, &org, &member).await?;
            }
            LicenseCommand::Revoke { org, member } => {
                cmd_license_revoke(ctx, &org, &member).await?;
            }
            LicenseCommand::Bulk { org, members } => {
                cmd_license_bulk(ctx, &org, &members).await?;
            }
            LicenseCommand::Status { org } => {
                cmd_license_status(ctx, &org).await?;
            }
            LicenseCommand::CanAdd { org } => {
                cmd_license_can_add(ctx, &org).await?;
            }
        },
        Command::Ticket { ticket_cmd } => match ticket_cmd {
            TicketCommand::Ingest {
                org,
                conversation,
                subject,
                from_email,
                from_name,
            } => {
                cmd_ticket_ingest(ctx, &org, &conversation, &subject, &from_email, &from_name)
                    .await?;
            }
            TicketCommand::Update {
                org,
                ticket,
                field,
                value,
                actor,
            } => {
                cmd_ticket_update(ctx, &org, &ticket, &field, &value, &actor).await?;
            }
            TicketCommand::Show { org, ticket } => {
                cmd_ticket_show(ctx, &org, &ticket).await?;
            }
            TicketCommand::List {
                org,
                status,
                priority,
                assignee,
                archived,
                limit,
            } => {
                cmd_ticket_list(ctx, &org, status, priority, assignee, archived, limit).await?;
            }
            TicketCommand::Since { org, cursor } => {
                cmd_ticket_since(ctx, &org, cursor).await?;
            }
            TicketCommand::Unarchive { org, tickets } => {
                cmd_ticket_unarchive(ctx, &org, &tickets).await?;
            }
            TicketCommand::Delete { org, ticket } => {
                cmd_ticket_delete(ctx, &org, &ticket).await?;
            }
            TicketCommand::Activity { org, ticket } => {
                cmd_ticket_activity(ctx, &org, &ticket).await?;
            }
        },
        Command::Payment { payment_cmd } => match payment_cmd {
            PaymentCommand::Checkout { org, agents } => {
                cmd_payment_checkout(ctx, &org, agents).await?;
            }
            PaymentCommand::Cancel { org, payment } => {
                cmd_payment_cancel(ctx, &org, &payment).await?;
            }
            PaymentCommand::Confirm { org, payment } => {
                cmd_payment_confirm(ctx, &org, &payment).await?;
            }
            PaymentCommand::Fail { org, payment } => {
                cmd_payment_fail(ctx, &org, &payment).await?;
            }
            PaymentCommand::Webhook { payload, signature } => {
                cmd_payment_webhook(ctx, &payload, &signature).await?;
            }
            PaymentCommand::List { org } => {
                cmd_payment_list(ctx, &org).await?;
            }
        },
    }

    Ok(())
}
