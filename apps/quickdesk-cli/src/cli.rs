use clap::{Parser, Subcommand};
use quickdesk_storage::{
    CompanyId, DeadlineSettings, MemberId, OrganizationId, PaymentId, Priority, TicketId, TicketStatus,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quickdesk")]
#[command(about = "Quickdesk ticketing and seat licensing admin CLI")]
pub struct Cli {
    /// Config file (defaults to ~/.quickdesk/config.json)
    #[arg(long, env = "QUICKDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Snapshot file holding the local store (overrides the config)
    #[arg(long, env = "QUICKDESK_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a default config file
    Init,
    /// Organization commands
    Org {
        #[command(subcommand)]
        org_cmd: OrgCommand,
    },
    /// Per-organization settings
    Settings {
        #[command(subcommand)]
        settings_cmd: SettingsCommand,
    },
    /// Subscription commands
    Subscription {
        #[command(subcommand)]
        subscription_cmd: SubscriptionCommand,
    },
    /// Member commands (agents and client contacts)
    Member {
        #[command(subcommand)]
        member_cmd: MemberCommand,
    },
    /// Client company commands
    Company {
        #[command(subcommand)]
        company_cmd: CompanyCommand,
    },
    /// License (seat) commands
    License {
        #[command(subcommand)]
        license_cmd: LicenseCommand,
    },
    /// Ticket commands
    Ticket {
        #[command(subcommand)]
        ticket_cmd: TicketCommand,
    },
    /// Slot purchase commands
    Payment {
        #[command(subcommand)]
        payment_cmd: PaymentCommand,
    },
}

#[derive(Subcommand)]
pub enum OrgCommand {
    /// Create an organization and start its trial
    Create {
        /// Organization name
        name: String,
        /// Owner email
        #[arg(long)]
        owner_email: String,
        /// Agent slots included in the trial
        #[arg(long, default_value = "1")]
        trial_slots: u32,
    },
    /// List organizations
    List,
    /// Show an organization with its subscription and deadline settings
    Show {
        org: OrganizationId,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Set deadline lead times in days (0 disables the automatic deadline)
    Deadlines {
        org: OrganizationId,
        #[arg(long, default_value = "0", value_parser = lead_days)]
        urgent: u32,
        #[arg(long, default_value = "0", value_parser = lead_days)]
        high: u32,
        #[arg(long, default_value = "0", value_parser = lead_days)]
        medium: u32,
        #[arg(long, default_value = "0", value_parser = lead_days)]
        low: u32,
    },
}

#[derive(Subcommand)]
pub enum SubscriptionCommand {
    /// Show the subscription
    Show { org: OrganizationId },
    /// Expire a lapsed trial or flag an unpaid period
    Refresh { org: OrganizationId },
    /// Cancel the subscription
    Cancel { org: OrganizationId },
}

#[derive(Subcommand)]
pub enum MemberCommand {
    /// Add a member (agents need a free slot)
    Add {
        org: OrganizationId,
        /// Display name
        #[arg(long)]
        name: String,
        /// Email, unique within the organization
        #[arg(long)]
        email: String,
        /// Add as a client contact instead of an agent
        #[arg(long)]
        client: bool,
        /// Client company the contact belongs to
        #[arg(long)]
        company: Option<CompanyId>,
    },
    /// Send the invitation email
    Invite {
        org: OrganizationId,
        member: MemberId,
    },
    /// Mark the member as having completed signup
    Verify {
        org: OrganizationId,
        member: MemberId,
    },
    /// List members
    List { org: OrganizationId },
}

#[derive(Subcommand)]
pub enum CompanyCommand {
    /// Create a client company
    Create {
        org: OrganizationId,
        name: String,
    },
    /// Register an employee of a client company
    AddEmployee {
        org: OrganizationId,
        company: CompanyId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand)]
pub enum LicenseCommand {
    /// Give an agent a license
    Activate {
        org: OrganizationId,
        member: MemberId,
    },
    /// Take an agent's license back
    Revoke {
        org: OrganizationId,
        member: MemberId,
    },
    /// License several agents at once (all or nothing)
    Bulk {
        org: OrganizationId,
        #[arg(required = true)]
        members: Vec<MemberId>,
    },
    /// Show seat usage
    Status { org: OrganizationId },
    /// Check whether new agents can be added
    CanAdd { org: OrganizationId },
}

#[derive(Subcommand)]
pub enum TicketCommand {
    /// Create a ticket from an inbound email (idempotent per conversation)
    Ingest {
        org: OrganizationId,
        /// Mail provider conversation id
        #[arg(long)]
        conversation: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        from_email: String,
        #[arg(long, default_value = "")]
        from_name: String,
    },
    /// Update one field (status, priority, type, assignee, tags, deadline)
    Update {
        org: OrganizationId,
        ticket: TicketId,
        field: String,
        /// New value: JSON (`null`, `["a","b"]`) or a bare string
        value: String,
        /// Member making the change
        #[arg(long = "as")]
        actor: MemberId,
    },
    /// Show a ticket
    Show {
        org: OrganizationId,
        ticket: TicketId,
    },
    /// List tickets (archived ones only with --archived or --status)
    List {
        org: OrganizationId,
        #[arg(long)]
        status: Option<TicketStatus>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        assignee: Option<MemberId>,
        #[arg(long)]
        archived: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Tickets written after a revision cursor
    Since {
        org: OrganizationId,
        #[arg(default_value = "0")]
        cursor: u64,
    },
    /// Restore archived tickets (all or nothing)
    Unarchive {
        org: OrganizationId,
        #[arg(required = true)]
        tickets: Vec<TicketId>,
    },
    /// Delete a ticket
    Delete {
        org: OrganizationId,
        ticket: TicketId,
    },
    /// Show a ticket's activity timeline
    Activity {
        org: OrganizationId,
        ticket: TicketId,
    },
}

#[derive(Subcommand)]
pub enum PaymentCommand {
    /// Start buying agent slots
    Checkout {
        org: OrganizationId,
        agents: u32,
    },
    /// Cancel a pending payment
    Cancel {
        org: OrganizationId,
        payment: PaymentId,
    },
    /// Record a gateway confirmation for a pending payment
    Confirm {
        org: OrganizationId,
        payment: PaymentId,
    },
    /// Record a failed payment
    Fail {
        org: OrganizationId,
        payment: PaymentId,
    },
    /// Apply a gateway webhook payload read from a file
    Webhook {
        /// File holding the raw request body
        payload: PathBuf,
        /// Signature header value
        #[arg(long, default_value = "")]
        signature: String,
    },
    /// List payments
    List { org: OrganizationId },
}

/// Lead time in days, capped at `DeadlineSettings::MAX_LEAD_DAYS`.
fn lead_days(raw: &str) -> Result<u32, String> {
    let days: u32 = raw.parse().map_err(|e| format!("{}", e))?;
    if days > DeadlineSettings::MAX_LEAD_DAYS {
        return Err(format!(
            "lead time must be at most {} days",
            DeadlineSettings::MAX_LEAD_DAYS
        ));
    }
    Ok(days)
}
