//! Ticket activity log abstraction for quickdesk.
//!
//! This crate defines the `ActivityLog` trait for persisting ticket timeline
//! events and the types describing them. Entries are append-only: once
//! written they are never mutated or deleted.
//!
//! Per-ticket ordering comes from the `sequence` the backend assigns at
//! append time, never from the caller-supplied `date`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quickdesk_storage::{OrganizationId, TicketId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an activity entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub Uuid);

impl ActivityId {
    /// Generate a new activity ID using UUID v7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ActivityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kinds of ticket activity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    Create,
    Tags,
    Deadline,
    Assignee,
    Priority,
    Status,
    Type,
    Company,
    Forward,
    Note,
    Update,
}

impl ActivityType {
    pub const ALL: [ActivityType; 11] = [
        ActivityType::Create,
        ActivityType::Tags,
        ActivityType::Deadline,
        ActivityType::Assignee,
        ActivityType::Priority,
        ActivityType::Status,
        ActivityType::Type,
        ActivityType::Company,
        ActivityType::Forward,
        ActivityType::Note,
        ActivityType::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Create => "Create",
            ActivityType::Tags => "Tags",
            ActivityType::Deadline => "Deadline",
            ActivityType::Assignee => "Assignee",
            ActivityType::Priority => "Priority",
            ActivityType::Status => "Status",
            ActivityType::Type => "Type",
            ActivityType::Company => "Company",
            ActivityType::Forward => "Forward",
            ActivityType::Note => "Note",
            ActivityType::Update => "Update",
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown activity type: {}", s))
    }
}

/// Who performed an action, as shown on the ticket timeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub email: String,
}

impl Actor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Actor used for changes made by quickdesk itself.
    pub fn system() -> Self {
        Self::new("Quickdesk", "system@quickdesk.local")
    }
}

/// A stored activity entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: ActivityId,
    pub organization_id: OrganizationId,
    pub ticket_id: TicketId,
    /// Backend-assigned, strictly increasing per log.
    pub sequence: u64,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    /// Human-readable description
    pub details: String,
    pub date: DateTime<Utc>,
    pub user_name: String,
    pub user_email: String,
}

impl ActivityEntry {
    /// Create a new activity builder
    pub fn builder(
        org_id: &OrganizationId,
        ticket_id: &TicketId,
        activity_type: ActivityType,
    ) -> ActivityBuilder {
        ActivityBuilder::new(org_id, ticket_id, activity_type)
    }
}

/// An activity not yet written. Produced by [`ActivityBuilder::build`].
#[derive(Clone, Debug, PartialEq)]
pub struct NewActivity {
    pub organization_id: OrganizationId,
    pub ticket_id: TicketId,
    pub activity_type: ActivityType,
    pub details: String,
    pub date: DateTime<Utc>,
    pub actor: Actor,
}

impl NewActivity {
    /// Turn into a stored entry once the backend has picked a sequence number.
    pub fn into_entry(self, sequence: u64) -> ActivityEntry {
        ActivityEntry {
            id: ActivityId::new(),
            organization_id: self.organization_id,
            ticket_id: self.ticket_id,
            sequence,
            activity_type: self.activity_type,
            details: self.details,
            date: self.date,
            user_name: self.actor.name,
            user_email: self.actor.email,
        }
    }
}

/// Builder for activity entries
pub struct ActivityBuilder {
    organization_id: OrganizationId,
    ticket_id: TicketId,
    activity_type: ActivityType,
    details: String,
    date: Option<DateTime<Utc>>,
    actor: Actor,
}

impl ActivityBuilder {
    pub fn new(org_id: &OrganizationId, ticket_id: &TicketId, activity_type: ActivityType) -> Self {
        Self {
            organization_id: *org_id,
            ticket_id: *ticket_id,
            activity_type,
            details: String::new(),
            date: None,
            actor: Actor::system(),
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn actor(mut self, actor: &Actor) -> Self {
        self.actor = actor.clone();
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn build(self) -> NewActivity {
        NewActivity {
            organization_id: self.organization_id,
            ticket_id: self.ticket_id,
            activity_type: self.activity_type,
            details: self.details,
            date: self.date.unwrap_or_else(Utc::now),
            actor: self.actor,
        }
    }
}

/// Filter for querying activity entries
#[derive(Clone, Debug, Default)]
pub struct ActivityFilter {
    /// Filter by ticket
    pub ticket_id: Option<TicketId>,
    /// Filter by activity type
    pub activity_type: Option<ActivityType>,
    /// Filter by actor email
    pub user_email: Option<String>,
    /// Only entries with a sequence greater than this
    pub after_sequence: Option<u64>,
    /// Maximum number of results to return
    pub limit: Option<u32>,
    /// Number of results to skip (for pagination)
    pub offset: Option<u32>,
}

impl ActivityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket_id(mut self, ticket_id: TicketId) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }

    pub fn activity_type(mut self, activity_type: ActivityType) -> Self {
        self.activity_type = Some(activity_type);
        self
    }

    pub fn user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn after_sequence(mut self, sequence: u64) -> Self {
        self.after_sequence = Some(sequence);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether an entry passes the non-paging criteria of this filter.
    pub fn matches(&self, entry: &ActivityEntry) -> bool {
        self.ticket_id.map_or(true, |t| t == entry.ticket_id)
            && self.activity_type.map_or(true, |t| t == entry.activity_type)
            && self
                .user_email
                .as_ref()
                .map_or(true, |e| *e == entry.user_email)
            && self.after_sequence.map_or(true, |s| entry.sequence > s)
    }
}

/// Error type for activity log operations
#[derive(Debug, Error)]
pub enum ActivityLogError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("activity entry not found: {0}")]
    NotFound(ActivityId),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Trait for activity log persistence.
///
/// `append` must succeed before the triggering ticket update counts as
/// complete; callers surface its failure rather than swallowing it.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Append an entry, assigning its id and sequence number.
    async fn append(&self, activity: NewActivity) -> Result<ActivityEntry, ActivityLogError>;

    /// All entries of one ticket in append order.
    async fn list_for_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<Vec<ActivityEntry>, ActivityLogError>;

    /// Query entries of an organization, ordered by sequence ascending.
    async fn query(
        &self,
        org_id: &OrganizationId,
        filter: ActivityFilter,
    ) -> Result<Vec<ActivityEntry>, ActivityLogError>;

    /// Count entries matching the filter (paging fields ignored).
    async fn count(
        &self,
        org_id: &OrganizationId,
        filter: ActivityFilter,
    ) -> Result<u64, ActivityLogError>;
}
