//! Ticket records and the enums that describe them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CompanyId, ConversationId, MemberId, OrganizationId, TicketId};

/// Error type for parsing one of the fixed-vocabulary enums from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// Ticket status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    Pending,
    Resolved,
    Closed,
    Archived,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        TicketStatus::Open,
        TicketStatus::Pending,
        TicketStatus::Resolved,
        TicketStatus::Closed,
        TicketStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "Open",
            TicketStatus::Pending => "Pending",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Closed => "Closed",
            TicketStatus::Archived => "Archived",
        }
    }

    /// Resolved and Closed both count as a resolution for SLA purposes.
    pub fn is_resolution(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

impl FromStr for TicketStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "status",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket priority. `None` means "no priority" and never carries a deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    None,
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::None,
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::None => "None",
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }

    /// Whether this priority takes part in deadline policy.
    pub fn is_ranked(&self) -> bool {
        !matches!(self, Priority::None)
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "priority",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketType {
    Questions,
    Incident,
    Problem,
    #[serde(rename = "Feature Request")]
    FeatureRequest,
}

impl TicketType {
    pub const ALL: [TicketType; 4] = [
        TicketType::Questions,
        TicketType::Incident,
        TicketType::Problem,
        TicketType::FeatureRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketType::Questions => "Questions",
            TicketType::Incident => "Incident",
            TicketType::Problem => "Problem",
            TicketType::FeatureRequest => "Feature Request",
        }
    }
}

impl FromStr for TicketType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "type",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for TicketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub organization_id: OrganizationId,
    pub ticket_number: u64,
    pub subject: String,
    pub sender_email: String,
    pub sender_name: String,
    pub status: TicketStatus,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub assignee: Option<MemberId>,
    pub deadline: Option<DateTime<Utc>>,
    /// Display order is insertion order.
    pub tags: Vec<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub company_id: Option<CompanyId>,
    pub conversation_id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Organization-wide write counter stamped by the store on every change.
    pub revision: u64,
}

impl Ticket {
    pub fn is_archived(&self) -> bool {
        self.status == TicketStatus::Archived
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Parameters for creating a ticket. The store assigns id and ticket number.
#[derive(Clone, Debug)]
pub struct CreateTicketParams {
    pub subject: String,
    pub sender_email: String,
    pub sender_name: String,
    pub priority: Priority,
    pub ticket_type: TicketType,
    pub deadline: Option<DateTime<Utc>>,
    pub company_id: Option<CompanyId>,
    pub conversation_id: ConversationId,
}

/// Partial update of a ticket. Outer `None` leaves a field untouched;
/// for nullable fields `Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TicketPatch {
    pub subject: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub ticket_type: Option<TicketType>,
    pub assignee: Option<Option<MemberId>>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
    pub closed_at: Option<Option<DateTime<Utc>>>,
    pub company_id: Option<Option<CompanyId>>,
}

impl TicketPatch {
    pub fn is_empty(&self) -> bool {
        *self == TicketPatch::default()
    }

    /// Apply the patch in place. Bookkeeping fields (`updated_at`,
    /// `revision`) are the store's job.
    pub fn apply_to(&self, ticket: &mut Ticket) {
        if let Some(subject) = &self.subject {
            ticket.subject = subject.clone();
        }
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(priority) = self.priority {
            ticket.priority = priority;
        }
        if let Some(ticket_type) = self.ticket_type {
            ticket.ticket_type = ticket_type;
        }
        if let Some(assignee) = self.assignee {
            ticket.assignee = assignee;
        }
        if let Some(deadline) = self.deadline {
            ticket.deadline = deadline;
        }
        if let Some(tags) = &self.tags {
            ticket.tags = tags.clone();
        }
        if let Some(closed_at) = self.closed_at {
            ticket.closed_at = closed_at;
        }
        if let Some(company_id) = self.company_id {
            ticket.company_id = company_id;
        }
    }
}

/// Filter for listing tickets
#[derive(Clone, Debug, Default)]
pub struct TicketFilter {
    /// Archived tickets are excluded unless this is set.
    pub include_archived: bool,
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub assignee: Option<MemberId>,
    pub company_id: Option<CompanyId>,
    pub limit: Option<usize>,
}

impl TicketFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_archived(mut self, include: bool) -> Self {
        self.include_archived = include;
        self
    }

    pub fn status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn assignee(mut self, assignee: MemberId) -> Self {
        self.assignee = Some(assignee);
        self
    }

    pub fn company_id(mut self, company_id: CompanyId) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a ticket passes this filter.
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if ticket.is_archived() && !self.include_archived && self.status.is_none() {
            return false;
        }
        if self.status.is_some_and(|s| s != ticket.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != ticket.priority) {
            return false;
        }
        if self.assignee.is_some() && self.assignee != ticket.assignee {
            return false;
        }
        if self.company_id.is_some() && self.company_id != ticket.company_id {
            return false;
        }
        true
    }
}

/// Tickets written after a cursor, as returned by `Store::list_ticket_changes`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketChanges {
    /// Created or updated tickets, ordered by revision (archived included).
    pub tickets: Vec<Ticket>,
    /// Tickets deleted after the cursor.
    pub deleted: Vec<TicketId>,
    /// Pass this back to fetch the next batch.
    pub cursor: u64,
    /// The cursor predates the retained deletion history. `tickets` then
    /// holds every live ticket and the caller should replace its list.
    #[serde(default)]
    pub full_resync: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        let now = Utc::now();
        Ticket {
            id: TicketId::new(),
            organization_id: OrganizationId::new(),
            ticket_number: 1,
            subject: "Printer on fire".into(),
            sender_email: "jo@client.test".into(),
            sender_name: "Jo".into(),
            status: TicketStatus::Open,
            priority: Priority::Medium,
            ticket_type: TicketType::Incident,
            assignee: None,
            deadline: None,
            tags: vec![],
            closed_at: None,
            company_id: None,
            conversation_id: ConversationId("conv-1".into()),
            created_at: now,
            updated_at: now,
            revision: 1,
        }
    }

    #[test]
    fn test_enum_parse_is_case_sensitive() {
        assert_eq!("Open".parse::<TicketStatus>().unwrap(), TicketStatus::Open);
        assert!("open".parse::<TicketStatus>().is_err());
        assert_eq!(
            "Feature Request".parse::<TicketType>().unwrap(),
            TicketType::FeatureRequest
        );
        assert!("FeatureRequest".parse::<TicketType>().is_err());
        assert_eq!("None".parse::<Priority>().unwrap(), Priority::None);
    }

    #[test]
    fn test_parse_enum_error_display() {
        let err = "Blocker".parse::<Priority>().unwrap_err();
        assert_eq!(err.to_string(), "invalid priority: Blocker");
    }

    #[test]
    fn test_feature_request_serde_name() {
        let json = serde_json::to_string(&TicketType::FeatureRequest).unwrap();
        assert_eq!(json, "\"Feature Request\"");
    }

    #[test]
    fn test_patch_clears_nullable_fields() {
        let mut t = ticket();
        t.deadline = Some(Utc::now());
        t.assignee = Some(MemberId::new());

        let patch = TicketPatch {
            deadline: Some(None),
            assignee: Some(None),
            ..Default::default()
        };
        patch.apply_to(&mut t);

        assert!(t.deadline.is_none());
        assert!(t.assignee.is_none());
        assert_eq!(t.priority, Priority::Medium);
    }

    #[test]
    fn test_empty_patch() {
        assert!(TicketPatch::default().is_empty());
        let patch = TicketPatch {
            priority: Some(Priority::High),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_filter_excludes_archived_by_default() {
        let mut t = ticket();
        t.status = TicketStatus::Archived;

        assert!(!TicketFilter::new().matches(&t));
        assert!(TicketFilter::new().include_archived(true).matches(&t));
        assert!(TicketFilter::new().status(TicketStatus::Archived).matches(&t));
    }

    #[test]
    fn test_filter_by_assignee() {
        let member = MemberId::new();
        let mut t = ticket();
        assert!(!TicketFilter::new().assignee(member).matches(&t));
        t.assignee = Some(member);
        assert!(TicketFilter::new().assignee(member).matches(&t));
    }
}
