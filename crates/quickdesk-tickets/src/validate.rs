//! Field update validation.
//!
//! Turns a raw `(field, value)` pair from a UI or CLI caller into a typed
//! [`FieldValue`] plus the derived updates the workflow must also apply.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quickdesk_storage::{MemberId, OrganizationMember, Priority, Ticket, TicketStatus, TicketType};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// System tag added when a ticket is resolved after its deadline.
pub const RESOLVED_LATE_TAG: &str = "Resolved Late";

/// Reminder markers look like `Reminder: ...`, `reminder-2d`, `REMINDER 1`.
static REMINDER_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^reminder(?:[:\s-]|$)").unwrap());

/// Whether a tag is managed by quickdesk and cannot be set by callers.
pub fn is_reserved_tag(tag: &str) -> bool {
    tag == RESOLVED_LATE_TAG || REMINDER_TAG.is_match(tag)
}

/// Validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} value: {value}")]
    InvalidEnumValue { field: &'static str, value: String },

    #[error("{0} cannot be assigned: only licensed agents can own tickets")]
    AssigneeNotLicensed(String),

    #[error("tag '{0}' is managed by the system")]
    ReservedTag(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Ticket fields that can be changed through the update workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TicketField {
    Status,
    Priority,
    Type,
    Assignee,
    Tags,
    Deadline,
}

impl TicketField {
    pub const ALL: [TicketField; 6] = [
        TicketField::Status,
        TicketField::Priority,
        TicketField::Type,
        TicketField::Assignee,
        TicketField::Tags,
        TicketField::Deadline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketField::Status => "status",
            TicketField::Priority => "priority",
            TicketField::Type => "type",
            TicketField::Assignee => "assignee",
            TicketField::Tags => "tags",
            TicketField::Deadline => "deadline",
        }
    }
}

impl FromStr for TicketField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownField(s.to_string()))
    }
}

impl std::fmt::Display for TicketField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, normalized field value
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Status(TicketStatus),
    Priority(Priority),
    Type(TicketType),
    Assignee(Option<MemberId>),
    Tags(Vec<String>),
    Deadline(Option<DateTime<Utc>>),
}

/// Follow-up change the caller must apply along with the field itself
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DerivedUpdate {
    /// Priority went to `None`: the deadline is cleared for good.
    ClearDeadline,
    /// Priority went to a ranked value: recompute from the org's settings.
    RecomputeDeadline(Priority),
}

/// Output of [`validate_update`]
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedUpdate {
    pub value: FieldValue,
    pub derived: Vec<DerivedUpdate>,
}

impl ValidatedUpdate {
    fn plain(value: FieldValue) -> Self {
        Self {
            value,
            derived: Vec::new(),
        }
    }
}

/// Validate a proposed value for `field` against the current ticket.
///
/// `members` is only consulted for `assignee`; pass the organization's
/// member list there and an empty slice otherwise.
pub fn validate_update(
    field: TicketField,
    proposed: &Value,
    current: &Ticket,
    members: &[OrganizationMember],
) -> Result<ValidatedUpdate, ValidationError> {
    match field {
        TicketField::Status => {
            let status: TicketStatus = parse_enum("status", proposed)?;
            Ok(ValidatedUpdate::plain(FieldValue::Status(status)))
        }
        TicketField::Priority => {
            let priority: Priority = parse_enum("priority", proposed)?;
            let derived = if priority.is_ranked() {
                DerivedUpdate::RecomputeDeadline(priority)
            } else {
                DerivedUpdate::ClearDeadline
            };
            Ok(ValidatedUpdate {
                value: FieldValue::Priority(priority),
                derived: vec![derived],
            })
        }
        TicketField::Type => {
            let ticket_type: TicketType = parse_enum("type", proposed)?;
            Ok(ValidatedUpdate::plain(FieldValue::Type(ticket_type)))
        }
        TicketField::Assignee => {
            let assignee = validate_assignee(proposed, members)?;
            Ok(ValidatedUpdate::plain(FieldValue::Assignee(assignee)))
        }
        TicketField::Tags => {
            let tags = validate_tags(proposed, &current.tags)?;
            Ok(ValidatedUpdate::plain(FieldValue::Tags(tags)))
        }
        TicketField::Deadline => {
            let deadline = match proposed {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(
                    DateTime::parse_from_rfc3339(s)
                        .map_err(|e| ValidationError::InvalidValue {
                            field: "deadline",
                            reason: e.to_string(),
                        })?
                        .with_timezone(&Utc),
                ),
                other => {
                    return Err(ValidationError::InvalidValue {
                        field: "deadline",
                        reason: format!("expected RFC 3339 timestamp or null, got {}", other),
                    })
                }
            };
            Ok(ValidatedUpdate::plain(FieldValue::Deadline(deadline)))
        }
    }
}

fn parse_enum<T>(field: &'static str, proposed: &Value) -> Result<T, ValidationError>
where
    T: FromStr,
{
    let invalid = || ValidationError::InvalidEnumValue {
        field,
        value: match proposed {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    };
    proposed
        .as_str()
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| invalid())
}

fn validate_assignee(
    proposed: &Value,
    members: &[OrganizationMember],
) -> Result<Option<MemberId>, ValidationError> {
    let raw = match proposed {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim(),
        other => {
            return Err(ValidationError::InvalidValue {
                field: "assignee",
                reason: format!("expected member id or null, got {}", other),
            })
        }
    };

    let member = raw
        .parse::<MemberId>()
        .ok()
        .and_then(|id| members.iter().find(|m| m.id == id))
        .ok_or_else(|| ValidationError::AssigneeNotLicensed(raw.to_string()))?;

    if !member.is_licensed_agent() {
        return Err(ValidationError::AssigneeNotLicensed(member.email.clone()));
    }
    Ok(Some(member.id))
}

/// Normalize a full replacement tag set.
///
/// Tags are trimmed, empties dropped and duplicates collapsed keeping the
/// first occurrence. Reserved tags already on the ticket are carried over
/// even when the caller omits them; adding a new one is rejected.
fn validate_tags(proposed: &Value, current: &[String]) -> Result<Vec<String>, ValidationError> {
    let items = proposed
        .as_array()
        .ok_or_else(|| ValidationError::InvalidValue {
            field: "tags",
            reason: "expected an array of strings".into(),
        })?;

    let mut tags: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let tag = item
            .as_str()
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "tags",
                reason: format!("expected string tag, got {}", item),
            })?
            .trim();
        if tag.is_empty() || tags.iter().any(|t| t == tag) {
            continue;
        }
        if is_reserved_tag(tag) && !current.iter().any(|t| t == tag) {
            return Err(ValidationError::ReservedTag(tag.to_string()));
        }
        tags.push(tag.to_string());
    }

    for kept in current.iter().filter(|t| is_reserved_tag(t)) {
        if !tags.contains(kept) {
            tags.push(kept.clone());
        }
    }
    Ok(tags)
}
