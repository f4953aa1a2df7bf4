//! quickdesk-tickets - ticket lifecycle and SLA deadline engine
//!
//! Control flow for a field update:
//! 1. [`validate_update`] checks the proposed value and declares derived updates
//! 2. [`compute_deadline`] recomputes the deadline when priority changes
//! 3. [`plan_transition`] adds status side effects (`closed_at`, `Resolved Late`)
//! 4. the store persists the patch
//! 5. the activity log records what changed
//!
//! [`TicketService`] drives that flow and is the entry point for callers.

use quickdesk_activity::ActivityLogError;
use quickdesk_storage::{StoreError, TicketId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod cache;
mod deadline;
mod lifecycle;
mod optimistic;
mod refresh;
mod validate;
mod workflow;

pub use cache::TicketCache;
pub use deadline::compute_deadline;
pub use lifecycle::{documented_successors, is_documented_transition, plan_transition, Transition};
pub use optimistic::{ChangeToken, OptimisticError, OptimisticTicket};
pub use refresh::RefreshPolicy;
pub use validate::{
    is_reserved_tag, validate_update, DerivedUpdate, FieldValue, TicketField, ValidatedUpdate,
    ValidationError, RESOLVED_LATE_TAG,
};
pub use workflow::{InboundMessage, IngestOutcome, TicketDefaults, TicketService};

/// Ticket workflow errors
#[derive(Debug, Error)]
pub enum TicketError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("ticket {0} not found")]
    NotFound(TicketId),

    #[error("tickets not found: {}", join_ids(.0))]
    NotFoundMany(Vec<TicketId>),

    #[error("member {0} not found")]
    MemberNotFound(String),

    #[error("{0}")]
    State(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("ticket saved but activity log failed: {0}")]
    ActivityLog(#[from] ActivityLogError),
}

fn join_ids(ids: &[TicketId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result shape returned across the workflow boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for OperationResult {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}
