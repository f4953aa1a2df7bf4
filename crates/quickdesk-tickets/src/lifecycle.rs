//! Ticket status lifecycle.
//!
//! Every move between statuses is allowed. What this module decides is the
//! set of derived effects a move carries:
//!
//! - entering `Resolved`/`Closed` from an unresolved status stamps
//!   `closed_at = now` (most recent resolution time);
//! - moving between `Resolved` and `Closed` only fills `closed_at` if unset;
//! - entering `Resolved`/`Closed` after the deadline adds `Resolved Late`
//!   once;
//! - reopening keeps both `closed_at` and `Resolved Late`.

use chrono::{DateTime, Utc};
use quickdesk_storage::{Ticket, TicketPatch, TicketStatus};

use crate::validate::RESOLVED_LATE_TAG;

/// Successors shown to users as the usual workflow. Not enforced.
pub fn documented_successors(from: TicketStatus) -> &'static [TicketStatus] {
    use TicketStatus::*;
    match from {
        Open => &[Pending, Resolved, Closed, Archived],
        Pending => &[Open, Resolved, Closed, Archived],
        Resolved => &[Closed, Open, Archived],
        Closed => &[Open, Archived],
        Archived => &[Open],
    }
}

pub fn is_documented_transition(from: TicketStatus, to: TicketStatus) -> bool {
    documented_successors(from).contains(&to)
}

/// Planned status change with its derived effects
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub from: TicketStatus,
    pub to: TicketStatus,
    /// Patch to persist; empty for a same-status move.
    pub patch: TicketPatch,
    /// `Resolved Late` is added by this transition.
    pub marked_late: bool,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.patch.is_empty()
    }
}

/// Plan moving `ticket` to `to` at time `now`.
pub fn plan_transition(ticket: &Ticket, to: TicketStatus, now: DateTime<Utc>) -> Transition {
    let from = ticket.status;
    let mut transition = Transition {
        from,
        to,
        patch: TicketPatch::default(),
        marked_late: false,
    };
    if from == to {
        return transition;
    }

    transition.patch.status = Some(to);

    if to.is_resolution() {
        if !from.is_resolution() || ticket.closed_at.is_none() {
            transition.patch.closed_at = Some(Some(now));
        }

        let overdue = ticket.deadline.is_some_and(|deadline| now > deadline);
        if overdue && !ticket.has_tag(RESOLVED_LATE_TAG) {
            let mut tags = ticket.tags.clone();
            tags.push(RESOLVED_LATE_TAG.to_string());
            transition.patch.tags = Some(tags);
            transition.marked_late = true;
        }
    }

    transition
}
