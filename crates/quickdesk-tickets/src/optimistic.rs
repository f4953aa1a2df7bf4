//! Client-side optimistic edits as an explicit two-phase change.
//!
//! A client proposes a patch locally and shows it at once. When the server
//! answers, the change is either confirmed with the authoritative record or
//! reverted. The store always wins.

use std::collections::BTreeMap;

use quickdesk_storage::{Ticket, TicketPatch};
use thiserror::Error;

/// Handle to one proposed change
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeToken(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimisticError {
    #[error("unknown change token {0:?}")]
    UnknownChange(ChangeToken),
    #[error("server returned a different ticket")]
    TicketMismatch,
}

/// A ticket as seen by a client with pending local edits.
#[derive(Clone, Debug)]
pub struct OptimisticTicket {
    confirmed: Ticket,
    pending: BTreeMap<ChangeToken, TicketPatch>,
    next_token: u64,
}

impl OptimisticTicket {
    pub fn new(confirmed: Ticket) -> Self {
        Self {
            confirmed,
            pending: BTreeMap::new(),
            next_token: 0,
        }
    }

    /// Last server-confirmed state.
    pub fn confirmed(&self) -> &Ticket {
        &self.confirmed
    }

    /// Confirmed state with all pending changes applied in proposal order.
    pub fn view(&self) -> Ticket {
        let mut ticket = self.confirmed.clone();
        for patch in self.pending.values() {
            patch.apply_to(&mut ticket);
        }
        ticket
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Apply a change locally ahead of the server round trip.
    pub fn propose_change(&mut self, patch: TicketPatch) -> ChangeToken {
        let token = ChangeToken(self.next_token);
        self.next_token += 1;
        self.pending.insert(token, patch);
        token
    }

    /// The server accepted the change and returned its stored record.
    ///
    /// A response older than the current confirmed revision does not roll
    /// the base back.
    pub fn confirm_change(
        &mut self,
        token: ChangeToken,
        server: Ticket,
    ) -> Result<(), OptimisticError> {
        if server.id != self.confirmed.id {
            return Err(OptimisticError::TicketMismatch);
        }
        self.pending
            .remove(&token)
            .ok_or(OptimisticError::UnknownChange(token))?;
        if server.revision >= self.confirmed.revision {
            self.confirmed = server;
        }
        Ok(())
    }

    /// The server rejected the change; drop it from the local view.
    pub fn revert_change(&mut self, token: ChangeToken) -> Result<TicketPatch, OptimisticError> {
        self.pending
            .remove(&token)
            .ok_or(OptimisticError::UnknownChange(token))
    }

    /// Replace the confirmed base after a refresh, keeping pending edits.
    pub fn refresh(&mut self, server: Ticket) {
        if server.id == self.confirmed.id && server.revision >= self.confirmed.revision {
            self.confirmed = server;
        }
    }
}
