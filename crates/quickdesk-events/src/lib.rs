//! Event bus abstraction for quickdesk ticket change notifications.
//!
//! Ticket lists are kept fresh by polling `list_since`; a bus lets push or
//! long-poll transports sit next to it without changing core semantics:
//! - Memory (single process, tokio broadcast channels)
//! - anything cross-process can implement the same trait

use async_trait::async_trait;
use futures::Stream;
use quickdesk_storage::{OrganizationId, TicketId};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// Kind of ticket change
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Updated,
    Unarchived,
    Deleted,
}

/// Event published after a ticket write is durable
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketChangeEvent {
    pub kind: ChangeKind,
    pub ticket_id: TicketId,
    pub ticket_number: u64,
    /// Store revision of the write; feed it to `list_since` to catch up.
    pub revision: u64,
    pub timestamp: i64,
}

/// Error type for event bus operations
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Stream of ticket change events
pub type EventStream = Pin<Box<dyn Stream<Item = TicketChangeEvent> + Send>>;

/// Event bus for publishing and subscribing to ticket changes of an organization.
#[async_trait]
pub trait TicketEventBus: Send + Sync {
    /// Publish a change to all watchers of the organization.
    async fn publish(
        &self,
        org_id: &OrganizationId,
        event: TicketChangeEvent,
    ) -> Result<(), EventBusError>;

    /// Subscribe to changes of an organization.
    ///
    /// Events published before subscribing are not replayed; use the
    /// revision cursor to resync.
    async fn subscribe(&self, org_id: &OrganizationId) -> Result<EventStream, EventBusError>;
}
