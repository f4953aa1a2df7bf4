//! In-process ticket event bus.
//!
//! Each organization with live watchers gets its own broadcast channel; a
//! separate feed carries every organization's events, tagged, for
//! process-wide consumers such as the admin CLI's change log. Nothing
//! crosses process boundaries.

use async_trait::async_trait;
use dashmap::DashMap;
use quickdesk_events::{EventBusError, EventStream, TicketChangeEvent, TicketEventBus};
use quickdesk_storage::OrganizationId;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const CHANNEL_CAPACITY: usize = 256;

/// A change together with the organization it belongs to.
pub type TaggedChange = (OrganizationId, TicketChangeEvent);

pub struct MemoryEventBus {
    capacity: usize,
    watchers: DashMap<OrganizationId, broadcast::Sender<TicketChangeEvent>>,
    feed: broadcast::Sender<TaggedChange>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Buffer size per channel; slower receivers skip ahead past dropped events.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            watchers: DashMap::new(),
            feed: broadcast::channel(capacity).0,
        }
    }

    /// Every organization's changes from now on.
    pub fn subscribe_all(&self) -> broadcast::Receiver<TaggedChange> {
        self.feed.subscribe()
    }

    /// Organizations that currently have a channel.
    pub fn watched_organizations(&self) -> usize {
        self.watchers.len()
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketEventBus for MemoryEventBus {
    async fn publish(
        &self,
        org_id: &OrganizationId,
        event: TicketChangeEvent,
    ) -> Result<(), EventBusError> {
        let _ = self.feed.send((*org_id, event.clone()));

        let delivered = match self.watchers.get(org_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => return Ok(()),
        };
        if !delivered {
            // every watcher hung up
            self.watchers
                .remove_if(org_id, |_, tx| tx.receiver_count() == 0);
        }
        Ok(())
    }

    async fn subscribe(&self, org_id: &OrganizationId) -> Result<EventStream, EventBusError> {
        let rx = self
            .watchers
            .entry(*org_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        // Lagged receivers drop events; they resync from their revision cursor.
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());
        Ok(Box::pin(stream))
    }
}
