//! Bounded read cache for tickets.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use quickdesk_storage::{OrganizationId, Ticket, TicketId};

type CacheKey = (OrganizationId, TicketId);

/// LRU cache keyed by `(organization, ticket)`.
///
/// Writers must call [`TicketCache::put`] with the stored record or
/// [`TicketCache::invalidate`] after every change.
pub struct TicketCache {
    entries: Mutex<LruCache<CacheKey, Ticket>>,
}

impl TicketCache {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, org_id: &OrganizationId, ticket_id: &TicketId) -> Option<Ticket> {
        self.entries.lock().get(&(*org_id, *ticket_id)).cloned()
    }

    pub fn put(&self, ticket: &Ticket) {
        self.entries
            .lock()
            .put((ticket.organization_id, ticket.id), ticket.clone());
    }

    pub fn invalidate(&self, org_id: &OrganizationId, ticket_id: &TicketId) {
        self.entries.lock().pop(&(*org_id, *ticket_id));
    }

    /// Drop every entry belonging to `org_id`.
    pub fn invalidate_organization(&self, org_id: &OrganizationId) {
        let mut entries = self.entries.lock();
        let keys: Vec<CacheKey> = entries
            .iter()
            .filter(|((org, _), _)| org == org_id)
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            entries.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quickdesk_storage::{ConversationId, Priority, TicketStatus, TicketType};

    fn ticket(org: OrganizationId, number: u64) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: TicketId::new(),
            organization_id: org,
            ticket_number: number,
            subject: format!("Ticket {}", number),
            sender_email: "jo@client.test".into(),
            sender_name: "Jo".into(),
            status: TicketStatus::Open,
            priority: Priority::Low,
            ticket_type: TicketType::Questions,
            assignee: None,
            deadline: None,
            tags: vec![],
            closed_at: None,
            company_id: None,
            conversation_id: ConversationId(format!("conv-{}", number)),
            created_at: now,
            updated_at: now,
            revision: number,
        }
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = TicketCache::new(2);
        let org = OrganizationId::new();
        let (a, b, c) = (ticket(org, 1), ticket(org, 2), ticket(org, 3));

        cache.put(&a);
        cache.put(&b);
        assert!(cache.get(&org, &a.id).is_some());
        cache.put(&c);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&org, &b.id).is_none());
        assert!(cache.get(&org, &a.id).is_some());
        assert!(cache.get(&org, &c.id).is_some());
    }

    #[test]
    fn test_key_includes_organization() {
        let cache = TicketCache::new(8);
        let t = ticket(OrganizationId::new(), 1);
        cache.put(&t);
        assert!(cache.get(&OrganizationId::new(), &t.id).is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = TicketCache::new(8);
        let org = OrganizationId::new();
        let t = ticket(org, 1);
        cache.put(&t);
        cache.invalidate(&org, &t.id);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_organization_keeps_other_tenants() {
        let cache = TicketCache::new(8);
        let (org_a, org_b) = (OrganizationId::new(), OrganizationId::new());
        let (a1, a2, b1) = (ticket(org_a, 1), ticket(org_a, 2), ticket(org_b, 1));
        cache.put(&a1);
        cache.put(&a2);
        cache.put(&b1);

        cache.invalidate_organization(&org_a);

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&org_b, &b1.id).is_some());
    }

    #[test]
    fn test_zero_capacity_is_bumped() {
        assert_eq!(TicketCache::new(0).capacity(), 1);
    }
}
