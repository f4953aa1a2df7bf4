//! Ticket workflow service.
//!
//! Entry point for UI and CLI callers. Each operation reads fresh state from
//! the store, validates, persists, then appends activity. An activity log
//! failure is reported to the caller even though the ticket write is
//! already durable at that point.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quickdesk_activity::{ActivityEntry, ActivityLog, ActivityType, Actor};
use quickdesk_events::{ChangeKind, TicketChangeEvent, TicketEventBus};
use quickdesk_storage::{
    ConversationId, CreateTicketParams, MemberId, OrganizationId, OrganizationMember, Priority,
    Store, StoreError, Ticket, TicketChanges, TicketFilter, TicketId, TicketPatch, TicketStatus,
    TicketType,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::TicketCache;
use crate::deadline::compute_deadline;
use crate::lifecycle::plan_transition;
use crate::validate::{validate_update, DerivedUpdate, FieldValue, TicketField, RESOLVED_LATE_TAG};
use crate::{OperationResult, TicketError};

const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Values used for tickets created from inbound mail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TicketDefaults {
    pub priority: Priority,
    pub ticket_type: TicketType,
}

impl Default for TicketDefaults {
    fn default() -> Self {
        Self {
            priority: Priority::Medium,
            ticket_type: TicketType::Incident,
        }
    }
}

/// A message delivered by email sync
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub subject: String,
    pub sender_email: String,
    pub sender_name: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct IngestOutcome {
    pub ticket: Ticket,
    /// False when the conversation already had a ticket.
    pub created: bool,
}

/// Patch plus the timeline entries describing it.
struct PlannedUpdate {
    patch: TicketPatch,
    entries: Vec<(ActivityType, String)>,
}

pub struct TicketService {
    store: Arc<dyn Store>,
    activity: Arc<dyn ActivityLog>,
    events: Option<Arc<dyn TicketEventBus>>,
    cache: TicketCache,
    defaults: TicketDefaults,
}

impl TicketService {
    pub fn new(store: Arc<dyn Store>, activity: Arc<dyn ActivityLog>) -> Self {
        Self {
            store,
            activity,
            events: None,
            cache: TicketCache::new(DEFAULT_CACHE_CAPACITY),
            defaults: TicketDefaults::default(),
        }
    }

    pub fn with_event_bus(mut self, events: Arc<dyn TicketEventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = TicketCache::new(capacity);
        self
    }

    pub fn with_defaults(mut self, defaults: TicketDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn cache(&self) -> &TicketCache {
        &self.cache
    }

    // ───────────────────────────── Field updates ─────────────────────────────

    /// Update one field on behalf of a member.
    pub async fn update_field(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
        field: &str,
        value: &Value,
        actor_id: &MemberId,
    ) -> OperationResult {
        let result = self
            .update_field_as_member(org_id, ticket_id, field, value, actor_id)
            .await;
        if let Err(e) = &result {
            warn!(
                org_id = %org_id,
                ticket_id = %ticket_id,
                field,
                error = %e,
                "Ticket update failed"
            );
        }
        result.into()
    }

    async fn update_field_as_member(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
        field: &str,
        value: &Value,
        actor_id: &MemberId,
    ) -> Result<Ticket, TicketError> {
        let field: TicketField = field.parse()?;
        let actor = self.resolve_actor(org_id, actor_id).await?;
        self.apply_update(org_id, ticket_id, field, value, &actor)
            .await
    }

    pub async fn apply_update(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
        field: TicketField,
        value: &Value,
        actor: &Actor,
    ) -> Result<Ticket, TicketError> {
        self.apply_update_at(org_id, ticket_id, field, value, actor, Utc::now())
            .await
    }

    /// Like [`TicketService::apply_update`] with an explicit clock reading,
    /// used as the reference time for deadlines and `closed_at`.
    pub async fn apply_update_at(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
        field: TicketField,
        value: &Value,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Ticket, TicketError> {
        let ticket = self.fetch_fresh(org_id, ticket_id).await?;
        let members = match field {
            TicketField::Assignee => self.store.list_members(org_id).await?,
            _ => Vec::new(),
        };

        let update = validate_update(field, value, &ticket, &members)?;
        let planned = self
            .plan_update(org_id, &ticket, update.value, &update.derived, &members, now)
            .await?;

        if planned.patch.is_empty() {
            debug!(
                org_id = %org_id,
                ticket_id = %ticket_id,
                %field,
                "Value unchanged, nothing to update"
            );
            return Ok(ticket);
        }

        let updated = self
            .store
            .update_ticket(org_id, ticket_id, &planned.patch)
            .await
            .map_err(|e| not_found_as(e, ticket_id))?;
        self.cache.put(&updated);

        info!(
            org_id = %org_id,
            ticket_id = %ticket_id,
            ticket_number = updated.ticket_number,
            %field,
            "Ticket updated"
        );

        self.publish(org_id, ChangeKind::Updated, &updated).await;
        self.log_entries(org_id, ticket_id, planned.entries, actor, now)
            .await?;

        Ok(updated)
    }

    async fn plan_update(
        &self,
        org_id: &OrganizationId,
        ticket: &Ticket,
        value: FieldValue,
        derived: &[DerivedUpdate],
        members: &[OrganizationMember],
        now: DateTime<Utc>,
    ) -> Result<PlannedUpdate, TicketError> {
        let mut patch = TicketPatch::default();
        let mut entries = Vec::new();

        match value {
            FieldValue::Status(status) => {
                let transition = plan_transition(ticket, status, now);
                if !transition.is_noop() {
                    entries.push((
                        ActivityType::Status,
                        format!("Status changed from {} to {}", ticket.status, status),
                    ));
                    if transition.marked_late {
                        entries.push((
                            ActivityType::Tags,
                            format!("Added tag '{}': resolved after deadline", RESOLVED_LATE_TAG),
                        ));
                    }
                    patch = transition.patch;
                }
            }
            FieldValue::Priority(priority) => {
                if priority != ticket.priority {
                    patch.priority = Some(priority);
                    entries.push((
                        ActivityType::Priority,
                        format!("Priority changed from {} to {}", ticket.priority, priority),
                    ));
                    for step in derived {
                        let deadline = match step {
                            DerivedUpdate::ClearDeadline => None,
                            DerivedUpdate::RecomputeDeadline(p) => {
                                let settings = self.store.get_deadline_settings(org_id).await?;
                                compute_deadline(*p, settings.as_ref(), now)
                            }
                        };
                        if deadline != ticket.deadline {
                            patch.deadline = Some(deadline);
                            entries.push((ActivityType::Deadline, describe_deadline(deadline)));
                        }
                    }
                }
            }
            FieldValue::Type(ticket_type) => {
                if ticket_type != ticket.ticket_type {
                    patch.ticket_type = Some(ticket_type);
                    entries.push((
                        ActivityType::Type,
                        format!("Type changed from {} to {}", ticket.ticket_type, ticket_type),
                    ));
                }
            }
            FieldValue::Assignee(assignee) => {
                if assignee != ticket.assignee {
                    patch.assignee = Some(assignee);
                    let details = match assignee.and_then(|id| members.iter().find(|m| m.id == id))
                    {
                        Some(member) => format!("Assigned to {}", member.name),
                        None => "Unassigned".to_string(),
                    };
                    entries.push((ActivityType::Assignee, details));
                }
            }
            FieldValue::Tags(tags) => {
                if tags != ticket.tags {
                    entries.push((
                        ActivityType::Tags,
                        format!(
                            "Tags changed from [{}] to [{}]",
                            ticket.tags.join(", "),
                            tags.join(", ")
                        ),
                    ));
                    patch.tags = Some(tags);
                }
            }
            FieldValue::Deadline(deadline) => {
                if deadline != ticket.deadline {
                    patch.deadline = Some(deadline);
                    entries.push((ActivityType::Deadline, describe_deadline(deadline)));
                }
            }
        }

        Ok(PlannedUpdate { patch, entries })
    }

    // ───────────────────────────── Intake ─────────────────────────────

    /// Create a ticket for a new conversation, or return the existing one.
    pub async fn ingest_message(
        &self,
        org_id: &OrganizationId,
        message: InboundMessage,
    ) -> Result<IngestOutcome, TicketError> {
        match self
            .store
            .get_ticket_by_conversation(org_id, &message.conversation_id)
            .await
        {
            Ok(ticket) => {
                debug!(
                    org_id = %org_id,
                    conversation_id = %message.conversation_id,
                    "Conversation already has a ticket"
                );
                return Ok(IngestOutcome {
                    ticket,
                    created: false,
                });
            }
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let company_id = match self
            .store
            .find_contact_by_email(org_id, &message.sender_email)
            .await
        {
            Ok(contact) => contact.company_id(),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let settings = self.store.get_deadline_settings(org_id).await?;
        let params = CreateTicketParams {
            subject: message.subject.clone(),
            sender_email: message.sender_email.clone(),
            sender_name: message.sender_name.clone(),
            priority: self.defaults.priority,
            ticket_type: self.defaults.ticket_type,
            deadline: compute_deadline(
                self.defaults.priority,
                settings.as_ref(),
                message.received_at,
            ),
            company_id,
            conversation_id: message.conversation_id.clone(),
        };

        let ticket = match self.store.create_ticket(org_id, &params).await {
            Ok(ticket) => ticket,
            // Another intake won the race for this conversation.
            Err(StoreError::AlreadyExists) => {
                let ticket = self
                    .store
                    .get_ticket_by_conversation(org_id, &message.conversation_id)
                    .await?;
                return Ok(IngestOutcome {
                    ticket,
                    created: false,
                });
            }
            Err(e) => return Err(e.into()),
        };
        self.cache.put(&ticket);

        info!(
            org_id = %org_id,
            ticket_id = %ticket.id,
            ticket_number = ticket.ticket_number,
            "Ticket created from inbound message"
        );

        self.publish(org_id, ChangeKind::Created, &ticket).await;
        let sender = Actor::new(message.sender_name, message.sender_email);
        self.log_entries(
            org_id,
            &ticket.id,
            vec![(
                ActivityType::Create,
                format!("Ticket #{} created: {}", ticket.ticket_number, ticket.subject),
            )],
            &sender,
            message.received_at,
        )
        .await?;

        Ok(IngestOutcome {
            ticket,
            created: true,
        })
    }

    // ───────────────────────────── Archive ─────────────────────────────

    /// Unarchive a batch of tickets; all of them or none.
    pub async fn unarchive_tickets(
        &self,
        org_id: &OrganizationId,
        ticket_ids: &[TicketId],
        actor: &Actor,
    ) -> OperationResult {
        let result = self.unarchive(org_id, ticket_ids, actor).await;
        if let Err(e) = &result {
            warn!(org_id = %org_id, error = %e, "Unarchive failed");
        }
        result.into()
    }

    /// Tickets that are not archived are left as they are and not returned.
    pub async fn unarchive(
        &self,
        org_id: &OrganizationId,
        ticket_ids: &[TicketId],
        actor: &Actor,
    ) -> Result<Vec<Ticket>, TicketError> {
        let mut requested: Vec<TicketId> = Vec::with_capacity(ticket_ids.len());
        for id in ticket_ids {
            if !requested.contains(id) {
                requested.push(*id);
            }
        }

        let mut missing = Vec::new();
        let mut archived = Vec::new();
        for id in &requested {
            match self.store.get_ticket(org_id, id).await {
                Ok(ticket) if ticket.is_archived() => archived.push(ticket),
                Ok(_) => {}
                Err(StoreError::NotFound) => missing.push(*id),
                Err(e) => return Err(e.into()),
            }
        }
        match missing.as_slice() {
            [] => {}
            [one] => return Err(TicketError::NotFound(*one)),
            _ => return Err(TicketError::NotFoundMany(missing)),
        }
        if archived.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let updates: Vec<(TicketId, TicketPatch)> = archived
            .iter()
            .map(|t| (t.id, plan_transition(t, TicketStatus::Open, now).patch))
            .collect();

        let updated = self
            .store
            .update_tickets(org_id, &updates)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => TicketError::State(
                    "unarchive aborted: a ticket was removed while the batch was applied".into(),
                ),
                other => other.into(),
            })?;

        info!(org_id = %org_id, count = updated.len(), "Tickets unarchived");

        for ticket in &updated {
            self.cache.put(ticket);
            self.publish(org_id, ChangeKind::Unarchived, ticket).await;
        }
        for ticket in &updated {
            self.log_entries(
                org_id,
                &ticket.id,
                vec![(
                    ActivityType::Status,
                    format!(
                        "Status changed from {} to {}",
                        TicketStatus::Archived,
                        TicketStatus::Open
                    ),
                )],
                actor,
                now,
            )
            .await?;
        }

        Ok(updated)
    }

    // ───────────────────────────── Reads ─────────────────────────────

    pub async fn get_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<Ticket, TicketError> {
        if let Some(ticket) = self.cache.get(org_id, ticket_id) {
            return Ok(ticket);
        }
        let ticket = self.fetch_fresh(org_id, ticket_id).await?;
        self.cache.put(&ticket);
        Ok(ticket)
    }

    pub async fn list_tickets(
        &self,
        org_id: &OrganizationId,
        filter: &TicketFilter,
    ) -> Result<Vec<Ticket>, TicketError> {
        Ok(self.store.list_tickets(org_id, filter).await?)
    }

    /// Everything written after `cursor`, for polling clients.
    pub async fn list_since(
        &self,
        org_id: &OrganizationId,
        cursor: u64,
    ) -> Result<TicketChanges, TicketError> {
        let changes = self.store.list_ticket_changes(org_id, cursor).await?;
        if changes.full_resync {
            self.cache.invalidate_organization(org_id);
        }
        for ticket in &changes.tickets {
            self.cache.put(ticket);
        }
        for id in &changes.deleted {
            self.cache.invalidate(org_id, id);
        }
        Ok(changes)
    }

    pub async fn activity(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<Vec<ActivityEntry>, TicketError> {
        Ok(self.activity.list_for_ticket(org_id, ticket_id).await?)
    }

    // ───────────────────────────── Delete ─────────────────────────────

    /// Delete a ticket. Its number stays reserved.
    pub async fn delete_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<(), TicketError> {
        let ticket = self.fetch_fresh(org_id, ticket_id).await?;
        self.store
            .delete_ticket(org_id, ticket_id)
            .await
            .map_err(|e| not_found_as(e, ticket_id))?;
        self.cache.invalidate(org_id, ticket_id);

        info!(
            org_id = %org_id,
            ticket_id = %ticket_id,
            ticket_number = ticket.ticket_number,
            "Ticket deleted"
        );
        self.publish(org_id, ChangeKind::Deleted, &ticket).await;
        Ok(())
    }

    // ───────────────────────────── Helpers ─────────────────────────────

    async fn fetch_fresh(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<Ticket, TicketError> {
        self.store
            .get_ticket(org_id, ticket_id)
            .await
            .map_err(|e| not_found_as(e, ticket_id))
    }

    async fn resolve_actor(
        &self,
        org_id: &OrganizationId,
        actor_id: &MemberId,
    ) -> Result<Actor, TicketError> {
        match self.store.get_member(org_id, actor_id).await {
            Ok(member) => Ok(Actor::new(member.name, member.email)),
            Err(StoreError::NotFound) => Err(TicketError::MemberNotFound(actor_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn log_entries(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
        entries: Vec<(ActivityType, String)>,
        actor: &Actor,
        date: DateTime<Utc>,
    ) -> Result<(), TicketError> {
        for (activity_type, details) in entries {
            let entry = ActivityEntry::builder(org_id, ticket_id, activity_type)
                .details(details)
                .actor(actor)
                .date(date)
                .build();
            if let Err(e) = self.activity.append(entry).await {
                warn!(
                    org_id = %org_id,
                    ticket_id = %ticket_id,
                    %activity_type,
                    error = %e,
                    "Activity log append failed after ticket write"
                );
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn publish(&self, org_id: &OrganizationId, kind: ChangeKind, ticket: &Ticket) {
        let Some(events) = &self.events else {
            return;
        };
        let event = TicketChangeEvent {
            kind,
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number,
            revision: ticket.revision,
            timestamp: Utc::now().timestamp(),
        };
        if let Err(e) = events.publish(org_id, event).await {
            warn!(org_id = %org_id, ticket_id = %ticket.id, error = %e, "Failed to publish ticket event");
        }
    }
}

fn not_found_as(e: StoreError, ticket_id: &TicketId) -> TicketError {
    match e {
        StoreError::NotFound => TicketError::NotFound(*ticket_id),
        other => other.into(),
    }
}

fn describe_deadline(deadline: Option<DateTime<Utc>>) -> String {
    match deadline {
        Some(at) => format!("Deadline set to {}", at.to_rfc3339()),
        None => "Deadline cleared".to_string(),
    }
}
