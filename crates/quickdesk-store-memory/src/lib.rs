//! In-memory implementation of the quickdesk `Store` and `ActivityLog`.
//!
//! All state lives behind a single `RwLock`, so every method, including
//! the batch ones, is atomic. The whole state can be written to and read
//! back from a JSON snapshot, which is how the CLI persists between runs.

use async_trait::async_trait;
use chrono::Utc;
use quickdesk_activity::{
    ActivityEntry, ActivityFilter, ActivityLog, ActivityLogError, NewActivity,
};
use quickdesk_storage::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Tombstone {
    ticket_id: TicketId,
    revision: u64,
}

/// Deletion markers kept per organization. Older ones are dropped and a
/// cursor from before them gets a full resync instead of a delta.
const TOMBSTONE_RETENTION: usize = 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct OrgState {
    organization: Organization,
    deadline_settings: Option<DeadlineSettings>,
    /// Highest ticket number ever handed out; never decremented.
    last_ticket_number: u64,
    /// Organization-wide write counter.
    revision: u64,
    tickets: BTreeMap<TicketId, Ticket>,
    tombstones: Vec<Tombstone>,
    /// Revision of the newest dropped tombstone.
    #[serde(default)]
    pruned_through: u64,
    members: Vec<OrganizationMember>,
    employees: Vec<Employee>,
    companies: Vec<Company>,
    subscription: Option<Subscription>,
    payments: Vec<Payment>,
    activity: Vec<ActivityEntry>,
}

impl OrgState {
    fn new(organization: Organization) -> Self {
        Self {
            organization,
            deadline_settings: None,
            last_ticket_number: 0,
            revision: 0,
            tickets: BTreeMap::new(),
            tombstones: Vec::new(),
            pruned_through: 0,
            members: Vec::new(),
            employees: Vec::new(),
            companies: Vec::new(),
            subscription: None,
            payments: Vec::new(),
            activity: Vec::new(),
        }
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn member_mut(&mut self, member_id: &MemberId) -> Result<&mut OrganizationMember, StoreError> {
        self.members
            .iter_mut()
            .find(|m| m.id == *member_id)
            .ok_or(StoreError::NotFound)
    }

    fn unlicensed_agents(&self) -> u32 {
        self.members
            .iter()
            .filter(|m| m.is_unlicensed_agent())
            .count() as u32
    }

    fn apply_subscription_update(
        &mut self,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription, StoreError> {
        let unlicensed = self.unlicensed_agents();
        let stored = self.subscription.as_mut().ok_or(StoreError::NotFound)?;
        if update.expect_status.is_some_and(|s| s != stored.status) {
            return Err(StoreError::Conflict);
        }
        update.apply_to(stored, unlicensed);
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    fn payment_mut(&mut self, payment_id: &PaymentId) -> Result<&mut Payment, StoreError> {
        self.payments
            .iter_mut()
            .find(|p| p.id == *payment_id)
            .ok_or(StoreError::NotFound)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryState {
    organizations: HashMap<OrganizationId, OrgState>,
    /// Global activity sequence; strictly increasing across all appends.
    activity_sequence: u64,
}

impl MemoryState {
    fn org(&self, org_id: &OrganizationId) -> Result<&OrgState, StoreError> {
        self.organizations.get(org_id).ok_or(StoreError::NotFound)
    }

    fn org_mut(&mut self, org_id: &OrganizationId) -> Result<&mut OrgState, StoreError> {
        self.organizations
            .get_mut(org_id)
            .ok_or(StoreError::NotFound)
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`MemoryStore::save_snapshot`]. A missing
    /// file yields an empty store.
    pub fn open_snapshot(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot found, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(StoreError::Backend(format!("read snapshot: {}", e))),
        };
        let state: MemoryState = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Backend(format!("parse snapshot: {}", e)))?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Write the whole state as JSON.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)
                .map_err(|e| StoreError::Backend(format!("encode snapshot: {}", e)))?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("create snapshot dir: {}", e)))?;
        }
        std::fs::write(path, json)
            .map_err(|e| StoreError::Backend(format!("write snapshot: {}", e)))
    }

    /// List all organizations (admin tooling).
    pub async fn list_organizations(&self) -> Vec<Organization> {
        let state = self.state.read().await;
        let mut orgs: Vec<_> = state
            .organizations
            .values()
            .map(|o| o.organization.clone())
            .collect();
        orgs.sort_by_key(|o| o.created_at);
        orgs
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_organization(
        &self,
        params: &CreateOrganizationParams,
    ) -> Result<Organization, StoreError> {
        let organization = Organization {
            id: OrganizationId::new(),
            name: params.name.clone(),
            owner_email: params.owner_email.clone(),
            created_at: Utc::now(),
        };
        let mut state = self.state.write().await;
        state
            .organizations
            .insert(organization.id, OrgState::new(organization.clone()));
        Ok(organization)
    }

    async fn get_organization(&self, org_id: &OrganizationId) -> Result<Organization, StoreError> {
        let state = self.state.read().await;
        Ok(state.org(org_id)?.organization.clone())
    }

    async fn get_deadline_settings(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Option<DeadlineSettings>, StoreError> {
        let state = self.state.read().await;
        Ok(state.org(org_id)?.deadline_settings)
    }

    async fn set_deadline_settings(
        &self,
        org_id: &OrganizationId,
        settings: &DeadlineSettings,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.org_mut(org_id)?.deadline_settings = Some(*settings);
        Ok(())
    }

    async fn create_ticket(
        &self,
        org_id: &OrganizationId,
        params: &CreateTicketParams,
    ) -> Result<Ticket, StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;

        if org
            .tickets
            .values()
            .any(|t| t.conversation_id == params.conversation_id)
        {
            return Err(StoreError::AlreadyExists);
        }

        org.last_ticket_number += 1;
        let ticket_number = org.last_ticket_number;
        let revision = org.next_revision();
        let now = Utc::now();
        let ticket = Ticket {
            id: TicketId::new(),
            organization_id: *org_id,
            ticket_number,
            subject: params.subject.clone(),
            sender_email: params.sender_email.clone(),
            sender_name: params.sender_name.clone(),
            status: TicketStatus::Open,
            priority: params.priority,
            ticket_type: params.ticket_type,
            assignee: None,
            deadline: params.deadline,
            tags: Vec::new(),
            closed_at: None,
            company_id: params.company_id,
            conversation_id: params.conversation_id.clone(),
            created_at: now,
            updated_at: now,
            revision,
        };
        org.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<Ticket, StoreError> {
        let state = self.state.read().await;
        state
            .org(org_id)?
            .tickets
            .get(ticket_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_ticket_by_conversation(
        &self,
        org_id: &OrganizationId,
        conversation_id: &ConversationId,
    ) -> Result<Ticket, StoreError> {
        let state = self.state.read().await;
        state
            .org(org_id)?
            .tickets
            .values()
            .find(|t| t.conversation_id == *conversation_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
        patch: &TicketPatch,
    ) -> Result<Ticket, StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;
        if !org.tickets.contains_key(ticket_id) {
            return Err(StoreError::NotFound);
        }
        let revision = org.next_revision();
        let ticket = org.tickets.get_mut(ticket_id).ok_or(StoreError::NotFound)?;
        patch.apply_to(ticket);
        ticket.updated_at = Utc::now();
        ticket.revision = revision;
        Ok(ticket.clone())
    }

    async fn update_tickets(
        &self,
        org_id: &OrganizationId,
        updates: &[(TicketId, TicketPatch)],
    ) -> Result<Vec<Ticket>, StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;

        // Check everything before touching anything.
        if updates.iter().any(|(id, _)| !org.tickets.contains_key(id)) {
            return Err(StoreError::NotFound);
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(updates.len());
        for (ticket_id, patch) in updates {
            let revision = org.next_revision();
            let ticket = org.tickets.get_mut(ticket_id).ok_or(StoreError::NotFound)?;
            patch.apply_to(ticket);
            ticket.updated_at = now;
            ticket.revision = revision;
            updated.push(ticket.clone());
        }
        Ok(updated)
    }

    async fn list_tickets(
        &self,
        org_id: &OrganizationId,
        filter: &TicketFilter,
    ) -> Result<Vec<Ticket>, StoreError> {
        let state = self.state.read().await;
        let mut tickets: Vec<Ticket> = state
            .org(org_id)?
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.ticket_number);
        if let Some(limit) = filter.limit {
            tickets.truncate(limit);
        }
        Ok(tickets)
    }

    async fn list_ticket_changes(
        &self,
        org_id: &OrganizationId,
        cursor: u64,
    ) -> Result<TicketChanges, StoreError> {
        let state = self.state.read().await;
        let org = state.org(org_id)?;
        let full_resync = cursor < org.pruned_through;
        let since = if full_resync { 0 } else { cursor };

        let mut tickets: Vec<Ticket> = org
            .tickets
            .values()
            .filter(|t| t.revision > since)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.revision);
        let deleted = if full_resync {
            Vec::new()
        } else {
            org.tombstones
                .iter()
                .filter(|t| t.revision > cursor)
                .map(|t| t.ticket_id)
                .collect()
        };
        Ok(TicketChanges {
            tickets,
            deleted,
            cursor: org.revision.max(cursor),
            full_resync,
        })
    }

    async fn delete_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;
        if org.tickets.remove(ticket_id).is_none() {
            return Err(StoreError::NotFound);
        }
        let revision = org.next_revision();
        org.tombstones.push(Tombstone {
            ticket_id: *ticket_id,
            revision,
        });
        if org.tombstones.len() > TOMBSTONE_RETENTION {
            let excess = org.tombstones.len() - TOMBSTONE_RETENTION;
            let dropped = org.tombstones.drain(..excess).last();
            if let Some(last) = dropped {
                org.pruned_through = last.revision;
            }
        }
        Ok(())
    }

    async fn create_member(
        &self,
        org_id: &OrganizationId,
        params: &CreateMemberParams,
    ) -> Result<OrganizationMember, StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;
        if org
            .members
            .iter()
            .any(|m| m.email.eq_ignore_ascii_case(&params.email))
        {
            return Err(StoreError::AlreadyExists);
        }
        let now = Utc::now();
        let member = OrganizationMember {
            id: MemberId::new(),
            organization_id: *org_id,
            name: params.name.clone(),
            email: params.email.clone(),
            is_client: params.is_client,
            has_license: false,
            status: MemberStatus::Uninvited,
            company_id: params.company_id,
            created_at: now,
            updated_at: now,
        };
        org.members.push(member.clone());
        Ok(member)
    }

    async fn get_member(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<OrganizationMember, StoreError> {
        let state = self.state.read().await;
        state
            .org(org_id)?
            .members
            .iter()
            .find(|m| m.id == *member_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_members(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Vec<OrganizationMember>, StoreError> {
        let state = self.state.read().await;
        Ok(state.org(org_id)?.members.clone())
    }

    async fn set_member_status(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
        status: MemberStatus,
    ) -> Result<OrganizationMember, StoreError> {
        let mut state = self.state.write().await;
        let member = state.org_mut(org_id)?.member_mut(member_id)?;
        member.status = status;
        member.updated_at = Utc::now();
        Ok(member.clone())
    }

    async fn set_member_licenses(
        &self,
        org_id: &OrganizationId,
        member_ids: &[MemberId],
        has_license: bool,
    ) -> Result<Vec<OrganizationMember>, StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;

        if member_ids
            .iter()
            .any(|id| !org.members.iter().any(|m| m.id == *id))
        {
            return Err(StoreError::NotFound);
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            let member = org.member_mut(member_id)?;
            member.has_license = has_license;
            member.updated_at = now;
            updated.push(member.clone());
        }
        Ok(updated)
    }

    async fn count_licensed_agents(&self, org_id: &OrganizationId) -> Result<u32, StoreError> {
        let state = self.state.read().await;
        let count = state
            .org(org_id)?
            .members
            .iter()
            .filter(|m| m.is_licensed_agent())
            .count();
        Ok(count as u32)
    }

    async fn count_unlicensed_agents(&self, org_id: &OrganizationId) -> Result<u32, StoreError> {
        let state = self.state.read().await;
        let count = state
            .org(org_id)?
            .members
            .iter()
            .filter(|m| m.is_unlicensed_agent())
            .count();
        Ok(count as u32)
    }

    async fn create_company(
        &self,
        org_id: &OrganizationId,
        name: &str,
    ) -> Result<Company, StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;
        if org.companies.iter().any(|c| c.name == name) {
            return Err(StoreError::AlreadyExists);
        }
        let company = Company {
            id: CompanyId::new(),
            organization_id: *org_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        org.companies.push(company.clone());
        Ok(company)
    }

    async fn get_company(
        &self,
        org_id: &OrganizationId,
        company_id: &CompanyId,
    ) -> Result<Company, StoreError> {
        let state = self.state.read().await;
        state
            .org(org_id)?
            .companies
            .iter()
            .find(|c| c.id == *company_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_employee(
        &self,
        org_id: &OrganizationId,
        params: &CreateEmployeeParams,
    ) -> Result<Employee, StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;
        if !org.companies.iter().any(|c| c.id == params.company_id) {
            return Err(StoreError::NotFound);
        }
        if org
            .employees
            .iter()
            .any(|e| e.email.eq_ignore_ascii_case(&params.email))
        {
            return Err(StoreError::AlreadyExists);
        }
        let employee = Employee {
            id: EmployeeId::new(),
            organization_id: *org_id,
            company_id: params.company_id,
            name: params.name.clone(),
            email: params.email.clone(),
            created_at: Utc::now(),
        };
        org.employees.push(employee.clone());
        Ok(employee)
    }

    async fn find_contact_by_email(
        &self,
        org_id: &OrganizationId,
        email: &str,
    ) -> Result<Contact, StoreError> {
        let state = self.state.read().await;
        let org = state.org(org_id)?;
        if let Some(member) = org
            .members
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(email))
        {
            return Ok(Contact::Member(member.clone()));
        }
        org.employees
            .iter()
            .find(|e| e.email.eq_ignore_ascii_case(email))
            .map(|e| Contact::Employee(e.clone()))
            .ok_or(StoreError::NotFound)
    }

    async fn create_subscription(
        &self,
        org_id: &OrganizationId,
        params: &CreateSubscriptionParams,
    ) -> Result<Subscription, StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;
        if org.subscription.is_some() {
            return Err(StoreError::AlreadyExists);
        }
        let now = Utc::now();
        let agent_count = org.unlicensed_agents();
        let subscription = Subscription {
            id: SubscriptionId::new(),
            organization_id: *org_id,
            status: params.status,
            agent_count,
            agent_slots: params.agent_slots,
            price_per_agent: params.price_per_agent,
            total_amount: i64::from(params.agent_slots) * params.price_per_agent,
            trial_ends_at: params.trial_ends_at,
            current_period_start: None,
            current_period_end: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };
        org.subscription = Some(subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(&self, org_id: &OrganizationId) -> Result<Subscription, StoreError> {
        let state = self.state.read().await;
        state
            .org(org_id)?
            .subscription
            .clone()
            .ok_or(StoreError::NotFound)
    }

    async fn update_subscription(
        &self,
        org_id: &OrganizationId,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription, StoreError> {
        let mut state = self.state.write().await;
        state.org_mut(org_id)?.apply_subscription_update(update)
    }

    async fn create_payment(
        &self,
        org_id: &OrganizationId,
        params: &CreatePaymentParams,
    ) -> Result<Payment, StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;
        let now = Utc::now();
        let payment = Payment {
            id: PaymentId::new(),
            organization_id: *org_id,
            amount: params.amount,
            currency: params.currency.clone(),
            status: PaymentStatus::Pending,
            agent_count: params.agent_count,
            metadata: params.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        org.payments.push(payment.clone());
        Ok(payment)
    }

    async fn get_payment(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
    ) -> Result<Payment, StoreError> {
        let state = self.state.read().await;
        state
            .org(org_id)?
            .payments
            .iter()
            .find(|p| p.id == *payment_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_payments(&self, org_id: &OrganizationId) -> Result<Vec<Payment>, StoreError> {
        let state = self.state.read().await;
        Ok(state.org(org_id)?.payments.clone())
    }

    async fn transition_payment(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<Payment, StoreError> {
        let mut state = self.state.write().await;
        let payment = state.org_mut(org_id)?.payment_mut(payment_id)?;
        if payment.status != from {
            return Err(StoreError::Conflict);
        }
        payment.status = to;
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn confirm_payment(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
        update: &SubscriptionUpdate,
    ) -> Result<(Payment, Subscription), StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;

        let status = org
            .payments
            .iter()
            .find(|p| p.id == *payment_id)
            .map(|p| p.status)
            .ok_or(StoreError::NotFound)?;
        if status != PaymentStatus::Pending {
            return Err(StoreError::Conflict);
        }

        // Subscription first: it is the half that can still fail.
        let subscription = org.apply_subscription_update(update)?;
        let payment = org.payment_mut(payment_id)?;
        payment.status = PaymentStatus::Paid;
        payment.updated_at = subscription.updated_at;
        Ok((payment.clone(), subscription))
    }

    async fn delete_payment(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let org = state.org_mut(org_id)?;
        let before = org.payments.len();
        org.payments.retain(|p| p.id != *payment_id);
        if org.payments.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn activity_error(e: StoreError) -> ActivityLogError {
    ActivityLogError::Backend(e.to_string())
}

#[async_trait]
impl ActivityLog for MemoryStore {
    async fn append(&self, activity: NewActivity) -> Result<ActivityEntry, ActivityLogError> {
        let mut state = self.state.write().await;
        state.activity_sequence += 1;
        let sequence = state.activity_sequence;
        let org = state
            .org_mut(&activity.organization_id)
            .map_err(activity_error)?;
        let entry = activity.into_entry(sequence);
        org.activity.push(entry.clone());
        Ok(entry)
    }

    async fn list_for_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<Vec<ActivityEntry>, ActivityLogError> {
        self.query(org_id, ActivityFilter::new().ticket_id(*ticket_id))
            .await
    }

    async fn query(
        &self,
        org_id: &OrganizationId,
        filter: ActivityFilter,
    ) -> Result<Vec<ActivityEntry>, ActivityLogError> {
        let state = self.state.read().await;
        let org = state.org(org_id).map_err(activity_error)?;
        // Entries are pushed in sequence order, so no sort is needed.
        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
        Ok(org
            .activity
            .iter()
            .filter(|e| filter.matches(e))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(
        &self,
        org_id: &OrganizationId,
        filter: ActivityFilter,
    ) -> Result<u64, ActivityLogError> {
        let state = self.state.read().await;
        let org = state.org(org_id).map_err(activity_error)?;
        Ok(org.activity.iter().filter(|e| filter.matches(e)).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickdesk_activity::{ActivityType, Actor};

    async fn store_with_org() -> (MemoryStore, OrganizationId) {
        let store = MemoryStore::new();
        let org = store
            .create_organization(&CreateOrganizationParams {
                name: "Acme Support".into(),
                owner_email: "owner@acme.test".into(),
            })
            .await
            .unwrap();
        (store, org.id)
    }

    fn ticket_params(conversation: &str) -> CreateTicketParams {
        CreateTicketParams {
            subject: format!("Subject {}", conversation),
            sender_email: "jo@client.test".into(),
            sender_name: "Jo".into(),
            priority: Priority::Medium,
            ticket_type: TicketType::Incident,
            deadline: None,
            company_id: None,
            conversation_id: ConversationId(conversation.into()),
        }
    }

    fn member_params(email: &str, is_client: bool) -> CreateMemberParams {
        CreateMemberParams {
            name: email.split('@').next().unwrap_or_default().to_string(),
            email: email.into(),
            is_client,
            company_id: None,
        }
    }

    #[tokio::test]
    async fn ticket_numbers_are_never_reused() {
        let (store, org) = store_with_org().await;

        let first = store.create_ticket(&org, &ticket_params("c1")).await.unwrap();
        let second = store.create_ticket(&org, &ticket_params("c2")).await.unwrap();
        store.delete_ticket(&org, &second.id).await.unwrap();
        let third = store.create_ticket(&org, &ticket_params("c3")).await.unwrap();

        assert_eq!(first.ticket_number, 1);
        assert_eq!(second.ticket_number, 2);
        assert_eq!(third.ticket_number, 3);
    }

    #[tokio::test]
    async fn ticket_numbers_are_per_organization() {
        let (store, org_a) = store_with_org().await;
        let org_b = store
            .create_organization(&CreateOrganizationParams {
                name: "Other".into(),
                owner_email: "o@other.test".into(),
            })
            .await
            .unwrap()
            .id;

        store.create_ticket(&org_a, &ticket_params("a1")).await.unwrap();
        let b1 = store.create_ticket(&org_b, &ticket_params("b1")).await.unwrap();
        assert_eq!(b1.ticket_number, 1);
    }

    #[tokio::test]
    async fn tickets_are_scoped_by_organization() {
        let (store, org_a) = store_with_org().await;
        let org_b = store
            .create_organization(&CreateOrganizationParams {
                name: "Other".into(),
                owner_email: "o@other.test".into(),
            })
            .await
            .unwrap()
            .id;

        let ticket = store.create_ticket(&org_a, &ticket_params("a1")).await.unwrap();
        assert!(matches!(
            store.get_ticket(&org_b, &ticket.id).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_conversation_is_rejected() {
        let (store, org) = store_with_org().await;
        store.create_ticket(&org, &ticket_params("c1")).await.unwrap();
        assert!(matches!(
            store.create_ticket(&org, &ticket_params("c1")).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn batch_update_is_all_or_nothing() {
        let (store, org) = store_with_org().await;
        let ticket = store.create_ticket(&org, &ticket_params("c1")).await.unwrap();
        let patch = TicketPatch {
            status: Some(TicketStatus::Pending),
            ..Default::default()
        };

        let result = store
            .update_tickets(&org, &[(ticket.id, patch.clone()), (TicketId::new(), patch)])
            .await;

        assert!(matches!(result, Err(StoreError::NotFound)));
        let stored = store.get_ticket(&org, &ticket.id).await.unwrap();
        assert_eq!(stored.status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn change_cursor_reports_updates_and_deletes() {
        let (store, org) = store_with_org().await;
        let t1 = store.create_ticket(&org, &ticket_params("c1")).await.unwrap();
        let t2 = store.create_ticket(&org, &ticket_params("c2")).await.unwrap();

        let initial = store.list_ticket_changes(&org, 0).await.unwrap();
        assert_eq!(initial.tickets.len(), 2);
        let cursor = initial.cursor;

        store
            .update_ticket(
                &org,
                &t1.id,
                &TicketPatch {
                    priority: Some(Priority::High),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.delete_ticket(&org, &t2.id).await.unwrap();

        let changes = store.list_ticket_changes(&org, cursor).await.unwrap();
        assert_eq!(changes.tickets.len(), 1);
        assert_eq!(changes.tickets[0].id, t1.id);
        assert_eq!(changes.deleted, vec![t2.id]);
        assert!(changes.cursor > cursor);

        let idle = store.list_ticket_changes(&org, changes.cursor).await.unwrap();
        assert!(idle.tickets.is_empty());
        assert!(idle.deleted.is_empty());
        assert_eq!(idle.cursor, changes.cursor);
    }

    #[tokio::test]
    async fn old_cursors_get_a_full_resync_once_tombstones_are_pruned() {
        let (store, org) = store_with_org().await;
        let keeper = store.create_ticket(&org, &ticket_params("keep")).await.unwrap();
        let early_cursor = store.list_ticket_changes(&org, 0).await.unwrap().cursor;

        for i in 0..=TOMBSTONE_RETENTION {
            let t = store
                .create_ticket(&org, &ticket_params(&format!("gone-{}", i)))
                .await
                .unwrap();
            store.delete_ticket(&org, &t.id).await.unwrap();
        }
        {
            let state = store.state.read().await;
            assert_eq!(state.org(&org).unwrap().tombstones.len(), TOMBSTONE_RETENTION);
        }

        let stale = store.list_ticket_changes(&org, early_cursor).await.unwrap();
        assert!(stale.full_resync);
        assert!(stale.deleted.is_empty());
        assert_eq!(stale.tickets.len(), 1);
        assert_eq!(stale.tickets[0].id, keeper.id);

        let fresh = store.list_ticket_changes(&org, stale.cursor).await.unwrap();
        assert!(!fresh.full_resync);
        assert!(fresh.tickets.is_empty());
    }

    #[tokio::test]
    async fn member_email_is_unique_case_insensitively() {
        let (store, org) = store_with_org().await;
        store
            .create_member(&org, &member_params("ana@desk.test", false))
            .await
            .unwrap();
        assert!(matches!(
            store
                .create_member(&org, &member_params("ANA@desk.test", false))
                .await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn license_counts_exclude_clients() {
        let (store, org) = store_with_org().await;
        let agent = store
            .create_member(&org, &member_params("a@desk.test", false))
            .await
            .unwrap();
        let client = store
            .create_member(&org, &member_params("c@client.test", true))
            .await
            .unwrap();
        store
            .create_member(&org, &member_params("b@desk.test", false))
            .await
            .unwrap();

        store
            .set_member_licenses(&org, &[agent.id, client.id], true)
            .await
            .unwrap();

        assert_eq!(store.count_licensed_agents(&org).await.unwrap(), 1);
        assert_eq!(store.count_unlicensed_agents(&org).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn license_batch_with_unknown_member_changes_nothing() {
        let (store, org) = store_with_org().await;
        let agent = store
            .create_member(&org, &member_params("a@desk.test", false))
            .await
            .unwrap();

        let result = store
            .set_member_licenses(&org, &[agent.id, MemberId::new()], true)
            .await;

        assert!(matches!(result, Err(StoreError::NotFound)));
        assert!(!store.get_member(&org, &agent.id).await.unwrap().has_license);
    }

    #[tokio::test]
    async fn contact_lookup_prefers_members() {
        let (store, org) = store_with_org().await;
        let company = store.create_company(&org, "Client Co").await.unwrap();
        store
            .create_employee(
                &org,
                &CreateEmployeeParams {
                    company_id: company.id,
                    name: "Bo".into(),
                    email: "bo@client.test".into(),
                },
            )
            .await
            .unwrap();

        let contact = store
            .find_contact_by_email(&org, "BO@client.test")
            .await
            .unwrap();
        assert!(matches!(contact, Contact::Employee(_)));
        assert_eq!(contact.company_id(), Some(company.id));

        store
            .create_member(&org, &member_params("bo@client.test", true))
            .await
            .unwrap();
        let contact = store
            .find_contact_by_email(&org, "bo@client.test")
            .await
            .unwrap();
        assert!(matches!(contact, Contact::Member(_)));

        assert!(matches!(
            store.find_contact_by_email(&org, "nobody@x.test").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn payment_transition_is_compare_and_set() {
        let (store, org) = store_with_org().await;
        let payment = store
            .create_payment(
                &org,
                &CreatePaymentParams {
                    amount: 100,
                    currency: "PHP".into(),
                    agent_count: 1,
                    metadata: BTreeMap::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        let paid = store
            .transition_payment(&org, &payment.id, PaymentStatus::Pending, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);

        assert!(matches!(
            store
                .transition_payment(&org, &payment.id, PaymentStatus::Pending, PaymentStatus::Paid)
                .await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn subscription_is_one_per_organization() {
        let (store, org) = store_with_org().await;
        let params = CreateSubscriptionParams {
            status: SubscriptionStatus::Trial,
            agent_slots: 2,
            price_per_agent: 500,
            trial_ends_at: None,
        };
        let sub = store.create_subscription(&org, &params).await.unwrap();
        assert_eq!(sub.total_amount, 1000);
        assert!(matches!(
            store.create_subscription(&org, &params).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn subscription_update_is_guarded_by_status() {
        let (store, org) = store_with_org().await;
        store
            .create_subscription(
                &org,
                &CreateSubscriptionParams {
                    status: SubscriptionStatus::Trial,
                    agent_slots: 1,
                    price_per_agent: 500,
                    trial_ends_at: None,
                },
            )
            .await
            .unwrap();
        store
            .create_member(
                &org,
                &CreateMemberParams {
                    name: "Ana".into(),
                    email: "ana@desk.test".into(),
                    is_client: false,
                    company_id: None,
                },
            )
            .await
            .unwrap();

        let refreshed = store
            .update_subscription(&org, &SubscriptionUpdate::refresh())
            .await
            .unwrap();
        assert_eq!(refreshed.agent_count, 1);

        let stale = SubscriptionUpdate::status(SubscriptionStatus::Expired)
            .expecting(SubscriptionStatus::Active);
        assert!(matches!(
            store.update_subscription(&org, &stale).await,
            Err(StoreError::Conflict)
        ));
        assert_eq!(
            store.get_subscription(&org).await.unwrap().status,
            SubscriptionStatus::Trial
        );
    }

    #[tokio::test]
    async fn confirm_payment_is_all_or_nothing() {
        let (store, org) = store_with_org().await;
        let payment = store
            .create_payment(
                &org,
                &CreatePaymentParams {
                    amount: 1000,
                    currency: "PHP".into(),
                    agent_count: 2,
                    metadata: BTreeMap::new(),
                },
            )
            .await
            .unwrap();
        let update = SubscriptionUpdate {
            add_agent_slots: 2,
            ..SubscriptionUpdate::status(SubscriptionStatus::Active)
        };

        // No subscription yet: the payment must stay PENDING.
        assert!(matches!(
            store.confirm_payment(&org, &payment.id, &update).await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(
            store.get_payment(&org, &payment.id).await.unwrap().status,
            PaymentStatus::Pending
        );

        store
            .create_subscription(
                &org,
                &CreateSubscriptionParams {
                    status: SubscriptionStatus::Trial,
                    agent_slots: 1,
                    price_per_agent: 500,
                    trial_ends_at: None,
                },
            )
            .await
            .unwrap();
        let (paid, sub) = store.confirm_payment(&org, &payment.id, &update).await.unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert_eq!(sub.agent_slots, 3);
        assert_eq!(sub.total_amount, 1500);

        assert!(matches!(
            store.confirm_payment(&org, &payment.id, &update).await,
            Err(StoreError::Conflict)
        ));
        assert_eq!(store.get_subscription(&org).await.unwrap().agent_slots, 3);
    }

    #[tokio::test]
    async fn activity_is_returned_in_append_order() {
        let (store, org) = store_with_org().await;
        let ticket = store.create_ticket(&org, &ticket_params("c1")).await.unwrap();
        let actor = Actor::new("Ana", "ana@desk.test");
        let now = Utc::now();

        // Caller dates deliberately go backwards; sequence decides the order.
        for (i, kind) in [ActivityType::Priority, ActivityType::Deadline, ActivityType::Status]
            .into_iter()
            .enumerate()
        {
            store
                .append(
                    ActivityEntry::builder(&org, &ticket.id, kind)
                        .actor(&actor)
                        .date(now - chrono::Duration::seconds(i as i64))
                        .build(),
                )
                .await
                .unwrap();
        }

        let entries = store.list_for_ticket(&org, &ticket.id).await.unwrap();
        let kinds: Vec<_> = entries.iter().map(|e| e.activity_type).collect();
        assert_eq!(
            kinds,
            vec![ActivityType::Priority, ActivityType::Deadline, ActivityType::Status]
        );
        assert!(entries.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert_eq!(
            store
                .count(&org, ActivityFilter::new().activity_type(ActivityType::Deadline))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn activity_for_unknown_org_fails() {
        let store = MemoryStore::new();
        let result = store
            .append(
                ActivityEntry::builder(&OrganizationId::new(), &TicketId::new(), ActivityType::Note)
                    .build(),
            )
            .await;
        assert!(matches!(result, Err(ActivityLogError::Backend(_))));
    }

    #[tokio::test]
    async fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("quickdesk.json");

        let (store, org) = store_with_org().await;
        store.create_ticket(&org, &ticket_params("c1")).await.unwrap();
        store.save_snapshot(&path).await.unwrap();

        let reopened = MemoryStore::open_snapshot(&path).unwrap();
        let tickets = reopened
            .list_tickets(&org, &TicketFilter::new())
            .await
            .unwrap();
        assert_eq!(tickets.len(), 1);
        let next = reopened
            .create_ticket(&org, &ticket_params("c2"))
            .await
            .unwrap();
        assert_eq!(next.ticket_number, 2);
    }

    #[tokio::test]
    async fn missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open_snapshot(dir.path().join("absent.json")).unwrap();
        assert!(store.list_organizations().await.is_empty());
    }
}
