//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait the quickdesk domain crates depend on.
///
/// Every method is **scoped by organization**: a record belonging to another
/// organization is reported as `StoreError::NotFound`.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Organizations ──────────────────────────────────

    /// Create a new organization.
    async fn create_organization(
        &self,
        params: &CreateOrganizationParams,
    ) -> Result<Organization, StoreError>;

    /// Get organization by ID.
    async fn get_organization(&self, org_id: &OrganizationId) -> Result<Organization, StoreError>;

    /// Get the deadline policy of an organization (`None` when never configured).
    async fn get_deadline_settings(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Option<DeadlineSettings>, StoreError>;

    /// Replace the deadline policy of an organization.
    async fn set_deadline_settings(
        &self,
        org_id: &OrganizationId,
        settings: &DeadlineSettings,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Tickets ────────────────────────────────────────

    /// Create a ticket. The backend assigns the id and the next ticket number;
    /// numbers are never reused, even after deletion.
    async fn create_ticket(
        &self,
        org_id: &OrganizationId,
        params: &CreateTicketParams,
    ) -> Result<Ticket, StoreError>;

    /// Get ticket by ID (archived tickets included).
    async fn get_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<Ticket, StoreError>;

    /// Get the ticket opened from a conversation.
    async fn get_ticket_by_conversation(
        &self,
        org_id: &OrganizationId,
        conversation_id: &ConversationId,
    ) -> Result<Ticket, StoreError>;

    /// Apply a partial update and return the stored ticket.
    async fn update_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
        patch: &TicketPatch,
    ) -> Result<Ticket, StoreError>;

    /// Apply several updates. Either every ticket is updated or none is.
    async fn update_tickets(
        &self,
        org_id: &OrganizationId,
        updates: &[(TicketId, TicketPatch)],
    ) -> Result<Vec<Ticket>, StoreError>;

    /// List tickets matching a filter, ordered by ticket number.
    async fn list_tickets(
        &self,
        org_id: &OrganizationId,
        filter: &TicketFilter,
    ) -> Result<Vec<Ticket>, StoreError>;

    /// List tickets written after `cursor` (a revision previously returned).
    async fn list_ticket_changes(
        &self,
        org_id: &OrganizationId,
        cursor: u64,
    ) -> Result<TicketChanges, StoreError>;

    /// Delete a ticket. Its number stays reserved.
    async fn delete_ticket(
        &self,
        org_id: &OrganizationId,
        ticket_id: &TicketId,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Members ────────────────────────────────────────

    /// Add a member (created UNINVITED, unlicensed). Email must be unique in the org.
    async fn create_member(
        &self,
        org_id: &OrganizationId,
        params: &CreateMemberParams,
    ) -> Result<OrganizationMember, StoreError>;

    /// Get member by ID.
    async fn get_member(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<OrganizationMember, StoreError>;

    /// List all members of an organization.
    async fn list_members(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Vec<OrganizationMember>, StoreError>;

    /// Update a member's onboarding status.
    async fn set_member_status(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
        status: MemberStatus,
    ) -> Result<OrganizationMember, StoreError>;

    /// Set `has_license` on several members. Either all are updated or none is.
    async fn set_member_licenses(
        &self,
        org_id: &OrganizationId,
        member_ids: &[MemberId],
        has_license: bool,
    ) -> Result<Vec<OrganizationMember>, StoreError>;

    /// Fresh count of non-client members holding a license.
    async fn count_licensed_agents(&self, org_id: &OrganizationId) -> Result<u32, StoreError>;

    /// Fresh count of non-client members without a license.
    async fn count_unlicensed_agents(&self, org_id: &OrganizationId) -> Result<u32, StoreError>;

    // ───────────────────────────────────── Companies & contacts ───────────────────────────

    /// Create a client company.
    async fn create_company(
        &self,
        org_id: &OrganizationId,
        name: &str,
    ) -> Result<Company, StoreError>;

    /// Get company by ID.
    async fn get_company(
        &self,
        org_id: &OrganizationId,
        company_id: &CompanyId,
    ) -> Result<Company, StoreError>;

    /// Register an employee of a client company.
    async fn create_employee(
        &self,
        org_id: &OrganizationId,
        params: &CreateEmployeeParams,
    ) -> Result<Employee, StoreError>;

    /// Resolve an email address to a member or an employee (members win).
    async fn find_contact_by_email(
        &self,
        org_id: &OrganizationId,
        email: &str,
    ) -> Result<Contact, StoreError>;

    // ───────────────────────────────────── Subscriptions ──────────────────────────────────

    /// Create the organization's subscription (one per organization).
    async fn create_subscription(
        &self,
        org_id: &OrganizationId,
        params: &CreateSubscriptionParams,
    ) -> Result<Subscription, StoreError>;

    /// Get the organization's subscription.
    async fn get_subscription(&self, org_id: &OrganizationId) -> Result<Subscription, StoreError>;

    /// Apply a partial update and recompute the billing figures in one write.
    /// Returns `StoreError::Conflict` when `update.expect_status` does not
    /// match the stored status.
    async fn update_subscription(
        &self,
        org_id: &OrganizationId,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription, StoreError>;

    // ───────────────────────────────────── Payments ───────────────────────────────────────

    /// Create a PENDING payment.
    async fn create_payment(
        &self,
        org_id: &OrganizationId,
        params: &CreatePaymentParams,
    ) -> Result<Payment, StoreError>;

    /// Get payment by ID.
    async fn get_payment(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
    ) -> Result<Payment, StoreError>;

    /// List an organization's payments, oldest first.
    async fn list_payments(&self, org_id: &OrganizationId) -> Result<Vec<Payment>, StoreError>;

    /// Move a payment from `from` to `to`. Returns `StoreError::Conflict`
    /// when the stored status is not `from`.
    async fn transition_payment(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<Payment, StoreError>;

    /// Move a PENDING payment to PAID and apply `update` to the subscription
    /// in the same write. Nothing changes unless both succeed; a payment
    /// that is no longer PENDING yields `StoreError::Conflict`.
    async fn confirm_payment(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
        update: &SubscriptionUpdate,
    ) -> Result<(Payment, Subscription), StoreError>;

    /// Delete a payment record.
    async fn delete_payment(
        &self,
        org_id: &OrganizationId,
        payment_id: &PaymentId,
    ) -> Result<(), StoreError>;
}
