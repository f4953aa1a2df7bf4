//! Member lifecycle: add, invite, complete signup.

use std::sync::Arc;

use async_trait::async_trait;
use quickdesk_storage::{
    CreateMemberParams, MemberId, MemberStatus, Organization, OrganizationId, OrganizationMember,
    Store, StoreError,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::seats::{refresh_billing, AddMembersCheck, LicenseService};
use crate::BillingError;

/// Mail delivery error; the text is passed to the caller unchanged.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MailError(pub String);

/// Sends invitation emails
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invitation(
        &self,
        organization: &Organization,
        member: &OrganizationMember,
    ) -> Result<(), MailError>;
}

/// Mailer that only logs. Used by the admin CLI and in development.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_invitation(
        &self,
        organization: &Organization,
        member: &OrganizationMember,
    ) -> Result<(), MailError> {
        info!(
            org_id = %organization.id,
            to = %member.email,
            "Invitation email (not sent, log mailer)"
        );
        Ok(())
    }
}

pub struct MemberService<S: Store + ?Sized> {
    store: Arc<S>,
    licenses: LicenseService<S>,
    mailer: Arc<dyn Mailer>,
}

impl<S: Store + ?Sized> MemberService<S> {
    pub fn new(store: Arc<S>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            licenses: LicenseService::new(store.clone()),
            store,
            mailer,
        }
    }

    /// Add a member as `UNINVITED`. Agents can only be added while
    /// [`LicenseService::can_add_members`] allows it; clients always can.
    pub async fn add_member(
        &self,
        org_id: &OrganizationId,
        params: &CreateMemberParams,
    ) -> Result<OrganizationMember, BillingError> {
        if !params.is_client {
            if let AddMembersCheck::Blocked(reason) = self.licenses.can_add_members(org_id).await? {
                warn!(org_id = %org_id, %reason, "Member addition blocked");
                return Err(BillingError::State(reason));
            }
        }

        let member = match self.store.create_member(org_id, params).await {
            Ok(member) => member,
            Err(StoreError::AlreadyExists) => {
                return Err(BillingError::State(format!(
                    "{} is already a member of this organization",
                    params.email
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if !member.is_client {
            // a new unlicensed agent changes agent_count
            refresh_billing(&*self.store, org_id).await?;
        }

        info!(
            org_id = %org_id,
            member_id = %member.id,
            is_client = member.is_client,
            "Member added"
        );
        Ok(member)
    }

    /// Send the invitation; the member becomes `INVITED` only once it went out.
    pub async fn send_invitation(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<OrganizationMember, BillingError> {
        let organization = match self.store.get_organization(org_id).await {
            Ok(org) => org,
            Err(StoreError::NotFound) => {
                return Err(BillingError::NotFound(format!("organization {}", org_id)))
            }
            Err(e) => return Err(e.into()),
        };
        let member = self.member(org_id, member_id).await?;
        if member.status == MemberStatus::Verified {
            return Err(BillingError::State(format!(
                "{} has already completed signup",
                member.email
            )));
        }

        if let Err(e) = self.mailer.send_invitation(&organization, &member).await {
            warn!(org_id = %org_id, member_id = %member_id, error = %e, "Invitation email failed");
            return Err(BillingError::ExternalService(e.0));
        }

        let member = self
            .store
            .set_member_status(org_id, member_id, MemberStatus::Invited)
            .await?;
        info!(org_id = %org_id, member_id = %member_id, "Invitation sent");
        Ok(member)
    }

    /// Mark a member as registered after they complete signup.
    pub async fn complete_signup(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<OrganizationMember, BillingError> {
        let member = self.member(org_id, member_id).await?;
        if member.status == MemberStatus::Verified {
            return Ok(member);
        }
        let member = self
            .store
            .set_member_status(org_id, member_id, MemberStatus::Verified)
            .await?;
        info!(org_id = %org_id, member_id = %member_id, "Member verified");
        Ok(member)
    }

    pub async fn list_members(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Vec<OrganizationMember>, BillingError> {
        Ok(self.store.list_members(org_id).await?)
    }

    async fn member(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<OrganizationMember, BillingError> {
        match self.store.get_member(org_id, member_id).await {
            Ok(member) => Ok(member),
            Err(StoreError::NotFound) => Err(BillingError::NotFound(format!("member {}", member_id))),
            Err(e) => Err(e.into()),
        }
    }
}
