//! Organization members, client-company employees and the `Contact` union.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CompanyId, EmployeeId, MemberId, OrganizationId, ParseEnumError};

/// Member onboarding status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Uninvited,
    Invited,
    NotVerified,
    Verified,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Uninvited => "UNINVITED",
            MemberStatus::Invited => "INVITED",
            MemberStatus::NotVerified => "NOT_VERIFIED",
            MemberStatus::Verified => "VERIFIED",
        }
    }
}

impl FromStr for MemberStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNINVITED" => Ok(MemberStatus::Uninvited),
            "INVITED" => Ok(MemberStatus::Invited),
            "NOT_VERIFIED" => Ok(MemberStatus::NotVerified),
            "VERIFIED" => Ok(MemberStatus::Verified),
            _ => Err(ParseEnumError {
                kind: "member status",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organization member record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMember {
    pub id: MemberId,
    pub organization_id: OrganizationId,
    pub name: String,
    /// Unique within the organization.
    pub email: String,
    pub is_client: bool,
    pub has_license: bool,
    pub status: MemberStatus,
    pub company_id: Option<CompanyId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationMember {
    /// Counts toward `usedSlots`.
    pub fn is_licensed_agent(&self) -> bool {
        !self.is_client && self.has_license
    }

    /// Counts toward the subscription's informational `agentCount`.
    pub fn is_unlicensed_agent(&self) -> bool {
        !self.is_client && !self.has_license
    }
}

/// Parameters for adding a member to an organization
#[derive(Clone, Debug)]
pub struct CreateMemberParams {
    pub name: String,
    pub email: String,
    pub is_client: bool,
    pub company_id: Option<CompanyId>,
}

/// Employee of a client company (submits tickets, never billable)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub organization_id: OrganizationId,
    pub company_id: CompanyId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for registering a client-company employee
#[derive(Clone, Debug)]
pub struct CreateEmployeeParams {
    pub company_id: CompanyId,
    pub name: String,
    pub email: String,
}

/// Anyone a ticket sender address can resolve to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Contact {
    Member(OrganizationMember),
    Employee(Employee),
}

impl Contact {
    pub fn name(&self) -> &str {
        match self {
            Contact::Member(m) => &m.name,
            Contact::Employee(e) => &e.name,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Contact::Member(m) => &m.email,
            Contact::Employee(e) => &e.email,
        }
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        match self {
            Contact::Member(m) => m.company_id,
            Contact::Employee(e) => Some(e.company_id),
        }
    }
}

/// Client company record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
