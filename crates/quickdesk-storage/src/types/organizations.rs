//! Organization (tenant) records and per-organization settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OrganizationId, Priority};

/// Organization record (billing and data-isolation boundary)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub owner_email: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating an organization
#[derive(Clone, Debug)]
pub struct CreateOrganizationParams {
    pub name: String,
    pub owner_email: String,
}

/// Lead time in days per ranked priority. `0` disables the auto-deadline.
///
/// Persisted as `{ "Urgent": n, "High": n, "Medium": n, "Low": n }`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineSettings {
    #[serde(rename = "Urgent", default)]
    pub urgent: u32,
    #[serde(rename = "High", default)]
    pub high: u32,
    #[serde(rename = "Medium", default)]
    pub medium: u32,
    #[serde(rename = "Low", default)]
    pub low: u32,
}

impl DeadlineSettings {
    /// Longest lead time accepted from operators (about a century).
    pub const MAX_LEAD_DAYS: u32 = 36_500;

    pub fn lead_days(&self, priority: Priority) -> u32 {
        match priority {
            Priority::Urgent => self.urgent,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
            Priority::None => 0,
        }
    }

    /// The first priority whose lead time exceeds [`Self::MAX_LEAD_DAYS`].
    pub fn out_of_range(&self) -> Option<Priority> {
        [Priority::Urgent, Priority::High, Priority::Medium, Priority::Low]
            .into_iter()
            .find(|p| self.lead_days(*p) > Self::MAX_LEAD_DAYS)
    }
}
