//! Adaptive polling interval for ticket lists.
//!
//! Clients poll `list_since` with the cursor from their last fetch. This
//! policy only decides how long to wait before the next poll.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPolicy {
    pub active_interval: Duration,
    pub idle_interval: Duration,
    /// Time without user activity after which the client counts as idle.
    pub idle_threshold: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::from_secs(10, 60, 300)
    }
}

impl RefreshPolicy {
    pub fn from_secs(active: u64, idle: u64, idle_threshold: u64) -> Self {
        Self {
            active_interval: Duration::from_secs(active),
            idle_interval: Duration::from_secs(idle),
            idle_threshold: Duration::from_secs(idle_threshold),
        }
    }

    /// Delay before the next poll, or `None` to pause while hidden.
    pub fn next_interval(
        &self,
        now: DateTime<Utc>,
        last_activity: DateTime<Utc>,
        visible: bool,
    ) -> Option<Duration> {
        if !visible {
            return None;
        }
        // Activity stamped in the future (clock skew) counts as active.
        let quiet = (now - last_activity).to_std().unwrap_or(Duration::ZERO);
        if quiet >= self.idle_threshold {
            Some(self.idle_interval)
        } else {
            Some(self.active_interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_user_polls_fast() {
        let policy = RefreshPolicy::default();
        let now = Utc::now();
        assert_eq!(
            policy.next_interval(now, now - chrono::Duration::seconds(30), true),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_idle_user_polls_slow() {
        let policy = RefreshPolicy::default();
        let now = Utc::now();
        assert_eq!(
            policy.next_interval(now, now - chrono::Duration::minutes(5), true),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_hidden_pauses() {
        let policy = RefreshPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.next_interval(now, now, false), None);
    }

    #[test]
    fn test_future_activity_counts_as_active() {
        let policy = RefreshPolicy::from_secs(5, 30, 120);
        let now = Utc::now();
        assert_eq!(
            policy.next_interval(now, now + chrono::Duration::seconds(10), true),
            Some(Duration::from_secs(5))
        );
    }
}
