//! Subscription trial and status handling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quickdesk_storage::{
    CreateSubscriptionParams, OrganizationId, Store, StoreError, Subscription, SubscriptionStatus,
    SubscriptionUpdate,
};
use tracing::{debug, info};

use crate::seats::load_subscription;
use crate::{BillingConfig, BillingError};

pub struct SubscriptionService<S: Store + ?Sized> {
    config: BillingConfig,
    store: Arc<S>,
}

impl<S: Store + ?Sized> SubscriptionService<S> {
    pub fn new(config: BillingConfig, store: Arc<S>) -> Self {
        Self { config, store }
    }

    /// Open the organization's subscription in `TRIAL` with `agent_slots`
    /// initial seats.
    pub async fn start_trial(
        &self,
        org_id: &OrganizationId,
        agent_slots: u32,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        let params = CreateSubscriptionParams {
            status: SubscriptionStatus::Trial,
            agent_slots,
            price_per_agent: self.config.price_per_agent,
            trial_ends_at: Some(self.config.trial_end(now)),
        };
        let subscription = match self.store.create_subscription(org_id, &params).await {
            Ok(subscription) => subscription,
            Err(StoreError::AlreadyExists) => {
                return Err(BillingError::State(
                    "organization already has a subscription".into(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            org_id = %org_id,
            agent_slots,
            trial_ends_at = ?subscription.trial_ends_at,
            "Trial started"
        );
        Ok(subscription)
    }

    pub async fn get(&self, org_id: &OrganizationId) -> Result<Subscription, BillingError> {
        load_subscription(&*self.store, org_id).await
    }

    /// Expire a lapsed trial and flag an unpaid period.
    ///
    /// The write only lands if the status is still the one evaluated; when a
    /// payment moved it meanwhile, the fresh record is returned unchanged.
    pub async fn refresh_status(
        &self,
        org_id: &OrganizationId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        let subscription = load_subscription(&*self.store, org_id).await?;
        let next = match subscription.status {
            SubscriptionStatus::Trial
                if subscription.trial_ends_at.is_some_and(|end| now > end) =>
            {
                SubscriptionStatus::Expired
            }
            SubscriptionStatus::Active
                if subscription.current_period_end.is_some_and(|end| now > end) =>
            {
                SubscriptionStatus::PastDue
            }
            current => current,
        };
        if next == subscription.status {
            return Ok(subscription);
        }

        let update = SubscriptionUpdate::status(next).expecting(subscription.status);
        match self.store.update_subscription(org_id, &update).await {
            Ok(updated) => {
                info!(
                    org_id = %org_id,
                    from = %subscription.status,
                    to = %next,
                    "Subscription status changed"
                );
                Ok(updated)
            }
            Err(StoreError::Conflict) => {
                debug!(org_id = %org_id, "Subscription changed concurrently, keeping it");
                load_subscription(&*self.store, org_id).await
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn cancel(
        &self,
        org_id: &OrganizationId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        let subscription = load_subscription(&*self.store, org_id).await?;
        if subscription.status == SubscriptionStatus::Canceled {
            return Err(BillingError::State("subscription is already canceled".into()));
        }
        let update = SubscriptionUpdate {
            canceled_at: Some(now),
            ..SubscriptionUpdate::status(SubscriptionStatus::Canceled)
        };
        let canceled = self.store.update_subscription(org_id, &update).await?;

        info!(org_id = %org_id, "Subscription canceled");
        Ok(canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parking_lot::Mutex;
    use quickdesk_storage::{MockStore, SubscriptionId};

    fn stored(org: OrganizationId, status: SubscriptionStatus) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: SubscriptionId::new(),
            organization_id: org,
            status,
            agent_count: 0,
            agent_slots: 1,
            price_per_agent: 500,
            total_amount: 500,
            trial_ends_at: None,
            current_period_start: None,
            current_period_end: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn store_with(sub: Subscription) -> MockStore {
        let shared = Arc::new(Mutex::new(sub));
        let mut store = MockStore::new();
        let read = shared.clone();
        store
            .expect_get_subscription()
            .returning(move |_| Ok(read.lock().clone()));
        store.expect_update_subscription().returning(move |_, update| {
            let mut stored = shared.lock();
            if update.expect_status.is_some_and(|s| s != stored.status) {
                return Err(StoreError::Conflict);
            }
            update.apply_to(&mut stored, 0);
            Ok(stored.clone())
        });
        store
    }

    #[tokio::test]
    async fn test_start_trial() {
        let org = OrganizationId::new();
        let now = Utc::now();
        let mut store = MockStore::new();
        store
            .expect_create_subscription()
            .returning(move |org, params| {
                let mut sub = stored(*org, params.status);
                sub.agent_slots = params.agent_slots;
                sub.trial_ends_at = params.trial_ends_at;
                sub.total_amount = sub.expected_total();
                Ok(sub)
            });
        let svc = SubscriptionService::new(BillingConfig::test(), Arc::new(store));

        let sub = svc.start_trial(&org, 2, now).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Trial);
        assert_eq!(sub.trial_ends_at, Some(now + Duration::days(14)));
        assert_eq!(sub.total_amount, 1000);
    }

    #[tokio::test]
    async fn test_second_trial_is_rejected() {
        let mut store = MockStore::new();
        store
            .expect_create_subscription()
            .returning(|_, _| Err(StoreError::AlreadyExists));
        let svc = SubscriptionService::new(BillingConfig::test(), Arc::new(store));
        assert!(matches!(
            svc.start_trial(&OrganizationId::new(), 1, Utc::now()).await,
            Err(BillingError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_lapsed_trial_expires() {
        let org = OrganizationId::new();
        let now = Utc::now();
        let mut sub = stored(org, SubscriptionStatus::Trial);
        sub.trial_ends_at = Some(now - Duration::hours(1));
        let svc = SubscriptionService::new(BillingConfig::test(), Arc::new(store_with(sub)));

        let refreshed = svc.refresh_status(&org, now).await.unwrap();
        assert_eq!(refreshed.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn test_unpaid_period_goes_past_due() {
        let org = OrganizationId::new();
        let now = Utc::now();
        let mut sub = stored(org, SubscriptionStatus::Active);
        sub.current_period_end = Some(now - Duration::days(1));
        let svc = SubscriptionService::new(BillingConfig::test(), Arc::new(store_with(sub)));

        assert_eq!(
            svc.refresh_status(&org, now).await.unwrap().status,
            SubscriptionStatus::PastDue
        );
    }

    #[tokio::test]
    async fn test_running_trial_is_unchanged() {
        let org = OrganizationId::new();
        let now = Utc::now();
        let mut sub = stored(org, SubscriptionStatus::Trial);
        sub.trial_ends_at = Some(now + Duration::days(3));
        let mut store = MockStore::new();
        store
            .expect_get_subscription()
            .returning(move |_| Ok(sub.clone()));
        store.expect_update_subscription().times(0);
        let svc = SubscriptionService::new(BillingConfig::test(), Arc::new(store));

        assert_eq!(
            svc.refresh_status(&org, now).await.unwrap().status,
            SubscriptionStatus::Trial
        );
    }

    #[tokio::test]
    async fn test_refresh_keeps_a_concurrent_payment() {
        let org = OrganizationId::new();
        let now = Utc::now();
        let mut lapsed = stored(org, SubscriptionStatus::Trial);
        lapsed.trial_ends_at = Some(now - Duration::hours(1));
        let shared = Arc::new(Mutex::new(lapsed));

        let mut store = MockStore::new();
        let read = shared.clone();
        store
            .expect_get_subscription()
            .returning(move |_| Ok(read.lock().clone()));
        // A confirmed payment lands between the read and the write.
        store.expect_update_subscription().returning(move |_, update| {
            let mut stored = shared.lock();
            stored.status = SubscriptionStatus::Active;
            stored.agent_slots = 6;
            if update.expect_status.is_some_and(|s| s != stored.status) {
                return Err(StoreError::Conflict);
            }
            update.apply_to(&mut stored, 0);
            Ok(stored.clone())
        });
        let svc = SubscriptionService::new(BillingConfig::test(), Arc::new(store));

        let current = svc.refresh_status(&org, now).await.unwrap();
        assert_eq!(current.status, SubscriptionStatus::Active);
        assert_eq!(current.agent_slots, 6);
    }

    #[tokio::test]
    async fn test_cancel() {
        let org = OrganizationId::new();
        let now = Utc::now();
        let svc = SubscriptionService::new(
            BillingConfig::test(),
            Arc::new(store_with(stored(org, SubscriptionStatus::Active))),
        );

        let canceled = svc.cancel(&org, now).await.unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert_eq!(canceled.canceled_at, Some(now));
        assert!(matches!(
            svc.cancel(&org, now).await,
            Err(BillingError::State(_))
        ));
    }
}
