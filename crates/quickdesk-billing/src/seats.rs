//! License/seat accounting.
//!
//! `used_slots` is always a fresh count from the store at decision time.
//! Checks happen before any change; nothing is retried.

use std::sync::Arc;

use quickdesk_storage::{
    MemberId, OrganizationId, OrganizationMember, PaymentStatus, Store, StoreError, Subscription,
    SubscriptionUpdate,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::BillingError;

pub fn available_slots(subscription: &Subscription, used_slots: u32) -> u32 {
    subscription.agent_slots.saturating_sub(used_slots)
}

pub fn can_activate_license(subscription: &Subscription, used_slots: u32) -> bool {
    available_slots(subscription, used_slots) > 0
}

/// Seat usage snapshot for display
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatus {
    pub agent_slots: u32,
    pub used_slots: u32,
    pub available_slots: u32,
    pub agent_count: u32,
    pub total_amount: i64,
}

/// Outcome of [`LicenseService::can_add_members`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddMembersCheck {
    Allowed,
    Blocked(String),
}

impl AddMembersCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AddMembersCheck::Allowed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AddMembersCheck::Allowed => None,
            AddMembersCheck::Blocked(reason) => Some(reason),
        }
    }
}

/// Recompute `agent_count` and `total_amount` from live member rows.
///
/// The store applies this in a single write and never touches the slot
/// count, so it cannot undo a concurrent purchase.
pub(crate) async fn refresh_billing<S: Store + ?Sized>(
    store: &S,
    org_id: &OrganizationId,
) -> Result<Subscription, BillingError> {
    match store
        .update_subscription(org_id, &SubscriptionUpdate::refresh())
        .await
    {
        Ok(subscription) => Ok(subscription),
        Err(StoreError::NotFound) => Err(BillingError::SubscriptionNotFound),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn load_subscription<S: Store + ?Sized>(
    store: &S,
    org_id: &OrganizationId,
) -> Result<Subscription, BillingError> {
    match store.get_subscription(org_id).await {
        Ok(subscription) => Ok(subscription),
        Err(StoreError::NotFound) => Err(BillingError::SubscriptionNotFound),
        Err(e) => Err(e.into()),
    }
}

pub struct LicenseService<S: Store + ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> LicenseService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
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

    /// Give one agent a license.
    pub async fn activate_license(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<OrganizationMember, BillingError> {
        let member = self.member(org_id, member_id).await?;
        if member.is_client {
            return Err(BillingError::State(
                "client contacts cannot hold a license".into(),
            ));
        }
        if member.has_license {
            return Ok(member);
        }

        let subscription = load_subscription(&*self.store, org_id).await?;
        let used = self.store.count_licensed_agents(org_id).await?;
        if !can_activate_license(&subscription, used) {
            warn!(
                org_id = %org_id,
                member_id = %member_id,
                agent_slots = subscription.agent_slots,
                used,
                "License activation rejected"
            );
            return Err(BillingError::NoAvailableLicenses);
        }

        let mut updated = self
            .store
            .set_member_licenses(org_id, &[*member_id], true)
            .await?;
        refresh_billing(&*self.store, org_id).await?;

        info!(org_id = %org_id, member_id = %member_id, "License activated");
        updated
            .pop()
            .ok_or_else(|| BillingError::NotFound(format!("member {}", member_id)))
    }

    /// Take a license back. Revoking an unlicensed member is a no-op.
    pub async fn revoke_license(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<OrganizationMember, BillingError> {
        let member = self.member(org_id, member_id).await?;
        if !member.has_license {
            return Ok(member);
        }
        load_subscription(&*self.store, org_id).await?;

        let mut updated = self
            .store
            .set_member_licenses(org_id, &[*member_id], false)
            .await?;
        refresh_billing(&*self.store, org_id).await?;

        info!(org_id = %org_id, member_id = %member_id, "License revoked");
        updated
            .pop()
            .ok_or_else(|| BillingError::NotFound(format!("member {}", member_id)))
    }

    /// License several agents at once; either all of them or none.
    ///
    /// Members that already hold a license do not need a free slot.
    pub async fn bulk_activate_licenses(
        &self,
        org_id: &OrganizationId,
        member_ids: &[MemberId],
    ) -> Result<Vec<OrganizationMember>, BillingError> {
        let mut pending: Vec<MemberId> = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            if pending.contains(member_id) {
                continue;
            }
            let member = self.member(org_id, member_id).await?;
            if member.is_client {
                return Err(BillingError::State(format!(
                    "{} is a client contact and cannot hold a license",
                    member.email
                )));
            }
            if !member.has_license {
                pending.push(*member_id);
            }
        }
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let subscription = load_subscription(&*self.store, org_id).await?;
        let used = self.store.count_licensed_agents(org_id).await?;
        let available = available_slots(&subscription, used);
        if (available as usize) < pending.len() {
            warn!(
                org_id = %org_id,
                requested = pending.len(),
                available,
                "Bulk license activation rejected"
            );
            return Err(BillingError::InsufficientLicenses {
                requested: pending.len(),
                available,
            });
        }

        let updated = self
            .store
            .set_member_licenses(org_id, &pending, true)
            .await?;
        refresh_billing(&*self.store, org_id).await?;

        info!(org_id = %org_id, count = updated.len(), "Licenses activated");
        Ok(updated)
    }

    pub async fn status(&self, org_id: &OrganizationId) -> Result<LicenseStatus, BillingError> {
        let subscription = load_subscription(&*self.store, org_id).await?;
        let used = self.store.count_licensed_agents(org_id).await?;
        let agent_count = self.store.count_unlicensed_agents(org_id).await?;
        Ok(LicenseStatus {
            agent_slots: subscription.agent_slots,
            used_slots: used,
            available_slots: available_slots(&subscription, used),
            agent_count,
            total_amount: subscription.expected_total(),
        })
    }

    /// Whether new agents may be added, with a reason when they may not.
    pub async fn can_add_members(
        &self,
        org_id: &OrganizationId,
    ) -> Result<AddMembersCheck, BillingError> {
        let subscription = match load_subscription(&*self.store, org_id).await {
            Ok(subscription) => subscription,
            Err(BillingError::SubscriptionNotFound) => {
                return Ok(AddMembersCheck::Blocked(
                    "This organization has no subscription yet.".into(),
                ))
            }
            Err(e) => return Err(e),
        };

        let used = self.store.count_licensed_agents(org_id).await?;
        if !can_activate_license(&subscription, used) {
            return Ok(AddMembersCheck::Blocked(format!(
                "All {} agent licenses are in use. Purchase more slots to add members.",
                subscription.agent_slots
            )));
        }

        let payments = self.store.list_payments(org_id).await?;
        if payments.iter().any(|p| p.status == PaymentStatus::Pending) {
            return Ok(AddMembersCheck::Blocked(
                "A payment is still pending. Complete or cancel it before adding members.".into(),
            ));
        }

        if !subscription.status.allows_new_members() {
            return Ok(AddMembersCheck::Blocked(format!(
                "The subscription is {}. Renew it to add members.",
                subscription.status
            )));
        }

        Ok(AddMembersCheck::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use quickdesk_storage::{
        MemberStatus, MockStore, Payment, SubscriptionId, SubscriptionStatus,
    };
    use std::collections::BTreeMap;

    fn subscription(org: OrganizationId, slots: u32) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: SubscriptionId::new(),
            organization_id: org,
            status: SubscriptionStatus::Active,
            agent_count: 0,
            agent_slots: slots,
            price_per_agent: 500,
            total_amount: i64::from(slots) * 500,
            trial_ends_at: None,
            current_period_start: None,
            current_period_end: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn member(org: OrganizationId, is_client: bool, has_license: bool) -> OrganizationMember {
        let now = Utc::now();
        OrganizationMember {
            id: MemberId::new(),
            organization_id: org,
            name: "Agent".into(),
            email: format!("{}@desk.test", MemberId::new()),
            is_client,
            has_license,
            status: MemberStatus::Verified,
            company_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A mock store over a shared member list and subscription.
    fn store(
        members: Vec<OrganizationMember>,
        sub: Option<Subscription>,
    ) -> (MockStore, Arc<Mutex<Vec<OrganizationMember>>>) {
        let members = Arc::new(Mutex::new(members));
        let sub = Arc::new(Mutex::new(sub));
        let mut store = MockStore::new();

        let m = members.clone();
        store.expect_get_member().returning(move |_, id| {
            m.lock()
                .iter()
                .find(|x| x.id == *id)
                .cloned()
                .ok_or(StoreError::NotFound)
        });
        let m = members.clone();
        store.expect_count_licensed_agents().returning(move |_| {
            Ok(m.lock().iter().filter(|x| x.is_licensed_agent()).count() as u32)
        });
        let m = members.clone();
        store.expect_count_unlicensed_agents().returning(move |_| {
            Ok(m.lock().iter().filter(|x| x.is_unlicensed_agent()).count() as u32)
        });
        let m = members.clone();
        store
            .expect_set_member_licenses()
            .returning(move |_, ids, has_license| {
                let mut all = m.lock();
                let mut out = Vec::new();
                for x in all.iter_mut().filter(|x| ids.contains(&x.id)) {
                    x.has_license = has_license;
                    out.push(x.clone());
                }
                Ok(out)
            });
        let s = sub.clone();
        store
            .expect_get_subscription()
            .returning(move |_| s.lock().clone().ok_or(StoreError::NotFound));
        let s = sub.clone();
        let m = members.clone();
        store.expect_update_subscription().returning(move |_, update| {
            let unlicensed = m.lock().iter().filter(|x| x.is_unlicensed_agent()).count() as u32;
            let mut guard = s.lock();
            let stored = guard.as_mut().ok_or(StoreError::NotFound)?;
            update.apply_to(stored, unlicensed);
            Ok(stored.clone())
        });
        (store, members)
    }

    #[test]
    fn test_can_activate_license() {
        let sub = subscription(OrganizationId::new(), 2);
        assert!(can_activate_license(&sub, 1));
        assert!(!can_activate_license(&sub, 2));
        assert!(!can_activate_license(&sub, 5));
        assert_eq!(available_slots(&sub, 5), 0);
    }

    #[tokio::test]
    async fn test_activation_rejected_when_slots_full() {
        let org = OrganizationId::new();
        let a = member(org, false, true);
        let b = member(org, false, true);
        let c = member(org, false, false);
        let (store, members) = store(
            vec![a.clone(), b.clone(), c.clone()],
            Some(subscription(org, 2)),
        );
        let svc = LicenseService::new(Arc::new(store));

        let err = svc.activate_license(&org, &c.id).await.unwrap_err();
        assert!(matches!(err, BillingError::NoAvailableLicenses));
        let flags: Vec<bool> = members.lock().iter().map(|m| m.has_license).collect();
        assert_eq!(flags, vec![true, true, false]);
    }

    #[tokio::test]
    async fn test_activation_recomputes_billing() {
        let org = OrganizationId::new();
        let a = member(org, false, false);
        let b = member(org, false, false);
        let (store, _) = store(vec![a.clone(), b.clone()], Some(subscription(org, 3)));
        let store = Arc::new(store);
        let svc = LicenseService::new(store.clone());

        let licensed = svc.activate_license(&org, &a.id).await.unwrap();
        assert!(licensed.has_license);

        let status = svc.status(&org).await.unwrap();
        assert_eq!(status.used_slots, 1);
        assert_eq!(status.available_slots, 2);
        assert_eq!(status.agent_count, 1);
        assert_eq!(status.total_amount, 1500);
        let saved = store.get_subscription(&org).await.unwrap();
        assert_eq!(saved.agent_count, 1);
    }

    #[tokio::test]
    async fn test_activation_keeps_slots_bought_meanwhile() {
        let org = OrganizationId::new();
        let agent = member(org, false, false);
        let sub = Arc::new(Mutex::new(subscription(org, 1)));
        let licensed = Arc::new(Mutex::new(false));

        let mut store = MockStore::new();
        let m = agent.clone();
        store.expect_get_member().returning(move |_, _| Ok(m.clone()));
        let s = sub.clone();
        store
            .expect_get_subscription()
            .returning(move |_| Ok(s.lock().clone()));
        // A payment for five more slots commits while the seat count is read.
        let s = sub.clone();
        store.expect_count_licensed_agents().returning(move |_| {
            s.lock().agent_slots += 5;
            Ok(0)
        });
        let l = licensed.clone();
        let m = agent.clone();
        store
            .expect_set_member_licenses()
            .returning(move |_, _, has_license| {
                *l.lock() = has_license;
                let mut updated = m.clone();
                updated.has_license = has_license;
                Ok(vec![updated])
            });
        let s = sub.clone();
        let l = licensed.clone();
        store.expect_update_subscription().returning(move |_, update| {
            let unlicensed = if *l.lock() { 0 } else { 1 };
            let mut stored = s.lock();
            update.apply_to(&mut stored, unlicensed);
            Ok(stored.clone())
        });
        let svc = LicenseService::new(Arc::new(store));

        svc.activate_license(&org, &agent.id).await.unwrap();
        let stored = sub.lock().clone();
        assert_eq!(stored.agent_slots, 6);
        assert_eq!(stored.total_amount, 3000);
        assert_eq!(stored.agent_count, 0);
    }

    #[tokio::test]
    async fn test_clients_never_take_a_slot() {
        let org = OrganizationId::new();
        let client = member(org, true, false);
        let (store, _) = store(vec![client.clone()], Some(subscription(org, 5)));
        let svc = LicenseService::new(Arc::new(store));

        assert!(matches!(
            svc.activate_license(&org, &client.id).await,
            Err(BillingError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_bulk_activation_is_all_or_nothing() {
        let org = OrganizationId::new();
        let licensed = member(org, false, true);
        let a = member(org, false, false);
        let b = member(org, false, false);
        let (store, members) = store(
            vec![licensed.clone(), a.clone(), b.clone()],
            Some(subscription(org, 2)),
        );
        let svc = LicenseService::new(Arc::new(store));

        let err = svc
            .bulk_activate_licenses(&org, &[a.id, b.id])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::InsufficientLicenses {
                requested: 2,
                available: 1
            }
        ));
        assert_eq!(
            members.lock().iter().filter(|m| m.has_license).count(),
            1,
            "no member may change"
        );

        // Already-licensed members in the batch don't need a slot.
        let updated = svc
            .bulk_activate_licenses(&org, &[licensed.id, a.id, a.id])
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].id, a.id);
    }

    #[tokio::test]
    async fn test_revoke_frees_slot() {
        let org = OrganizationId::new();
        let a = member(org, false, true);
        let (store, _) = store(vec![a.clone()], Some(subscription(org, 1)));
        let svc = LicenseService::new(Arc::new(store));

        let revoked = svc.revoke_license(&org, &a.id).await.unwrap();
        assert!(!revoked.has_license);
        assert_eq!(svc.status(&org).await.unwrap().available_slots, 1);
    }

    #[tokio::test]
    async fn test_can_add_members_reasons() {
        let org = OrganizationId::new();

        let (store_none, _) = store(vec![], None);
        let check = LicenseService::new(Arc::new(store_none))
            .can_add_members(&org)
            .await
            .unwrap();
        assert!(check.reason().unwrap().contains("no subscription"));

        let (store_full, _) = store(vec![member(org, false, true)], Some(subscription(org, 1)));
        let check = LicenseService::new(Arc::new(store_full))
            .can_add_members(&org)
            .await
            .unwrap();
        assert!(check.reason().unwrap().contains("in use"));

        let (mut store_pending, _) = store(vec![], Some(subscription(org, 1)));
        store_pending.expect_list_payments().returning(move |org| {
            let now = Utc::now();
            Ok(vec![Payment {
                id: quickdesk_storage::PaymentId::new(),
                organization_id: *org,
                amount: 500,
                currency: "PHP".into(),
                status: PaymentStatus::Pending,
                agent_count: 1,
                metadata: BTreeMap::new(),
                created_at: now,
                updated_at: now,
            }])
        });
        let check = LicenseService::new(Arc::new(store_pending))
            .can_add_members(&org)
            .await
            .unwrap();
        assert!(check.reason().unwrap().contains("pending"));

        let mut expired = subscription(org, 1);
        expired.status = SubscriptionStatus::Expired;
        let (mut store_expired, _) = store(vec![], Some(expired));
        store_expired.expect_list_payments().returning(|_| Ok(vec![]));
        let check = LicenseService::new(Arc::new(store_expired))
            .can_add_members(&org)
            .await
            .unwrap();
        assert!(check.reason().unwrap().contains("EXPIRED"));

        let (mut store_ok, _) = store(vec![], Some(subscription(org, 1)));
        store_ok.expect_list_payments().returning(|_| Ok(vec![]));
        let check = LicenseService::new(Arc::new(store_ok))
            .can_add_members(&org)
            .await
            .unwrap();
        assert!(check.is_allowed());
    }
}
