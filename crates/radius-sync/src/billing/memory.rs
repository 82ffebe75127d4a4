//! In-memory billing store

use super::BillingRepository;
use crate::error::StoreError;
use crate::model::{
    LedgerEntry, Profile, ProfileId, Router, Subscriber, SubscriberId, SubscriberStatus, Voucher,
    VoucherStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Entities {
    subscribers: HashMap<SubscriberId, Subscriber>,
    profiles: HashMap<ProfileId, Profile>,
    vouchers: HashMap<String, Voucher>,
    routers: Vec<Router>,
    ledger: Vec<LedgerEntry>,
}

/// Billing entities held in process memory
///
/// Used by the test suite and by dry runs. A single lock guards all
/// entities, so conditional updates such as
/// [`BillingRepository::activate_voucher`] are atomic just like their SQL
/// counterparts.
#[derive(Debug, Clone, Default)]
pub struct MemoryBillingStore {
    inner: Arc<RwLock<Entities>>,
}

impl MemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.inner.write().await.profiles.insert(profile.id, profile);
    }

    pub async fn insert_subscriber(&self, subscriber: Subscriber) {
        self.inner
            .write()
            .await
            .subscribers
            .insert(subscriber.id, subscriber);
    }

    pub async fn insert_voucher(&self, voucher: Voucher) {
        self.inner
            .write()
            .await
            .vouchers
            .insert(voucher.code.clone(), voucher);
    }

    pub async fn insert_router(&self, router: Router) {
        self.inner.write().await.routers.push(router);
    }

    pub async fn ledger(&self) -> Vec<LedgerEntry> {
        self.inner.read().await.ledger.clone()
    }
}

#[async_trait]
impl BillingRepository for MemoryBillingStore {
    async fn subscriber(&self, id: SubscriberId) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.inner.read().await.subscribers.get(&id).cloned())
    }

    async fn subscribers(&self, ids: &[SubscriberId]) -> Result<Vec<Subscriber>, StoreError> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.subscribers.get(id).cloned())
            .collect())
    }

    async fn subscriber_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Subscriber>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .subscribers
            .values()
            .find(|s| s.username == username)
            .cloned())
    }

    async fn update_subscriber_status(
        &self,
        ids: &[SubscriberId],
        status: SubscriberStatus,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(subscriber) = inner.subscribers.get_mut(id) {
                subscriber.status = status;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_subscriber(&self, id: SubscriberId) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.subscribers.remove(&id).is_some())
    }

    async fn record_subscriber_sync(
        &self,
        id: SubscriberId,
        synced: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(subscriber) = self.inner.write().await.subscribers.get_mut(&id) {
            subscriber.synced_to_radius = synced;
            subscriber.last_sync_at = Some(at);
        }
        Ok(())
    }

    async fn drifted_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let inner = self.inner.read().await;
        let mut drifted: Vec<_> = inner
            .subscribers
            .values()
            .filter(|s| !s.synced_to_radius)
            .cloned()
            .collect();
        drifted.sort_by_key(|s| s.id);
        Ok(drifted)
    }

    async fn profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        Ok(self.inner.read().await.profiles.get(&id).cloned())
    }

    async fn voucher(&self, code: &str) -> Result<Option<Voucher>, StoreError> {
        Ok(self.inner.read().await.vouchers.get(code).cloned())
    }

    async fn voucher_codes(&self, usernames: &[String]) -> Result<HashSet<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(usernames
            .iter()
            .filter(|username| inner.vouchers.contains_key(username.as_str()))
            .cloned()
            .collect())
    }

    async fn activate_voucher(
        &self,
        code: &str,
        first_login_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.vouchers.get_mut(code) {
            Some(voucher) if voucher.first_login_at.is_none() => {
                voucher.first_login_at = Some(first_login_at);
                voucher.expires_at = Some(expires_at);
                voucher.status = VoucherStatus::Active;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_voucher(&self, code: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.vouchers.get_mut(code) {
            Some(voucher) if voucher.status != VoucherStatus::Expired => {
                voucher.status = VoucherStatus::Expired;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn overdue_vouchers(&self, now: DateTime<Utc>) -> Result<Vec<Voucher>, StoreError> {
        let inner = self.inner.read().await;
        let mut overdue: Vec<_> = inner
            .vouchers
            .values()
            .filter(|v| v.status == VoucherStatus::Active && v.expires_at.is_some_and(|e| e < now))
            .cloned()
            .collect();
        overdue.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(overdue)
    }

    async fn record_voucher_sync(
        &self,
        code: &str,
        synced: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(voucher) = self.inner.write().await.vouchers.get_mut(code) {
            voucher.synced_to_radius = synced;
            voucher.last_sync_at = Some(at);
        }
        Ok(())
    }

    async fn drifted_vouchers(&self) -> Result<Vec<Voucher>, StoreError> {
        let inner = self.inner.read().await;
        let mut drifted: Vec<_> = inner
            .vouchers
            .values()
            .filter(|v| !v.synced_to_radius)
            .cloned()
            .collect();
        drifted.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(drifted)
    }

    async fn routers(&self) -> Result<Vec<Router>, StoreError> {
        Ok(self.inner.read().await.routers.clone())
    }

    async fn ledger_entry_exists(&self, reference: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .ledger
            .iter()
            .any(|e| e.reference == reference))
    }

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.ledger.iter().any(|e| e.reference == entry.reference) {
            return Ok(false);
        }
        inner.ledger.push(entry.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LedgerKind;
    use chrono::Duration;

    fn voucher(code: &str) -> Voucher {
        Voucher {
            code: code.to_string(),
            profile_id: 1,
            status: VoucherStatus::Waiting,
            first_login_at: None,
            expires_at: None,
            batch_code: None,
            agent_id: None,
            synced_to_radius: true,
            last_sync_at: None,
        }
    }

    #[tokio::test]
    async fn test_voucher_codes_filters_usernames() {
        let store = MemoryBillingStore::new();
        store.insert_voucher(voucher("HS01")).await;
        store.insert_voucher(voucher("HS02")).await;

        let names: Vec<String> = ["budi", "HS02", "HS01", "HS02"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let codes = store.voucher_codes(&names).await.unwrap();

        assert_eq!(codes.len(), 2);
        assert!(codes.contains("HS01") && codes.contains("HS02"));
        assert!(store.voucher_codes(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activate_voucher_only_once() {
        let store = MemoryBillingStore::new();
        store.insert_voucher(voucher("AAA111")).await;

        let t0 = Utc::now();
        assert!(store
            .activate_voucher("AAA111", t0, t0 + Duration::hours(1))
            .await
            .unwrap());
        assert!(!store
            .activate_voucher("AAA111", t0 + Duration::minutes(5), t0 + Duration::hours(2))
            .await
            .unwrap());

        let stored = store.voucher("AAA111").await.unwrap().unwrap();
        assert_eq!(stored.first_login_at, Some(t0));
        assert_eq!(stored.expires_at, Some(t0 + Duration::hours(1)));
        assert_eq!(stored.status, VoucherStatus::Active);
    }

    #[tokio::test]
    async fn test_overdue_vouchers() {
        let store = MemoryBillingStore::new();
        let now = Utc::now();
        store.insert_voucher(voucher("OLD")).await;
        store.insert_voucher(voucher("NEW")).await;
        store.insert_voucher(voucher("IDLE")).await;
        store
            .activate_voucher("OLD", now - Duration::hours(3), now - Duration::hours(1))
            .await
            .unwrap();
        store
            .activate_voucher("NEW", now, now + Duration::hours(1))
            .await
            .unwrap();

        let overdue = store.overdue_vouchers(now).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].code, "OLD");

        assert!(store.expire_voucher("OLD").await.unwrap());
        assert!(!store.expire_voucher("OLD").await.unwrap());
        assert!(store.overdue_vouchers(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_reference_is_unique() {
        let store = MemoryBillingStore::new();
        let entry = LedgerEntry {
            reference: "VCH-AAA111".to_string(),
            kind: LedgerKind::Income,
            category: "voucher_sale".to_string(),
            amount: 5_000,
            description: "Voucher AAA111".to_string(),
            agent_id: None,
            created_at: Utc::now(),
        };

        assert!(store.insert_ledger_entry(&entry).await.unwrap());
        assert!(!store.insert_ledger_entry(&entry).await.unwrap());
        assert!(store.ledger_entry_exists("VCH-AAA111").await.unwrap());
        assert_eq!(store.ledger().await.len(), 1);
    }
}
