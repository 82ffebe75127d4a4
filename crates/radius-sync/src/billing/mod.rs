//! Billing entity storage
//!
//! The synchronizer only needs a narrow view of the billing database:
//! subscribers, their profiles, vouchers, routers and the ledger. The
//! [`BillingRepository`] trait captures exactly that view so the core can
//! run against Postgres in production and [`MemoryBillingStore`] in tests.

pub mod memory;
pub mod postgres;

pub use memory::MemoryBillingStore;
pub use postgres::PostgresBillingStore;

use crate::error::StoreError;
use crate::model::{
    LedgerEntry, Profile, ProfileId, Router, Subscriber, SubscriberId, SubscriberStatus, Voucher,
    find_router,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::net::IpAddr;

/// Category of the income entry booked when a voucher is first used
pub const CATEGORY_VOUCHER_SALE: &str = "voucher_sale";
/// Category of the reseller commission expense
pub const CATEGORY_AGENT_COMMISSION: &str = "agent_commission";

/// Ledger reference of a voucher's sale; doubles as idempotency key
pub fn voucher_sale_reference(code: &str) -> String {
    format!("VCH-{}", code)
}

/// Ledger reference of a voucher's agent commission
pub fn voucher_commission_reference(code: &str) -> String {
    format!("VCH-COM-{}", code)
}

#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn subscriber(&self, id: SubscriberId) -> Result<Option<Subscriber>, StoreError>;

    /// Subscribers among `ids` that exist, in no particular order
    async fn subscribers(&self, ids: &[SubscriberId]) -> Result<Vec<Subscriber>, StoreError>;

    async fn subscriber_by_username(&self, username: &str)
    -> Result<Option<Subscriber>, StoreError>;

    /// Persist `status` on every subscriber in `ids`; returns rows updated
    async fn update_subscriber_status(
        &self,
        ids: &[SubscriberId],
        status: SubscriberStatus,
    ) -> Result<u64, StoreError>;

    /// Returns whether a row was deleted
    async fn delete_subscriber(&self, id: SubscriberId) -> Result<bool, StoreError>;

    async fn record_subscriber_sync(
        &self,
        id: SubscriberId,
        synced: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn drifted_subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;

    async fn profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError>;

    async fn voucher(&self, code: &str) -> Result<Option<Voucher>, StoreError>;

    /// Which of `usernames` are voucher codes, in one lookup
    async fn voucher_codes(&self, usernames: &[String]) -> Result<HashSet<String>, StoreError>;

    /// Move a voucher from WAITING to ACTIVE, only if `first_login_at` is
    /// still unset. Returns `false` when another request won the race.
    async fn activate_voucher(
        &self,
        code: &str,
        first_login_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Mark a voucher EXPIRED; returns whether its status changed
    async fn expire_voucher(&self, code: &str) -> Result<bool, StoreError>;

    /// ACTIVE vouchers whose `expires_at` lies before `now`
    async fn overdue_vouchers(&self, now: DateTime<Utc>) -> Result<Vec<Voucher>, StoreError>;

    async fn record_voucher_sync(
        &self,
        code: &str,
        synced: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn drifted_vouchers(&self) -> Result<Vec<Voucher>, StoreError>;

    async fn routers(&self) -> Result<Vec<Router>, StoreError>;

    /// Router whose `nasname` covers `nas_ip`, exact addresses first
    async fn router_for_nas(&self, nas_ip: IpAddr) -> Result<Option<Router>, StoreError> {
        let routers = self.routers().await?;
        Ok(find_router(&routers, nas_ip).cloned())
    }

    async fn ledger_entry_exists(&self, reference: &str) -> Result<bool, StoreError>;

    /// Insert unless an entry with the same reference exists; returns
    /// whether a row was written
    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<bool, StoreError>;
}
