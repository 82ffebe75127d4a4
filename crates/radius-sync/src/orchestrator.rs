//! Entitlement change → attribute rewrite → session enforcement
//!
//! Every entry point follows the same sequence:
//!
//! 1. persist the billing change
//! 2. rewrite the RADIUS rows of each affected username
//! 3. disconnect the live sessions of those usernames
//!
//! Step 3 runs for a username only after step 2 has committed for it, so a
//! CPE that reconnects immediately authenticates against the new rows. A
//! username whose rewrite failed keeps its sessions: cutting them would
//! only re-authenticate against the old rows. Steps 2 and 3 are best
//! effort and never roll back step 1.

use crate::billing::BillingRepository;
use crate::coa::{BulkDisconnectReport, CoaOutcome, SessionEnforcer};
use crate::error::{SyncError, SyncResult};
use crate::model::{SubscriberId, SubscriberStatus};
use crate::sync::Synchronizer;
use crate::voucher::VoucherActivator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a single-subscriber change
#[derive(Debug, Clone, Serialize)]
pub struct ChangeReport {
    pub username: String,
    /// Rows were rewritten; `false` leaves the entity marked as drifted
    pub synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
    pub coa: CoaOutcome,
}

/// Result of a bulk status change
#[derive(Debug, Clone, Serialize)]
pub struct BulkStatusReport {
    pub status: SubscriberStatus,
    pub updated: u64,
    pub synced: usize,
    pub sync_failed: Vec<String>,
    pub coa: BulkDisconnectReport,
}

/// Result of an expiry sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpirySweepReport {
    pub expired: usize,
    /// Codes whose rows could not be removed; their sessions were left up
    pub purge_failed: Vec<String>,
    pub coa: BulkDisconnectReport,
}

const ROWS_NOT_REWRITTEN: &str = "RADIUS rows not rewritten; live sessions left running";

pub struct Orchestrator {
    billing: Arc<dyn BillingRepository>,
    sync: Arc<Synchronizer>,
    vouchers: Arc<VoucherActivator>,
    enforcer: SessionEnforcer,
}

impl Orchestrator {
    pub fn new(
        billing: Arc<dyn BillingRepository>,
        sync: Arc<Synchronizer>,
        vouchers: Arc<VoucherActivator>,
        enforcer: SessionEnforcer,
    ) -> Self {
        Orchestrator {
            billing,
            sync,
            vouchers,
            enforcer,
        }
    }

    pub fn enforcer(&self) -> &SessionEnforcer {
        &self.enforcer
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.sync
    }

    /// Move every subscriber in `ids` to `status`
    ///
    /// Unknown ids are skipped. A sync failure for one subscriber does not
    /// stop the others; it is reported in `sync_failed` and that username
    /// is left out of the disconnect pass. The rest are disconnected in one
    /// concurrent pass.
    pub async fn change_status(
        &self,
        ids: &[SubscriberId],
        status: SubscriberStatus,
    ) -> SyncResult<BulkStatusReport> {
        if ids.is_empty() {
            return Err(SyncError::Validation("no subscriber ids given".to_string()));
        }

        let updated = self.billing.update_subscriber_status(ids, status).await?;
        let subscribers = self.billing.subscribers(ids).await?;

        let mut synced = 0;
        let mut sync_failed = Vec::new();
        let mut usernames = Vec::with_capacity(subscribers.len());
        for subscriber in &subscribers {
            match self.sync.sync_subscriber(subscriber, status).await {
                Ok(()) => {
                    synced += 1;
                    usernames.push(subscriber.username.clone());
                }
                Err(e) => {
                    warn!(
                        username = %subscriber.username,
                        error = %e,
                        "Skipping subscriber in bulk status change"
                    );
                    sync_failed.push(subscriber.username.clone());
                }
            }
        }

        let coa = self.enforcer.disconnect_many(&usernames).await;
        info!(
            status = %status,
            requested = ids.len(),
            updated,
            synced,
            disconnected = coa.disconnected,
            coa_failed = coa.failed,
            "Bulk status change finished"
        );

        Ok(BulkStatusReport {
            status,
            updated,
            synced,
            sync_failed,
            coa,
        })
    }

    /// Single-subscriber form of [`Orchestrator::change_status`]
    pub async fn set_status(
        &self,
        id: SubscriberId,
        status: SubscriberStatus,
    ) -> SyncResult<ChangeReport> {
        if self.billing.update_subscriber_status(&[id], status).await? == 0 {
            return Err(SyncError::not_found("Subscriber", id));
        }
        let subscriber = self
            .billing
            .subscriber(id)
            .await?
            .ok_or_else(|| SyncError::not_found("Subscriber", id))?;

        let sync_result = self.sync.sync_subscriber(&subscriber, status).await;
        info!(username = %subscriber.username, status = %status, "Subscriber status changed");
        Ok(self.enforce(subscriber.username, sync_result).await)
    }

    /// Re-sync after a subscriber was created or edited
    pub async fn subscriber_saved(&self, id: SubscriberId) -> SyncResult<ChangeReport> {
        let subscriber = self
            .billing
            .subscriber(id)
            .await?
            .ok_or_else(|| SyncError::not_found("Subscriber", id))?;

        let sync_result = self.sync.sync_subscriber(&subscriber, subscriber.status).await;
        Ok(self.enforce(subscriber.username, sync_result).await)
    }

    /// Delete a subscriber together with all of its RADIUS rows
    pub async fn subscriber_deleted(&self, id: SubscriberId) -> SyncResult<ChangeReport> {
        let subscriber = self
            .billing
            .subscriber(id)
            .await?
            .ok_or_else(|| SyncError::not_found("Subscriber", id))?;
        self.billing.delete_subscriber(id).await?;

        let sync_result = self.sync.remove_from_radius(&subscriber.username).await;
        info!(username = %subscriber.username, "Subscriber deleted");
        Ok(self.enforce(subscriber.username, sync_result).await)
    }

    /// Write the rows of a newly generated or edited voucher
    pub async fn voucher_saved(&self, code: &str) -> SyncResult<ChangeReport> {
        let voucher = self
            .billing
            .voucher(code)
            .await?
            .ok_or_else(|| SyncError::not_found("Voucher", code))?;

        let sync_result = self.sync.sync_voucher_to_radius(&voucher).await;
        Ok(self.enforce(voucher.code, sync_result).await)
    }

    /// Expire every ACTIVE voucher past its `expires_at` and cut its sessions
    pub async fn expire_overdue_vouchers(
        &self,
        now: DateTime<Utc>,
    ) -> SyncResult<ExpirySweepReport> {
        let overdue = self.billing.overdue_vouchers(now).await?;
        if overdue.is_empty() {
            return Ok(ExpirySweepReport::default());
        }

        let mut expired = 0;
        let mut purge_failed = Vec::new();
        let mut codes = Vec::with_capacity(overdue.len());
        for voucher in &overdue {
            let expiry = self.vouchers.expire(voucher).await?;
            if expiry.changed {
                expired += 1;
            }
            match expiry.purge {
                Ok(()) => codes.push(voucher.code.clone()),
                Err(_) => purge_failed.push(voucher.code.clone()),
            }
        }

        let coa = self.enforcer.disconnect_many(&codes).await;
        info!(
            expired,
            purge_failed = purge_failed.len(),
            disconnected = coa.disconnected,
            "Voucher expiry sweep finished"
        );
        Ok(ExpirySweepReport {
            expired,
            purge_failed,
            coa,
        })
    }

    /// Disconnect `username` if its rows were rewritten
    async fn enforce(&self, username: String, sync_result: SyncResult<()>) -> ChangeReport {
        let coa = match &sync_result {
            Ok(()) => self.enforcer.disconnect_user(&username).await,
            Err(_) => CoaOutcome::failed(&username, ROWS_NOT_REWRITTEN),
        };
        report(username, sync_result, coa)
    }
}

fn report(username: String, sync_result: SyncResult<()>, coa: CoaOutcome) -> ChangeReport {
    ChangeReport {
        username,
        synced: sync_result.is_ok(),
        sync_error: sync_result.err().map(|e| e.to_string()),
        coa,
    }
}
