//! Billing entity → FreeRADIUS attribute synchronization
//!
//! Every operation here runs after the billing write it mirrors has been
//! persisted. A failure never undoes that write; it leaves
//! `synced_to_radius = false` behind so [`Synchronizer::resync_drifted`]
//! (or the next save) can repair it.

use crate::billing::BillingRepository;
use crate::error::{SyncError, SyncResult};
use crate::model::{Subscriber, SubscriberStatus, Voucher};
use crate::radius::{AttributeCompiler, RadiusBackend, RadiusChange, voucher_group_name};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a drift repair pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    pub subscribers_synced: usize,
    pub subscribers_failed: usize,
    pub vouchers_synced: usize,
    pub vouchers_failed: usize,
}

impl ResyncReport {
    pub fn failed(&self) -> usize {
        self.subscribers_failed + self.vouchers_failed
    }
}

pub struct Synchronizer {
    billing: Arc<dyn BillingRepository>,
    radius: Arc<dyn RadiusBackend>,
    compiler: AttributeCompiler,
}

impl Synchronizer {
    pub fn new(
        billing: Arc<dyn BillingRepository>,
        radius: Arc<dyn RadiusBackend>,
        compiler: AttributeCompiler,
    ) -> Self {
        Synchronizer {
            billing,
            radius,
            compiler,
        }
    }

    pub fn billing(&self) -> &Arc<dyn BillingRepository> {
        &self.billing
    }

    pub fn radius(&self) -> &Arc<dyn RadiusBackend> {
        &self.radius
    }

    async fn apply(&self, change: &RadiusChange) -> SyncResult<()> {
        self.radius
            .apply(change)
            .await
            .map_err(|source| SyncError::SyncDrift {
                username: change.username.clone(),
                source,
            })
    }

    /// Rewrite the rows of `subscriber` as if it had `status`
    ///
    /// Idempotent: running it twice with the same inputs leaves the same
    /// rows behind.
    pub async fn sync_subscriber(
        &self,
        subscriber: &Subscriber,
        status: SubscriberStatus,
    ) -> SyncResult<()> {
        let result = self.write_subscriber(subscriber, status).await;
        let synced = result.is_ok();

        if let Err(e) = &result {
            warn!(
                username = %subscriber.username,
                status = %status,
                error = %e,
                "Subscriber RADIUS sync failed"
            );
        } else {
            debug!(username = %subscriber.username, status = %status, "Subscriber synced");
        }

        self.billing
            .record_subscriber_sync(subscriber.id, synced, Utc::now())
            .await?;
        result
    }

    async fn write_subscriber(
        &self,
        subscriber: &Subscriber,
        status: SubscriberStatus,
    ) -> SyncResult<()> {
        let profile = match status {
            SubscriberStatus::Blocked => None,
            _ => self.billing.profile(subscriber.profile_id).await?,
        };
        let change = self
            .compiler
            .subscriber(subscriber, status, profile.as_ref())?;
        self.apply(&change).await
    }

    /// Write a voucher's password row, its private group and the group's
    /// reply attributes; an EXPIRED voucher has all of them removed
    pub async fn sync_voucher_to_radius(&self, voucher: &Voucher) -> SyncResult<()> {
        let result = self.write_voucher(voucher).await;
        let synced = result.is_ok();

        if let Err(e) = &result {
            warn!(code = %voucher.code, error = %e, "Voucher RADIUS sync failed");
        } else {
            debug!(code = %voucher.code, status = voucher.status.as_str(), "Voucher synced");
        }

        self.billing
            .record_voucher_sync(&voucher.code, synced, Utc::now())
            .await?;
        result
    }

    async fn write_voucher(&self, voucher: &Voucher) -> SyncResult<()> {
        let profile = self
            .billing
            .profile(voucher.profile_id)
            .await?
            .ok_or_else(|| SyncError::not_found("Profile", voucher.profile_id))?;
        let mut change = self.compiler.voucher(voucher, &profile);
        let keep = match &change.group {
            Some(plan) => Some(plan.groupname.as_str()),
            None => None,
        };
        let stale = self.stale_groups(&voucher.code, keep).await?;
        extend_unique(&mut change.drop_groups, stale);
        self.apply(&change).await
    }

    /// Groups `username` is currently a member of, other than `keep`
    ///
    /// A voucher's group name follows its profile name, so a renamed or
    /// reassigned profile leaves the previous group behind in
    /// `radusergroup`. Only call this for vouchers: subscriber groups are
    /// shared between users.
    async fn stale_groups(&self, username: &str, keep: Option<&str>) -> SyncResult<Vec<String>> {
        let rows = self
            .radius
            .user_rows(username)
            .await
            .map_err(|source| SyncError::SyncDrift {
                username: username.to_string(),
                source,
            })?;
        Ok(rows
            .groups
            .into_iter()
            .map(|membership| membership.groupname)
            .filter(|groupname| Some(groupname.as_str()) != keep)
            .collect())
    }

    /// Delete every row of `username`
    ///
    /// When the username is a voucher its private groups are dropped as
    /// well: the one rebuilt from the voucher's profile and any group it is
    /// still a member of.
    pub async fn remove_from_radius(&self, username: &str) -> SyncResult<()> {
        let mut voucher_groups = Vec::new();
        if let Some(voucher) = self.billing.voucher(username).await? {
            if let Some(profile) = self.billing.profile(voucher.profile_id).await? {
                voucher_groups.push(voucher_group_name(&profile.name, &voucher.code));
            }
            let stale = self.stale_groups(username, None).await?;
            extend_unique(&mut voucher_groups, stale);
        }

        let mut change = self.compiler.removal(username, None);
        change.drop_groups = voucher_groups;
        match self.apply(&change).await {
            Ok(()) => {
                info!(username = %username, "RADIUS rows removed");
                Ok(())
            }
            Err(e) => {
                warn!(username = %username, error = %e, "RADIUS row removal failed");
                Err(e)
            }
        }
    }

    /// Re-run the sync for every entity whose last attempt failed
    pub async fn resync_drifted(&self) -> SyncResult<ResyncReport> {
        let mut report = ResyncReport::default();

        for subscriber in self.billing.drifted_subscribers().await? {
            match self.sync_subscriber(&subscriber, subscriber.status).await {
                Ok(()) => report.subscribers_synced += 1,
                Err(SyncError::Store(e)) => return Err(SyncError::Store(e)),
                Err(_) => report.subscribers_failed += 1,
            }
        }

        for voucher in self.billing.drifted_vouchers().await? {
            match self.sync_voucher_to_radius(&voucher).await {
                Ok(()) => report.vouchers_synced += 1,
                Err(SyncError::Store(e)) => return Err(SyncError::Store(e)),
                Err(_) => report.vouchers_failed += 1,
            }
        }

        info!(
            subscribers_synced = report.subscribers_synced,
            subscribers_failed = report.subscribers_failed,
            vouchers_synced = report.vouchers_synced,
            vouchers_failed = report.vouchers_failed,
            "Drift repair finished"
        );
        Ok(report)
    }
}

fn extend_unique(groups: &mut Vec<String>, more: Vec<String>) {
    for groupname in more {
        if !groups.contains(&groupname) {
            groups.push(groupname);
        }
    }
}
