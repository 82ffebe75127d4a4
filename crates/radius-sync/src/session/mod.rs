//! Live session view over `radacct`
//!
//! A NAS that reboots or loses power never sends Accounting-Stop, so
//! `acctstoptime IS NULL` alone over-counts online users. A row is treated
//! as live only when:
//!
//! - it has an interim update newer than `interim_window`, or
//! - it never had an interim update and started within `no_interim_window`
//!
//! Everything else is a zombie and is excluded from counts, lists and CoA
//! targeting. Both windows are operational heuristics, configurable through
//! [`crate::config::SessionConfig`].

pub mod memory;
pub mod postgres;

pub use memory::MemoryAccounting;
pub use postgres::PostgresAccounting;

use crate::billing::BillingRepository;
use crate::config::SessionConfig;
use crate::error::{StoreError, SyncResult};
use crate::model::{AccountingRecord, RouterId, find_router};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    pub interim_window: Duration,
    pub no_interim_window: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        LivenessPolicy::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for LivenessPolicy {
    fn from(config: &SessionConfig) -> Self {
        let secs = |s: u64| {
            i64::try_from(s)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX)
        };
        LivenessPolicy {
            interim_window: secs(config.interim_window_secs),
            no_interim_window: secs(config.no_interim_window_secs),
        }
    }
}

impl LivenessPolicy {
    /// Oldest interim update still counted as live
    pub fn interim_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.interim_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Oldest start time still counted as live for rows without interims
    pub fn start_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.no_interim_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_live(&self, record: &AccountingRecord, now: DateTime<Utc>) -> bool {
        if record.stop_time.is_some() {
            return false;
        }
        match record.update_time {
            Some(updated) => updated >= self.interim_cutoff(now),
            None => record
                .start_time
                .is_some_and(|started| started >= self.start_cutoff(now)),
        }
    }
}

/// Read-only access to the accounting log
#[async_trait]
pub trait AccountingSource: Send + Sync {
    /// Live rows under `policy`, optionally restricted to one username,
    /// newest first
    async fn live_sessions(
        &self,
        policy: &LivenessPolicy,
        now: DateTime<Utc>,
        username: Option<&str>,
    ) -> Result<Vec<AccountingRecord>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Any username that is not a voucher code. PPPoE secrets may live on
    /// the NAS itself, so a missing subscriber row is still PPPoE.
    Pppoe,
    Hotspot,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Pppoe => "pppoe",
            SessionKind::Hotspot => "hotspot",
        }
    }
}

/// A live session enriched for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineSession {
    pub username: String,
    pub kind: SessionKind,
    pub acct_session_id: String,
    pub nas_ip: IpAddr,
    pub framed_ip: Option<IpAddr>,
    pub router_id: Option<RouterId>,
    pub router_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub duration: String,
    pub input_octets: i64,
    pub output_octets: i64,
    pub upload: String,
    pub download: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnlineSummary {
    pub total: usize,
    pub pppoe: usize,
    pub hotspot: usize,
    pub sessions: Vec<OnlineSession>,
}

pub struct SessionObserver {
    accounting: Arc<dyn AccountingSource>,
    billing: Arc<dyn BillingRepository>,
    policy: LivenessPolicy,
}

impl SessionObserver {
    pub fn new(
        accounting: Arc<dyn AccountingSource>,
        billing: Arc<dyn BillingRepository>,
        policy: LivenessPolicy,
    ) -> Self {
        SessionObserver {
            accounting,
            billing,
            policy,
        }
    }

    pub fn policy(&self) -> &LivenessPolicy {
        &self.policy
    }

    /// Live rows for one username, used to target Disconnect-Requests
    pub async fn live_sessions_for(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> SyncResult<Vec<AccountingRecord>> {
        Ok(self
            .accounting
            .live_sessions(&self.policy, now, Some(username))
            .await?)
    }

    pub async fn online_count(&self, now: DateTime<Utc>) -> SyncResult<usize> {
        Ok(self
            .accounting
            .live_sessions(&self.policy, now, None)
            .await?
            .len())
    }

    /// All live sessions with kind, owning router and formatted totals
    pub async fn online_sessions(&self, now: DateTime<Utc>) -> SyncResult<OnlineSummary> {
        let records = self.accounting.live_sessions(&self.policy, now, None).await?;
        let routers = self.billing.routers().await?;
        let usernames: Vec<String> = records.iter().map(|r| r.username.clone()).collect();
        let vouchers = self.billing.voucher_codes(&usernames).await?;

        let mut sessions = Vec::with_capacity(records.len());
        for record in records {
            let kind = if vouchers.contains(&record.username) {
                SessionKind::Hotspot
            } else {
                SessionKind::Pppoe
            };
            let router = find_router(&routers, record.nas_ip);
            let duration_secs = record
                .start_time
                .map(|started| (now - started).num_seconds().max(0))
                .unwrap_or(0);

            sessions.push(OnlineSession {
                kind,
                router_id: router.map(|r| r.id),
                router_name: router.map(|r| r.name.clone()),
                duration_secs,
                duration: format_duration(duration_secs),
                upload: format_bytes(record.input_octets),
                download: format_bytes(record.output_octets),
                username: record.username,
                acct_session_id: record.acct_session_id,
                nas_ip: record.nas_ip,
                framed_ip: record.framed_ip,
                start_time: record.start_time,
                input_octets: record.input_octets,
                output_octets: record.output_octets,
            });
        }

        let hotspot = sessions
            .iter()
            .filter(|s| s.kind == SessionKind::Hotspot)
            .count();
        Ok(OnlineSummary {
            total: sessions.len(),
            pppoe: sessions.len() - hotspot,
            hotspot,
            sessions,
        })
    }
}

/// `1d 2h 3m`, `2h 5m`, `4m 10s` or `42s`
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        secs % 86_400 / 3_600,
        secs % 3_600 / 60,
        secs % 60,
    );
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Binary-prefixed size with two decimals, e.g. `1.50 MB`
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let bytes = bytes.max(0);
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
