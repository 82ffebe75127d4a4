//! Billing entities as seen by the RADIUS synchronization core

use chrono::{DateTime, Duration, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

pub type SubscriberId = i64;
pub type ProfileId = i64;
pub type RouterId = i64;
pub type AgentId = i64;

/// Entitlement state of a PPPoE subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    /// Full access with the profile's group
    Active,
    /// Walled garden: moved to the isolation group, pool address only
    Isolated,
    /// No RADIUS rows at all; authentication fails
    Blocked,
}

impl SubscriberStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriberStatus::Active => "active",
            SubscriberStatus::Isolated => "isolated",
            SubscriberStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for SubscriberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(SubscriberStatus::Active),
            "isolated" => Ok(SubscriberStatus::Isolated),
            "blocked" => Ok(SubscriberStatus::Blocked),
            other => Err(format!("invalid subscriber status '{}'", other)),
        }
    }
}

/// PPPoE subscriber; `username` is the immutable RADIUS key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub username: String,
    /// Cleartext, mirrored into `radcheck`
    pub password: String,
    pub profile_id: ProfileId,
    pub status: SubscriberStatus,
    /// Static address pushed as `Framed-IP-Address` while active
    pub ip_address: Option<Ipv4Addr>,
    pub expired_at: Option<DateTime<Utc>>,
    pub synced_to_radius: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Unit of a profile's validity period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidityUnit {
    Minutes,
    Hours,
    Days,
    /// Flat 30 days, not calendar months
    Months,
}

impl ValidityUnit {
    pub fn seconds(self) -> i64 {
        match self {
            ValidityUnit::Minutes => 60,
            ValidityUnit::Hours => 3_600,
            ValidityUnit::Days => 86_400,
            // Open question: flat approximation kept until product decides
            ValidityUnit::Months => 30 * 86_400,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidityUnit::Minutes => "MINUTES",
            ValidityUnit::Hours => "HOURS",
            ValidityUnit::Days => "DAYS",
            ValidityUnit::Months => "MONTHS",
        }
    }
}

impl FromStr for ValidityUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MINUTES" => Ok(ValidityUnit::Minutes),
            "HOURS" => Ok(ValidityUnit::Hours),
            "DAYS" => Ok(ValidityUnit::Days),
            "MONTHS" => Ok(ValidityUnit::Months),
            other => Err(format!("invalid validity unit '{}'", other)),
        }
    }
}

/// Bandwidth/validity package shared by subscribers and vouchers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    /// FreeRADIUS group carrying the profile's reply attributes
    pub group_name: String,
    /// Vendor rate-limit string, e.g. `10M/10M`
    pub rate_limit: Option<String>,
    pub validity_value: u32,
    pub validity_unit: ValidityUnit,
    /// `Simultaneous-Use` limit
    pub shared_users: Option<u32>,
    /// Voucher price in minor currency units
    pub selling_price: i64,
    /// Paid to the reseller when one of their vouchers is first used
    pub agent_commission: i64,
}

impl Profile {
    pub fn validity_secs(&self) -> i64 {
        i64::from(self.validity_value) * self.validity_unit.seconds()
    }

    /// `None` when the period does not fit a `chrono::Duration`
    pub fn validity(&self) -> Option<Duration> {
        Duration::try_seconds(self.validity_secs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoucherStatus {
    /// Printed but never used
    Waiting,
    /// First login happened; `expires_at` is fixed
    Active,
    /// Terminal
    Expired,
}

impl VoucherStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VoucherStatus::Waiting => "WAITING",
            VoucherStatus::Active => "ACTIVE",
            VoucherStatus::Expired => "EXPIRED",
        }
    }
}

impl FromStr for VoucherStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WAITING" => Ok(VoucherStatus::Waiting),
            "ACTIVE" => Ok(VoucherStatus::Active),
            "EXPIRED" => Ok(VoucherStatus::Expired),
            other => Err(format!("invalid voucher status '{}'", other)),
        }
    }
}

/// Hotspot voucher; `code` is both RADIUS username and password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub code: String,
    pub profile_id: ProfileId,
    pub status: VoucherStatus,
    pub first_login_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch_code: Option<String>,
    /// Reseller owning the batch, if any
    pub agent_id: Option<AgentId>,
    pub synced_to_radius: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Network access server registered for CoA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: RouterId,
    pub name: String,
    /// IP address or CIDR block, as in the FreeRADIUS `nas` table
    pub nasname: String,
    /// RADIUS shared secret, reused for Disconnect-Request signing
    #[serde(skip_serializing)]
    pub secret: String,
}

impl Router {
    /// Exact address match on `nasname`
    pub fn is_exact(&self, nas_ip: IpAddr) -> bool {
        self.nasname
            .parse::<IpAddr>()
            .is_ok_and(|addr| addr == nas_ip)
    }

    /// Whether accounting from `nas_ip` belongs to this router
    pub fn matches(&self, nas_ip: IpAddr) -> bool {
        if self.is_exact(nas_ip) {
            return true;
        }
        self.nasname
            .parse::<IpNetwork>()
            .is_ok_and(|network| network.contains(nas_ip))
    }
}

/// Pick the router owning `nas_ip`, preferring an exact address over a CIDR block
pub fn find_router(routers: &[Router], nas_ip: IpAddr) -> Option<&Router> {
    routers
        .iter()
        .find(|router| router.is_exact(nas_ip))
        .or_else(|| routers.iter().find(|router| router.matches(nas_ip)))
}

/// One `radacct` row, restricted to the columns the core reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingRecord {
    pub username: String,
    pub acct_session_id: String,
    pub nas_ip: IpAddr,
    pub framed_ip: Option<IpAddr>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    /// Time of the last interim update; `None` if the NAS never sent one
    pub update_time: Option<DateTime<Utc>>,
    pub input_octets: i64,
    pub output_octets: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Income,
    Expense,
}

impl LedgerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerKind::Income => "income",
            LedgerKind::Expense => "expense",
        }
    }
}

impl FromStr for LedgerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(LedgerKind::Income),
            "expense" => Ok(LedgerKind::Expense),
            other => Err(format!("invalid ledger kind '{}'", other)),
        }
    }
}

/// Bookkeeping entry; `reference` is the idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub reference: String,
    pub kind: LedgerKind,
    pub category: String,
    pub amount: i64,
    pub description: String,
    pub agent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(nasname: &str) -> Router {
        Router {
            id: 1,
            name: format!("nas {}", nasname),
            nasname: nasname.to_string(),
            secret: "s".to_string(),
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Active".parse(), Ok(SubscriberStatus::Active));
        assert_eq!(" isolated ".parse(), Ok(SubscriberStatus::Isolated));
        assert!("suspended".parse::<SubscriberStatus>().is_err());
        assert_eq!("expired".parse(), Ok(VoucherStatus::Expired));
    }

    #[test]
    fn test_validity_seconds() {
        let mut profile = Profile {
            id: 1,
            name: "Harian".to_string(),
            group_name: "harian".to_string(),
            rate_limit: None,
            validity_value: 30,
            validity_unit: ValidityUnit::Days,
            shared_users: None,
            selling_price: 0,
            agent_commission: 0,
        };
        assert_eq!(profile.validity_secs(), 30 * 86_400);

        profile.validity_value = 1;
        profile.validity_unit = ValidityUnit::Months;
        assert_eq!(profile.validity_secs(), 30 * 86_400);

        profile.validity_value = 90;
        profile.validity_unit = ValidityUnit::Minutes;
        assert_eq!(profile.validity(), Some(Duration::minutes(90)));
    }

    #[test]
    fn test_router_matching() {
        let exact = router("10.1.1.1");
        let block = router("10.1.0.0/16");
        let ip: IpAddr = "10.1.1.1".parse().unwrap();
        let other: IpAddr = "10.1.9.9".parse().unwrap();

        assert!(exact.matches(ip));
        assert!(!exact.matches(other));
        assert!(block.matches(other));
        assert!(!router("not-an-ip").matches(ip));

        let routers = vec![block.clone(), exact.clone()];
        assert_eq!(find_router(&routers, ip), Some(&exact));
        assert_eq!(find_router(&routers, other), Some(&block));
        assert_eq!(find_router(&routers, "192.0.2.1".parse().unwrap()), None);
    }

    #[test]
    fn test_router_secret_not_serialized() {
        let json = serde_json::to_value(router("10.0.0.1")).unwrap();
        assert!(json.get("secret").is_none());
    }
}
