//! FreeRADIUS attribute tables
//!
//! Entitlement is compiled into a [`RadiusChange`] by [`AttributeCompiler`]
//! and applied by a [`RadiusBackend`]. The split keeps the per-status rules
//! independent of where the rows live:
//!
//! - [`PostgresRadiusStore`]: classic FreeRADIUS SQL schema, one transaction per username
//! - [`MemoryRadiusStore`]: in-process tables for tests and dry runs
//!
//! All rows are written with the `:=` operator.

pub mod compile;
pub mod memory;
pub mod postgres;

pub use compile::{AttributeCompiler, voucher_group_name};
pub use memory::MemoryRadiusStore;
pub use postgres::PostgresRadiusStore;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Operator used for every row the core writes
pub const OP_SET: &str = ":=";

pub const CLEARTEXT_PASSWORD: &str = "Cleartext-Password";
pub const SIMULTANEOUS_USE: &str = "Simultaneous-Use";
pub const FRAMED_IP_ADDRESS: &str = "Framed-IP-Address";
pub const SESSION_TIMEOUT: &str = "Session-Timeout";

/// `radcheck` attributes owned by the synchronizer; others are left alone
pub const MANAGED_CHECK_ATTRIBUTES: &[&str] = &[CLEARTEXT_PASSWORD, SIMULTANEOUS_USE];

/// `radreply` attributes owned by the synchronizer; others are left alone
pub const MANAGED_REPLY_ATTRIBUTES: &[&str] = &[FRAMED_IP_ADDRESS];

/// One `radcheck`/`radreply`/`radgroupreply` row without its key column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RadiusAttribute {
    pub attribute: String,
    pub op: String,
    pub value: String,
}

impl RadiusAttribute {
    /// Row with the overwrite operator `:=`
    pub fn set(attribute: impl Into<String>, value: impl ToString) -> Self {
        RadiusAttribute {
            attribute: attribute.into(),
            op: OP_SET.to_string(),
            value: value.to_string(),
        }
    }
}

/// One `radusergroup` row without its username column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub groupname: String,
    pub priority: i32,
}

impl GroupMembership {
    pub fn new(groupname: impl Into<String>) -> Self {
        GroupMembership {
            groupname: groupname.into(),
            priority: 1,
        }
    }
}

/// Desired per-user state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserPlan {
    /// Replace the managed `radcheck`/`radreply` attributes and all group
    /// memberships with exactly these rows
    Replace {
        check: Vec<RadiusAttribute>,
        reply: Vec<RadiusAttribute>,
        groups: Vec<GroupMembership>,
    },
    /// Delete every `radcheck`, `radreply` and `radusergroup` row of the user
    Purge,
}

/// Desired `radgroupreply` contents of a group the core owns outright
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    pub groupname: String,
    pub reply: Vec<RadiusAttribute>,
}

/// Everything that must change, atomically, for one username
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadiusChange {
    pub username: String,
    pub user: UserPlan,
    /// Group rewritten alongside the user (voucher-unique groups)
    pub group: Option<GroupPlan>,
    /// Groups whose `radgroupreply` rows are deleted
    pub drop_groups: Vec<String>,
}

/// Current rows of one username, for inspection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserRows {
    pub check: Vec<RadiusAttribute>,
    pub reply: Vec<RadiusAttribute>,
    pub groups: Vec<GroupMembership>,
}

impl UserRows {
    pub fn is_empty(&self) -> bool {
        self.check.is_empty() && self.reply.is_empty() && self.groups.is_empty()
    }

    pub fn check_value(&self, attribute: &str) -> Option<&str> {
        find_value(&self.check, attribute)
    }

    pub fn reply_value(&self, attribute: &str) -> Option<&str> {
        find_value(&self.reply, attribute)
    }
}

pub(crate) fn find_value<'a>(rows: &'a [RadiusAttribute], attribute: &str) -> Option<&'a str> {
    rows.iter()
        .find(|row| row.attribute == attribute)
        .map(|row| row.value.as_str())
}

/// Storage of the attribute tables a RADIUS server consults
///
/// Implementations must apply a [`RadiusChange`] atomically: either every
/// table reflects it or none does.
#[async_trait]
pub trait RadiusBackend: Send + Sync {
    async fn apply(&self, change: &RadiusChange) -> Result<(), StoreError>;

    async fn user_rows(&self, username: &str) -> Result<UserRows, StoreError>;

    async fn group_reply(&self, groupname: &str) -> Result<Vec<RadiusAttribute>, StoreError>;
}
