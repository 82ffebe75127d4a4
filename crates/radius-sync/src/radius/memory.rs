//! In-memory FreeRADIUS tables

use super::{
    GroupMembership, MANAGED_CHECK_ATTRIBUTES, MANAGED_REPLY_ATTRIBUTES, RadiusAttribute,
    RadiusBackend, RadiusChange, UserPlan, UserRows,
};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone)]
struct Tables {
    radcheck: HashMap<String, Vec<RadiusAttribute>>,
    radreply: HashMap<String, Vec<RadiusAttribute>>,
    radusergroup: HashMap<String, Vec<GroupMembership>>,
    radgroupreply: HashMap<String, Vec<RadiusAttribute>>,
}

/// In-memory attribute store
///
/// Mirrors the semantics of [`super::PostgresRadiusStore`]: a change is
/// applied to a copy of the tables and swapped in only when complete.
///
/// Writes for usernames registered with [`MemoryRadiusStore::fail_for`] are
/// rejected, which lets tests exercise the drift path.
#[derive(Debug, Clone, Default)]
pub struct MemoryRadiusStore {
    tables: Arc<RwLock<Tables>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl MemoryRadiusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent write for `username`
    pub async fn fail_for(&self, username: &str) {
        self.failing.write().await.insert(username.to_string());
    }

    /// Accept writes for `username` again
    pub async fn recover(&self, username: &str) {
        self.failing.write().await.remove(username);
    }

    /// Seed a row outside the managed set, as another tool would
    pub async fn insert_check(&self, username: &str, attribute: RadiusAttribute) {
        let mut tables = self.tables.write().await;
        tables
            .radcheck
            .entry(username.to_string())
            .or_default()
            .push(attribute);
    }

    /// Number of usernames with at least one row in any table
    pub async fn user_count(&self) -> usize {
        let tables = self.tables.read().await;
        tables
            .radcheck
            .keys()
            .chain(tables.radreply.keys())
            .chain(tables.radusergroup.keys())
            .collect::<HashSet<_>>()
            .len()
    }
}

fn retain_unmanaged(rows: &mut Vec<RadiusAttribute>, managed: &[&str]) {
    rows.retain(|row| !managed.contains(&row.attribute.as_str()));
}

fn put<T>(table: &mut HashMap<String, Vec<T>>, key: &str, rows: Vec<T>) {
    if rows.is_empty() {
        table.remove(key);
    } else {
        table.insert(key.to_string(), rows);
    }
}

impl Tables {
    fn apply(&mut self, change: &RadiusChange) {
        let username = change.username.as_str();
        match &change.user {
            UserPlan::Replace {
                check,
                reply,
                groups,
            } => {
                let mut rows = self.radcheck.remove(username).unwrap_or_default();
                retain_unmanaged(&mut rows, MANAGED_CHECK_ATTRIBUTES);
                rows.extend(check.iter().cloned());
                put(&mut self.radcheck, username, rows);

                let mut rows = self.radreply.remove(username).unwrap_or_default();
                retain_unmanaged(&mut rows, MANAGED_REPLY_ATTRIBUTES);
                rows.extend(reply.iter().cloned());
                put(&mut self.radreply, username, rows);

                put(&mut self.radusergroup, username, groups.clone());
            }
            UserPlan::Purge => {
                self.radcheck.remove(username);
                self.radreply.remove(username);
                self.radusergroup.remove(username);
            }
        }

        if let Some(group) = &change.group {
            put(&mut self.radgroupreply, &group.groupname, group.reply.clone());
        }
        for groupname in &change.drop_groups {
            self.radgroupreply.remove(groupname);
        }
    }
}

#[async_trait]
impl RadiusBackend for MemoryRadiusStore {
    async fn apply(&self, change: &RadiusChange) -> Result<(), StoreError> {
        if self.failing.read().await.contains(&change.username) {
            return Err(StoreError::Unavailable(format!(
                "writes rejected for {}",
                change.username
            )));
        }

        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        next.apply(change);
        *tables = next;
        Ok(())
    }

    async fn user_rows(&self, username: &str) -> Result<UserRows, StoreError> {
        let tables = self.tables.read().await;
        Ok(UserRows {
            check: tables.radcheck.get(username).cloned().unwrap_or_default(),
            reply: tables.radreply.get(username).cloned().unwrap_or_default(),
            groups: tables
                .radusergroup
                .get(username)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn group_reply(&self, groupname: &str) -> Result<Vec<RadiusAttribute>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .radgroupreply
            .get(groupname)
            .cloned()
            .unwrap_or_default())
    }
}
