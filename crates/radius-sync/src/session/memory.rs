//! In-memory accounting log

use super::{AccountingSource, LivenessPolicy};
use crate::error::StoreError;
use crate::model::AccountingRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Accounting rows held in memory, filtered with [`LivenessPolicy::is_live`]
#[derive(Debug, Clone, Default)]
pub struct MemoryAccounting {
    records: Arc<RwLock<Vec<AccountingRecord>>>,
}

impl MemoryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: AccountingRecord) {
        self.records.write().await.push(record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AccountingSource for MemoryAccounting {
    async fn live_sessions(
        &self,
        policy: &LivenessPolicy,
        now: DateTime<Utc>,
        username: Option<&str>,
    ) -> Result<Vec<AccountingRecord>, StoreError> {
        let records = self.records.read().await;
        let mut live: Vec<_> = records
            .iter()
            .filter(|r| username.is_none_or(|u| r.username == u))
            .filter(|r| policy.is_live(r, now))
            .cloned()
            .collect();
        live.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(live)
    }
}
