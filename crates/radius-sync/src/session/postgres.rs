//! `radacct` reader
//!
//! The liveness rule is pushed into SQL so that a table with millions of
//! closed rows is filtered by the `acctstoptime IS NULL` partial index.

use super::{AccountingSource, LivenessPolicy};
use crate::error::StoreError;
use crate::model::AccountingRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::net::IpAddr;

const LIVE_SESSIONS_QUERY: &str = r#"
    SELECT username,
           acctsessionid,
           host(nasipaddress) AS nas_ip,
           host(framedipaddress) AS framed_ip,
           acctstarttime,
           acctupdatetime,
           acctstoptime,
           COALESCE(acctinputoctets, 0) AS input_octets,
           COALESCE(acctoutputoctets, 0) AS output_octets
    FROM radacct
    WHERE acctstoptime IS NULL
      AND username IS NOT NULL
      AND (
            (acctupdatetime IS NOT NULL AND acctupdatetime >= $1)
         OR (acctupdatetime IS NULL AND acctstarttime >= $2)
      )
      AND ($3::text IS NULL OR username = $3)
    ORDER BY acctstarttime DESC NULLS LAST
"#;

pub struct PostgresAccounting {
    pool: PgPool,
}

impl PostgresAccounting {
    pub fn new(pool: PgPool) -> Self {
        PostgresAccounting { pool }
    }
}

fn parse_ip(raw: &str) -> Result<IpAddr, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("invalid address in radacct: '{}'", raw)))
}

fn record_from_row(row: &PgRow) -> Result<AccountingRecord, StoreError> {
    let nas_ip: String = row.try_get("nas_ip")?;
    let framed_ip: Option<String> = row.try_get("framed_ip")?;

    Ok(AccountingRecord {
        username: row.try_get("username")?,
        acct_session_id: row.try_get("acctsessionid")?,
        nas_ip: parse_ip(&nas_ip)?,
        framed_ip: framed_ip.as_deref().map(parse_ip).transpose()?,
        start_time: row.try_get("acctstarttime")?,
        stop_time: row.try_get("acctstoptime")?,
        update_time: row.try_get("acctupdatetime")?,
        input_octets: row.try_get("input_octets")?,
        output_octets: row.try_get("output_octets")?,
    })
}

#[async_trait]
impl AccountingSource for PostgresAccounting {
    async fn live_sessions(
        &self,
        policy: &LivenessPolicy,
        now: DateTime<Utc>,
        username: Option<&str>,
    ) -> Result<Vec<AccountingRecord>, StoreError> {
        sqlx::query(LIVE_SESSIONS_QUERY)
            .bind(policy.interim_cutoff(now))
            .bind(policy.start_cutoff(now))
            .bind(username)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(record_from_row)
            .collect()
    }
}
