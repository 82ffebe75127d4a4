//! PostgreSQL billing store

use super::BillingRepository;
use crate::error::StoreError;
use crate::model::{
    LedgerEntry, Profile, ProfileId, Router, Subscriber, SubscriberId, SubscriberStatus, Voucher,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::str::FromStr;

const SUBSCRIBER_COLUMNS: &str = "id, username, password, profile_id, status, ip_address, \
     expired_at, synced_to_radius, last_sync_at";

const VOUCHER_COLUMNS: &str = "code, profile_id, status, first_login_at, expires_at, \
     batch_code, agent_id, synced_to_radius, last_sync_at";

pub struct PostgresBillingStore {
    pool: PgPool,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresBillingStore { pool }
    }
}

fn parse_column<T: FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(StoreError::Corrupt)
}

fn subscriber_from_row(row: &PgRow) -> Result<Subscriber, StoreError> {
    let ip_address = row
        .try_get::<Option<String>, _>("ip_address")?
        .filter(|ip| !ip.trim().is_empty())
        .map(|ip| {
            ip.trim()
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("invalid static IP '{}'", ip)))
        })
        .transpose()?;

    Ok(Subscriber {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        profile_id: row.try_get("profile_id")?,
        status: parse_column::<SubscriberStatus>(row, "status")?,
        ip_address,
        expired_at: row.try_get("expired_at")?,
        synced_to_radius: row.try_get("synced_to_radius")?,
        last_sync_at: row.try_get("last_sync_at")?,
    })
}

fn voucher_from_row(row: &PgRow) -> Result<Voucher, StoreError> {
    Ok(Voucher {
        code: row.try_get("code")?,
        profile_id: row.try_get("profile_id")?,
        status: parse_column(row, "status")?,
        first_login_at: row.try_get("first_login_at")?,
        expires_at: row.try_get("expires_at")?,
        batch_code: row.try_get("batch_code")?,
        agent_id: row.try_get("agent_id")?,
        synced_to_radius: row.try_get("synced_to_radius")?,
        last_sync_at: row.try_get("last_sync_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<Profile, StoreError> {
    let validity_value: i32 = row.try_get("validity_value")?;
    let shared_users: Option<i32> = row.try_get("shared_users")?;

    Ok(Profile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        group_name: row.try_get("group_name")?,
        rate_limit: row.try_get("rate_limit")?,
        validity_value: u32::try_from(validity_value)
            .map_err(|_| StoreError::Corrupt(format!("negative validity {}", validity_value)))?,
        validity_unit: parse_column(row, "validity_unit")?,
        shared_users: shared_users.and_then(|n| u32::try_from(n).ok()),
        selling_price: row.try_get("selling_price")?,
        agent_commission: row.try_get("agent_commission")?,
    })
}

#[async_trait]
impl BillingRepository for PostgresBillingStore {
    async fn subscriber(&self, id: SubscriberId) -> Result<Option<Subscriber>, StoreError> {
        let sql = format!("SELECT {} FROM subscribers WHERE id = $1", SUBSCRIBER_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(subscriber_from_row)
            .transpose()
    }

    async fn subscribers(&self, ids: &[SubscriberId]) -> Result<Vec<Subscriber>, StoreError> {
        let sql = format!(
            "SELECT {} FROM subscribers WHERE id = ANY($1) ORDER BY id",
            SUBSCRIBER_COLUMNS
        );
        sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(subscriber_from_row)
            .collect()
    }

    async fn subscriber_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Subscriber>, StoreError> {
        let sql = format!(
            "SELECT {} FROM subscribers WHERE username = $1",
            SUBSCRIBER_COLUMNS
        );
        sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(subscriber_from_row)
            .transpose()
    }

    async fn update_subscriber_status(
        &self,
        ids: &[SubscriberId],
        status: SubscriberStatus,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE subscribers SET status = $1 WHERE id = ANY($2)")
            .bind(status.as_str())
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_subscriber(&self, id: SubscriberId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_subscriber_sync(
        &self,
        id: SubscriberId,
        synced: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE subscribers SET synced_to_radius = $1, last_sync_at = $2 WHERE id = $3")
            .bind(synced)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn drifted_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let sql = format!(
            "SELECT {} FROM subscribers WHERE NOT synced_to_radius ORDER BY id",
            SUBSCRIBER_COLUMNS
        );
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(subscriber_from_row)
            .collect()
    }

    async fn profile(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, name, group_name, rate_limit, validity_value, validity_unit,
                   shared_users, selling_price, agent_commission
            FROM profiles WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(profile_from_row)
        .transpose()
    }

    async fn voucher(&self, code: &str) -> Result<Option<Voucher>, StoreError> {
        let sql = format!("SELECT {} FROM hotspot_vouchers WHERE code = $1", VOUCHER_COLUMNS);
        sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(voucher_from_row)
            .transpose()
    }

    async fn voucher_codes(&self, usernames: &[String]) -> Result<HashSet<String>, StoreError> {
        if usernames.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query("SELECT code FROM hotspot_vouchers WHERE code = ANY($1)")
            .bind(usernames)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("code").map_err(StoreError::from))
            .collect()
    }

    async fn activate_voucher(
        &self,
        code: &str,
        first_login_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // The IS NULL guard makes concurrent first logins race on the row lock;
        // exactly one of them sees rows_affected = 1
        let result = sqlx::query(
            r#"
            UPDATE hotspot_vouchers
            SET status = 'ACTIVE', first_login_at = $1, expires_at = $2
            WHERE code = $3 AND first_login_at IS NULL
            "#,
        )
        .bind(first_login_at)
        .bind(expires_at)
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire_voucher(&self, code: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE hotspot_vouchers SET status = 'EXPIRED' WHERE code = $1 AND status <> 'EXPIRED'",
        )
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn overdue_vouchers(&self, now: DateTime<Utc>) -> Result<Vec<Voucher>, StoreError> {
        let sql = format!(
            "SELECT {} FROM hotspot_vouchers WHERE status = 'ACTIVE' AND expires_at < $1 ORDER BY code",
            VOUCHER_COLUMNS
        );
        sqlx::query(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(voucher_from_row)
            .collect()
    }

    async fn record_voucher_sync(
        &self,
        code: &str,
        synced: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE hotspot_vouchers SET synced_to_radius = $1, last_sync_at = $2 WHERE code = $3",
        )
        .bind(synced)
        .bind(at)
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn drifted_vouchers(&self) -> Result<Vec<Voucher>, StoreError> {
        let sql = format!(
            "SELECT {} FROM hotspot_vouchers WHERE NOT synced_to_radius ORDER BY code",
            VOUCHER_COLUMNS
        );
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(voucher_from_row)
            .collect()
    }

    async fn routers(&self) -> Result<Vec<Router>, StoreError> {
        let rows = sqlx::query("SELECT id, name, nasname, secret FROM routers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Router, StoreError> {
                Ok(Router {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    nasname: row.try_get("nasname")?,
                    secret: row.try_get("secret")?,
                })
            })
            .collect()
    }

    async fn ledger_entry_exists(&self, reference: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM ledger_transactions WHERE reference = $1) AS present",
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("present")?)
    }

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_transactions
                (reference, kind, category, amount, description, agent_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(&entry.reference)
        .bind(entry.kind.as_str())
        .bind(&entry.category)
        .bind(entry.amount)
        .bind(&entry.description)
        .bind(entry.agent_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
