//! PostgreSQL pool and schema

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

/// Open the shared pool used by every Postgres backend
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    debug!("Creating PostgreSQL connection pool to {}", mask_url(&config.url));

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.timeout))
        .connect(&config.url)
        .await?;

    info!(
        max_connections = config.max_connections,
        "PostgreSQL connection pool created successfully"
    );
    Ok(pool)
}

const SCHEMA: &[&str] = &[
    // FreeRADIUS rlm_sql tables
    r#"
    CREATE TABLE IF NOT EXISTS radcheck (
        id SERIAL PRIMARY KEY,
        username VARCHAR(64) NOT NULL DEFAULT '',
        attribute VARCHAR(64) NOT NULL DEFAULT '',
        op CHAR(2) NOT NULL DEFAULT '==',
        value VARCHAR(253) NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS radcheck_username ON radcheck (username, attribute)",
    r#"
    CREATE TABLE IF NOT EXISTS radreply (
        id SERIAL PRIMARY KEY,
        username VARCHAR(64) NOT NULL DEFAULT '',
        attribute VARCHAR(64) NOT NULL DEFAULT '',
        op CHAR(2) NOT NULL DEFAULT '=',
        value VARCHAR(253) NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS radreply_username ON radreply (username, attribute)",
    r#"
    CREATE TABLE IF NOT EXISTS radusergroup (
        id SERIAL PRIMARY KEY,
        username VARCHAR(64) NOT NULL DEFAULT '',
        groupname VARCHAR(64) NOT NULL DEFAULT '',
        priority INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS radusergroup_username ON radusergroup (username)",
    r#"
    CREATE TABLE IF NOT EXISTS radgroupreply (
        id SERIAL PRIMARY KEY,
        groupname VARCHAR(64) NOT NULL DEFAULT '',
        attribute VARCHAR(64) NOT NULL DEFAULT '',
        op CHAR(2) NOT NULL DEFAULT '=',
        value VARCHAR(253) NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS radgroupreply_groupname ON radgroupreply (groupname, attribute)",
    r#"
    CREATE TABLE IF NOT EXISTS radacct (
        radacctid BIGSERIAL PRIMARY KEY,
        acctsessionid TEXT NOT NULL,
        username TEXT,
        nasipaddress INET NOT NULL,
        framedipaddress INET,
        acctstarttime TIMESTAMP WITH TIME ZONE,
        acctupdatetime TIMESTAMP WITH TIME ZONE,
        acctstoptime TIMESTAMP WITH TIME ZONE,
        acctinputoctets BIGINT,
        acctoutputoctets BIGINT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS radacct_active_user ON radacct (username) WHERE acctstoptime IS NULL",
    // Billing side, restricted to the columns the synchronizer touches
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(100) NOT NULL,
        group_name VARCHAR(64) NOT NULL,
        rate_limit VARCHAR(100),
        validity_value INTEGER NOT NULL DEFAULT 1,
        validity_unit VARCHAR(10) NOT NULL DEFAULT 'DAYS',
        shared_users INTEGER,
        selling_price BIGINT NOT NULL DEFAULT 0,
        agent_commission BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscribers (
        id BIGSERIAL PRIMARY KEY,
        username VARCHAR(64) NOT NULL UNIQUE,
        password VARCHAR(128) NOT NULL,
        profile_id BIGINT NOT NULL REFERENCES profiles (id),
        status VARCHAR(16) NOT NULL DEFAULT 'active',
        ip_address VARCHAR(45),
        expired_at TIMESTAMP WITH TIME ZONE,
        synced_to_radius BOOLEAN NOT NULL DEFAULT false,
        last_sync_at TIMESTAMP WITH TIME ZONE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS hotspot_vouchers (
        code VARCHAR(64) PRIMARY KEY,
        profile_id BIGINT NOT NULL REFERENCES profiles (id),
        status VARCHAR(16) NOT NULL DEFAULT 'WAITING',
        first_login_at TIMESTAMP WITH TIME ZONE,
        expires_at TIMESTAMP WITH TIME ZONE,
        batch_code VARCHAR(64),
        agent_id BIGINT,
        synced_to_radius BOOLEAN NOT NULL DEFAULT false,
        last_sync_at TIMESTAMP WITH TIME ZONE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS hotspot_vouchers_active ON hotspot_vouchers (expires_at) WHERE status = 'ACTIVE'",
    r#"
    CREATE TABLE IF NOT EXISTS routers (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(100) NOT NULL,
        nasname VARCHAR(128) NOT NULL,
        secret VARCHAR(64) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_transactions (
        id BIGSERIAL PRIMARY KEY,
        reference VARCHAR(100) NOT NULL UNIQUE,
        kind VARCHAR(10) NOT NULL,
        category VARCHAR(50) NOT NULL,
        amount BIGINT NOT NULL,
        description TEXT NOT NULL,
        agent_id BIGINT,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
];

/// Create every table the service reads or writes, if missing
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = SCHEMA.len(), "Database schema is up to date");
    Ok(())
}

/// Mask credentials in a database URL for logging
pub fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..=scheme_end + 2];
            let host_part = &url[at_pos..];
            format!("{}***:***{}", scheme, host_part)
        } else {
            "***:***@***".to_string()
        }
    } else {
        url.to_string()
    }
}
