//! Error types shared across the synchronizer, voucher and enforcement code

use crate::config::ConfigError;
use thiserror::Error;

/// Failure of a storage backend (billing tables, FreeRADIUS tables, radacct)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend refused or could not perform the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be mapped onto the domain model
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Error taxonomy of the synchronization core
///
/// `NotFound` and `Validation` abort the operation. `SyncDrift` and
/// `Protocol` are recoverable: the entitlement change that triggered them has
/// already been persisted and is never rolled back.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation error: {0}")]
    Validation(String),

    /// Attribute rows could not be written after the entity write succeeded
    #[error("RADIUS attributes out of sync for {username}: {source}")]
    SyncDrift {
        username: String,
        #[source]
        source: StoreError,
    },

    /// Disconnect-Request could not be delivered or was refused
    #[error("CoA error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SyncError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        SyncError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Whether the caller's primary write stands despite this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::SyncDrift { .. } | SyncError::Protocol(_))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Store(StoreError::Database(err))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
