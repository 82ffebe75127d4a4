//! RFC 5176 Disconnect-Request client and session enforcement
//!
//! Entitlement changes only take effect for new authentications. To make a
//! status change bite immediately, every live session of the affected user
//! is disconnected so the CPE re-authenticates against the rewritten rows.
//!
//! Disconnection is strictly best effort: failures are reported as
//! [`CoaOutcome`] values and never undo or block the change that triggered
//! them.

pub mod client;
pub mod enforcer;
pub mod secrets;

pub use client::CoaClient;
pub use enforcer::{BulkDisconnectReport, SessionEnforcer};
pub use secrets::{RouterSecretStore, SecretStore};

use async_trait::async_trait;
use serde::Serialize;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Packet error: {0}")]
    Packet(#[from] radius_proto::PacketError),

    #[error("No reply from NAS {nas} after {attempts} attempt(s)")]
    Timeout { nas: IpAddr, attempts: u32 },

    /// Disconnect-NAK, with the decoded Error-Cause
    #[error("NAS refused disconnect: {0}")]
    Nak(String),

    #[error("NAS {0} is not registered")]
    UnknownNas(IpAddr),
}

/// Everything needed to address one session on one NAS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectTarget {
    pub username: String,
    pub nas_ip: IpAddr,
    pub secret: String,
    pub session_id: Option<String>,
    pub framed_ip: Option<IpAddr>,
}

/// Delivers one Disconnect-Request and waits for its verdict
#[async_trait]
pub trait DisconnectSender: Send + Sync {
    /// `Ok` only for a Disconnect-ACK carrying a valid Response Authenticator
    async fn disconnect(&self, target: &DisconnectTarget) -> Result<(), CoaError>;
}

/// Result of enforcing one username
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoaOutcome {
    pub username: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CoaOutcome {
    pub fn succeeded(username: &str, message: impl Into<String>) -> Self {
        CoaOutcome {
            username: username.to_string(),
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(username: &str, error: impl ToString) -> Self {
        CoaOutcome {
            username: username.to_string(),
            success: false,
            message: None,
            error: Some(error.to_string()),
        }
    }
}
