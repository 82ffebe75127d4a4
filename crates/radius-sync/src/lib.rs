//! RADIUS attribute synchronization and session enforcement
//!
//! Keeps the FreeRADIUS SQL tables (`radcheck`, `radreply`, `radusergroup`,
//! `radgroupreply`) in step with an ISP billing database, and forces live
//! sessions to re-authenticate through RFC 5176 Disconnect-Requests when a
//! subscriber's entitlement changes. Built on the `radius-proto` codec.
//!
//! # Components
//!
//! - [`Synchronizer`]: entitlement → attribute rows, one transaction per username
//! - [`VoucherActivator`]: hotspot voucher WAITING → ACTIVE → EXPIRED
//! - [`SessionObserver`]: live sessions from `radacct`, zombies excluded
//! - [`SessionEnforcer`]: Disconnect-Request client, single and bulk
//! - [`Orchestrator`]: persist → rewrite → disconnect, for single and bulk changes
//!
//! Storage sits behind traits ([`BillingRepository`], [`RadiusBackend`],
//! [`AccountingSource`]) with Postgres and in-memory implementations.
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_sync::{Config, Service, SubscriberStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("radius-sync.json")?;
//!     let (service, _pool) = Service::connect(&config).await?;
//!
//!     let report = service
//!         .orchestrator
//!         .change_status(&[17, 18, 19], SubscriberStatus::Isolated)
//!         .await?;
//!     println!("{} disconnected, {} failed", report.coa.disconnected, report.coa.failed);
//!     Ok(())
//! }
//! ```

pub mod billing;
pub mod coa;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod model;
pub mod orchestrator;
pub mod radius;
pub mod service;
pub mod session;
pub mod sync;
pub mod voucher;

pub use billing::{BillingRepository, MemoryBillingStore, PostgresBillingStore};
pub use coa::{
    BulkDisconnectReport, CoaClient, CoaError, CoaOutcome, DisconnectSender, DisconnectTarget,
    SessionEnforcer,
};
pub use config::{Config, ConfigError};
pub use error::{StoreError, SyncError, SyncResult};
pub use model::{
    AccountingRecord, Profile, Router, Subscriber, SubscriberStatus, ValidityUnit, Voucher,
    VoucherStatus,
};
pub use orchestrator::{BulkStatusReport, ChangeReport, ExpirySweepReport, Orchestrator};
pub use radius::{MemoryRadiusStore, PostgresRadiusStore, RadiusBackend};
pub use service::Service;
pub use session::{AccountingSource, LivenessPolicy, MemoryAccounting, SessionObserver};
pub use sync::{ResyncReport, Synchronizer};
pub use voucher::{PostAuthAction, PostAuthRequest, PostAuthResponse, VoucherActivator};
