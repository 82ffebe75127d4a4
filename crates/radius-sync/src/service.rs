//! Component wiring

use crate::billing::{BillingRepository, PostgresBillingStore};
use crate::coa::{CoaClient, DisconnectSender, RouterSecretStore, SessionEnforcer};
use crate::config::Config;
use crate::error::SyncResult;
use crate::http::AppState;
use crate::orchestrator::Orchestrator;
use crate::radius::{AttributeCompiler, PostgresRadiusStore, RadiusBackend};
use crate::session::{AccountingSource, LivenessPolicy, PostgresAccounting, SessionObserver};
use crate::sync::Synchronizer;
use crate::voucher::VoucherActivator;
use crate::db;
use sqlx::PgPool;
use std::sync::Arc;

/// Every component of the service, sharing one set of backends
#[derive(Clone)]
pub struct Service {
    pub billing: Arc<dyn BillingRepository>,
    pub sync: Arc<Synchronizer>,
    pub vouchers: Arc<VoucherActivator>,
    pub observer: Arc<SessionObserver>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Service {
    pub fn new(
        config: &Config,
        billing: Arc<dyn BillingRepository>,
        radius: Arc<dyn RadiusBackend>,
        accounting: Arc<dyn AccountingSource>,
        sender: Arc<dyn DisconnectSender>,
    ) -> Self {
        let sync = Arc::new(Synchronizer::new(
            billing.clone(),
            radius,
            AttributeCompiler::new(config.attributes.clone()),
        ));
        let vouchers = Arc::new(VoucherActivator::new(billing.clone(), sync.clone()));
        let observer = Arc::new(SessionObserver::new(
            accounting,
            billing.clone(),
            LivenessPolicy::from(&config.session),
        ));
        let secrets = Arc::new(RouterSecretStore::new(
            billing.clone(),
            config.nas_secrets.clone(),
        ));
        let enforcer = SessionEnforcer::new(
            observer.clone(),
            secrets,
            sender,
            config.coa.max_concurrency,
        );
        let orchestrator = Arc::new(Orchestrator::new(
            billing.clone(),
            sync.clone(),
            vouchers.clone(),
            enforcer,
        ));

        Service {
            billing,
            sync,
            vouchers,
            observer,
            orchestrator,
        }
    }

    /// Production wiring: Postgres for every table, UDP for CoA
    pub async fn connect(config: &Config) -> SyncResult<(Self, PgPool)> {
        let pool = db::connect(&config.database).await?;
        let sender = Arc::new(CoaClient::new(&config.coa)?);

        let service = Service::new(
            config,
            Arc::new(PostgresBillingStore::new(pool.clone())),
            Arc::new(PostgresRadiusStore::new(pool.clone())),
            Arc::new(PostgresAccounting::new(pool.clone())),
            sender,
        );
        Ok((service, pool))
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            billing: self.billing.clone(),
            vouchers: self.vouchers.clone(),
            observer: self.observer.clone(),
            orchestrator: self.orchestrator.clone(),
        }
    }
}
