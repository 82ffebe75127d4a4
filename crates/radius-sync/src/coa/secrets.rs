//! Shared-secret lookup for Disconnect-Request signing

use crate::billing::BillingRepository;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Secret for the NAS at `nas_ip`; `None` when the NAS is not registered
    async fn secret_for(&self, nas_ip: IpAddr) -> Result<Option<String>, StoreError>;
}

/// Resolves secrets from the router table
///
/// `overrides`, keyed by `nasname` (or by the bare NAS address), win over
/// the secret stored on the router row. An address with neither a router
/// nor an override is unregistered.
pub struct RouterSecretStore {
    billing: Arc<dyn BillingRepository>,
    overrides: HashMap<String, String>,
}

impl RouterSecretStore {
    pub fn new(billing: Arc<dyn BillingRepository>, overrides: HashMap<String, String>) -> Self {
        RouterSecretStore { billing, overrides }
    }
}

#[async_trait]
impl SecretStore for RouterSecretStore {
    async fn secret_for(&self, nas_ip: IpAddr) -> Result<Option<String>, StoreError> {
        if let Some(router) = self.billing.router_for_nas(nas_ip).await? {
            let secret = self
                .overrides
                .get(&router.nasname)
                .cloned()
                .unwrap_or(router.secret);
            return Ok(Some(secret).filter(|s| !s.is_empty()));
        }
        Ok(self.overrides.get(&nas_ip.to_string()).cloned())
    }
}
