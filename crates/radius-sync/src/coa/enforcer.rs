//! Per-user and bulk session enforcement

use super::{CoaError, CoaOutcome, DisconnectSender, DisconnectTarget, SecretStore};
use crate::session::SessionObserver;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Tally of a [`SessionEnforcer::disconnect_many`] run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkDisconnectReport {
    pub total: usize,
    pub disconnected: usize,
    pub failed: usize,
    pub results: Vec<CoaOutcome>,
}

#[derive(Clone)]
pub struct SessionEnforcer {
    observer: Arc<SessionObserver>,
    secrets: Arc<dyn SecretStore>,
    sender: Arc<dyn DisconnectSender>,
    max_concurrency: usize,
}

impl SessionEnforcer {
    pub fn new(
        observer: Arc<SessionObserver>,
        secrets: Arc<dyn SecretStore>,
        sender: Arc<dyn DisconnectSender>,
        max_concurrency: usize,
    ) -> Self {
        SessionEnforcer {
            observer,
            secrets,
            sender,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn observer(&self) -> &Arc<SessionObserver> {
        &self.observer
    }

    /// Disconnect one explicitly addressed session
    pub async fn disconnect(&self, target: &DisconnectTarget) -> CoaOutcome {
        match self.sender.disconnect(target).await {
            Ok(()) => {
                info!(username = %target.username, nas = %target.nas_ip, "Session disconnected");
                CoaOutcome::succeeded(&target.username, "Disconnect-ACK received")
            }
            Err(e) => {
                warn!(
                    username = %target.username,
                    nas = %target.nas_ip,
                    error = %e,
                    "Disconnect failed"
                );
                CoaOutcome::failed(&target.username, e)
            }
        }
    }

    /// Disconnect every live session of `username`
    ///
    /// A user without a live session counts as a success: there is nothing
    /// left running on the old entitlement.
    pub async fn disconnect_user(&self, username: &str) -> CoaOutcome {
        let sessions = match self.observer.live_sessions_for(username, Utc::now()).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(username = %username, error = %e, "Live session lookup failed");
                return CoaOutcome::failed(username, e);
            }
        };

        if sessions.is_empty() {
            return CoaOutcome::succeeded(username, format!("No active session for {}", username));
        }

        let mut disconnected = 0;
        let mut errors = Vec::new();
        for session in &sessions {
            let secret = match self.secrets.secret_for(session.nas_ip).await {
                Ok(Some(secret)) => secret,
                Ok(None) => {
                    let e = CoaError::UnknownNas(session.nas_ip);
                    warn!(username = %username, nas = %session.nas_ip, "{}", e);
                    errors.push(e.to_string());
                    continue;
                }
                Err(e) => {
                    errors.push(e.to_string());
                    continue;
                }
            };

            let target = DisconnectTarget {
                username: username.to_string(),
                nas_ip: session.nas_ip,
                secret,
                session_id: Some(session.acct_session_id.clone()).filter(|id| !id.is_empty()),
                framed_ip: session.framed_ip,
            };
            let outcome = self.disconnect(&target).await;
            match outcome.error {
                None => disconnected += 1,
                Some(error) => errors.push(error),
            }
        }

        if errors.is_empty() {
            CoaOutcome::succeeded(
                username,
                format!("Disconnected {} session(s)", disconnected),
            )
        } else {
            CoaOutcome::failed(username, errors.join("; "))
        }
    }

    /// Disconnect many users concurrently
    ///
    /// Attempts are independent: one NAS timing out never delays or fails
    /// another user. Duplicate usernames are attempted once. Results keep
    /// the order of first appearance.
    pub async fn disconnect_many(&self, usernames: &[String]) -> BulkDisconnectReport {
        let mut seen = HashSet::new();
        let unique: Vec<String> = usernames
            .iter()
            .filter(|u| seen.insert(u.as_str()))
            .cloned()
            .collect();

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for (index, username) in unique.iter().cloned().enumerate() {
            let enforcer = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, enforcer.disconnect_user(&username).await)
            });
        }

        let mut slots: Vec<Option<CoaOutcome>> = vec![None; unique.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => warn!(error = %e, "Disconnect task aborted"),
            }
        }

        let results: Vec<CoaOutcome> = slots
            .into_iter()
            .zip(&unique)
            .map(|(slot, username)| {
                slot.unwrap_or_else(|| CoaOutcome::failed(username, "disconnect task aborted"))
            })
            .collect();

        let disconnected = results.iter().filter(|r| r.success).count();
        let report = BulkDisconnectReport {
            total: results.len(),
            disconnected,
            failed: results.len() - disconnected,
            results,
        };
        info!(
            total = report.total,
            disconnected = report.disconnected,
            failed = report.failed,
            "Bulk disconnect finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::MemoryBillingStore;
    use crate::coa::RouterSecretStore;
    use crate::model::{AccountingRecord, Router};
    use crate::session::{LivenessPolicy, MemoryAccounting};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<DisconnectTarget>>,
    }

    #[async_trait]
    impl DisconnectSender for RecordingSender {
        async fn disconnect(&self, target: &DisconnectTarget) -> Result<(), CoaError> {
            self.sent.lock().await.push(target.clone());
            Ok(())
        }
    }

    fn live(username: &str, nas: &str) -> AccountingRecord {
        let now = Utc::now();
        AccountingRecord {
            username: username.to_string(),
            acct_session_id: format!("{}-1", username),
            nas_ip: nas.parse().unwrap(),
            framed_ip: Some("100.64.1.2".parse().unwrap()),
            start_time: Some(now - Duration::hours(1)),
            stop_time: None,
            update_time: Some(now - Duration::minutes(2)),
            input_octets: 0,
            output_octets: 0,
        }
    }

    async fn enforcer(records: Vec<AccountingRecord>) -> (SessionEnforcer, Arc<RecordingSender>) {
        let billing = Arc::new(MemoryBillingStore::new());
        billing
            .insert_router(Router {
                id: 1,
                name: "core".to_string(),
                nasname: "10.0.0.1".to_string(),
                secret: "core-secret".to_string(),
            })
            .await;
        let accounting = MemoryAccounting::new();
        for record in records {
            accounting.insert(record).await;
        }

        let observer = Arc::new(SessionObserver::new(
            Arc::new(accounting),
            billing.clone(),
            LivenessPolicy::default(),
        ));
        let secrets = Arc::new(RouterSecretStore::new(billing, HashMap::new()));
        let sender = Arc::new(RecordingSender::default());
        (
            SessionEnforcer::new(observer, secrets, sender.clone(), 4),
            sender,
        )
    }

    #[tokio::test]
    async fn test_no_session_is_success() {
        let (enforcer, sender) = enforcer(Vec::new()).await;
        let outcome = enforcer.disconnect_user("hadi").await;
        assert!(outcome.success);
        assert!(outcome.message.unwrap().contains("No active session"));
        assert!(sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_target_uses_router_secret_and_session_identity() {
        let (enforcer, sender) = enforcer(vec![live("hadi", "10.0.0.1")]).await;
        let outcome = enforcer.disconnect_user("hadi").await;
        assert!(outcome.success, "{:?}", outcome);

        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].secret, "core-secret");
        assert_eq!(sent[0].session_id.as_deref(), Some("hadi-1"));
        assert_eq!(sent[0].framed_ip, Some("100.64.1.2".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_unregistered_nas_fails() {
        let (enforcer, sender) = enforcer(vec![live("indah", "172.16.9.9")]).await;
        let outcome = enforcer.disconnect_user("indah").await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not registered"));
        assert!(sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_many_dedupes_and_keeps_order() {
        let (enforcer, _) = enforcer(vec![live("a", "10.0.0.1"), live("b", "172.16.9.9")]).await;
        let names: Vec<String> = ["b", "a", "b", "c"].iter().map(|s| s.to_string()).collect();

        let report = enforcer.disconnect_many(&names).await;
        assert_eq!(report.total, 3);
        assert_eq!(report.disconnected, 2);
        assert_eq!(report.failed, 1);
        let order: Vec<&str> = report.results.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert!(!report.results[0].success);
    }
}
