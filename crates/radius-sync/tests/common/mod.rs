//! Shared fixtures: a fully wired service on in-memory backends

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use radius_sync::coa::{CoaError, DisconnectSender, DisconnectTarget};
use radius_sync::model::ValidityUnit;
use radius_sync::{
    AccountingRecord, Config, MemoryAccounting, MemoryBillingStore, MemoryRadiusStore, Profile,
    Router, Service, Subscriber, SubscriberStatus, Voucher, VoucherStatus,
};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const NAS_CORE: &str = "10.0.0.1";
pub const NAS_UNKNOWN: &str = "172.16.9.9";

/// Acknowledges every Disconnect-Request and remembers it
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<DisconnectTarget>>,
}

#[async_trait]
impl DisconnectSender for RecordingSender {
    async fn disconnect(&self, target: &DisconnectTarget) -> Result<(), CoaError> {
        self.sent.lock().await.push(target.clone());
        Ok(())
    }
}

pub struct Harness {
    pub service: Service,
    pub billing: Arc<MemoryBillingStore>,
    pub radius: Arc<MemoryRadiusStore>,
    pub accounting: Arc<MemoryAccounting>,
    pub sender: Arc<RecordingSender>,
}

impl Harness {
    pub async fn new() -> Self {
        let billing = Arc::new(MemoryBillingStore::new());
        let radius = Arc::new(MemoryRadiusStore::new());
        let accounting = Arc::new(MemoryAccounting::new());
        let sender = Arc::new(RecordingSender::default());

        billing.insert_profile(home_profile()).await;
        billing.insert_profile(hotspot_profile()).await;
        billing
            .insert_router(Router {
                id: 1,
                name: "core".to_string(),
                nasname: NAS_CORE.to_string(),
                secret: "core-secret".to_string(),
            })
            .await;

        let service = Service::new(
            &Config::default(),
            billing.clone(),
            radius.clone(),
            accounting.clone(),
            sender.clone(),
        );

        Harness {
            service,
            billing,
            radius,
            accounting,
            sender,
        }
    }

    pub async fn add_subscriber(&self, id: i64, username: &str, ip: Option<&str>) -> Subscriber {
        let subscriber = Subscriber {
            id,
            username: username.to_string(),
            password: format!("{}-pw", username),
            profile_id: 1,
            status: SubscriberStatus::Active,
            ip_address: ip.map(|ip| ip.parse().unwrap()),
            expired_at: None,
            synced_to_radius: false,
            last_sync_at: None,
        };
        self.billing.insert_subscriber(subscriber.clone()).await;
        subscriber
    }

    pub async fn add_voucher(&self, code: &str, agent_id: Option<i64>) -> Voucher {
        let voucher = Voucher {
            code: code.to_string(),
            profile_id: 2,
            status: VoucherStatus::Waiting,
            first_login_at: None,
            expires_at: None,
            batch_code: Some("B-001".to_string()),
            agent_id,
            synced_to_radius: false,
            last_sync_at: None,
        };
        self.billing.insert_voucher(voucher.clone()).await;
        voucher
    }

    pub async fn online(&self, username: &str, nas: &str) {
        self.accounting.insert(live_record(username, nas, Utc::now())).await;
    }
}

pub fn home_profile() -> Profile {
    Profile {
        id: 1,
        name: "Home 20M".to_string(),
        group_name: "home-20m".to_string(),
        rate_limit: Some("20M/20M".to_string()),
        validity_value: 30,
        validity_unit: ValidityUnit::Days,
        shared_users: Some(1),
        selling_price: 0,
        agent_commission: 0,
    }
}

pub fn hotspot_profile() -> Profile {
    Profile {
        id: 2,
        name: "Harian 5M".to_string(),
        group_name: "hotspot-5m".to_string(),
        rate_limit: Some("5M/5M".to_string()),
        validity_value: 1,
        validity_unit: ValidityUnit::Days,
        shared_users: Some(1),
        selling_price: 5000,
        agent_commission: 500,
    }
}

pub fn live_record(username: &str, nas: &str, now: DateTime<Utc>) -> AccountingRecord {
    AccountingRecord {
        username: username.to_string(),
        acct_session_id: format!("{}-sess", username),
        nas_ip: nas.parse().unwrap(),
        framed_ip: Some("100.64.0.10".parse().unwrap()),
        start_time: Some(now - Duration::hours(3)),
        stop_time: None,
        update_time: Some(now - Duration::minutes(1)),
        input_octets: 1024,
        output_octets: 2048,
    }
}
