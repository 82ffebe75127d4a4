//! End-to-end synchronization flows on in-memory backends
//!
//! Covers status changes, voucher activation through the post-auth hook,
//! zombie filtering and bulk enforcement.

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{Harness, NAS_CORE, NAS_UNKNOWN};
use radius_sync::radius::{CLEARTEXT_PASSWORD, FRAMED_IP_ADDRESS, SESSION_TIMEOUT};
use radius_sync::{
    AccountingRecord, BillingRepository, PostAuthAction, PostAuthRequest, RadiusBackend,
    SubscriberStatus, SyncError, VoucherStatus,
};
use std::collections::HashSet;

fn accept(code: &str) -> PostAuthRequest {
    PostAuthRequest {
        username: code.to_string(),
        reply: "Access-Accept".to_string(),
    }
}

#[tokio::test]
async fn test_active_subscriber_gets_profile_group_only() {
    let h = Harness::new().await;
    let sub = h.add_subscriber(1, "budi", Some("100.64.5.5")).await;

    h.service
        .sync
        .sync_subscriber(&sub, SubscriberStatus::Active)
        .await
        .unwrap();

    let rows = h.radius.user_rows("budi").await.unwrap();
    assert_eq!(rows.groups.len(), 1);
    assert_eq!(rows.groups[0].groupname, "home-20m");
    assert_eq!(rows.check_value(CLEARTEXT_PASSWORD), Some("budi-pw"));
    assert_eq!(rows.reply_value(FRAMED_IP_ADDRESS), Some("100.64.5.5"));

    let stored = h.billing.subscriber(1).await.unwrap().unwrap();
    assert!(stored.synced_to_radius);
    assert!(stored.last_sync_at.is_some());
}

#[tokio::test]
async fn test_isolation_drops_static_ip_and_keeps_password() {
    let h = Harness::new().await;
    let sub = h.add_subscriber(1, "budi", Some("100.64.5.5")).await;
    h.service
        .sync
        .sync_subscriber(&sub, SubscriberStatus::Active)
        .await
        .unwrap();

    h.service
        .sync
        .sync_subscriber(&sub, SubscriberStatus::Isolated)
        .await
        .unwrap();

    let rows = h.radius.user_rows("budi").await.unwrap();
    assert_eq!(rows.reply_value(FRAMED_IP_ADDRESS), None);
    assert_eq!(rows.check_value(CLEARTEXT_PASSWORD), Some("budi-pw"));
    let groups: Vec<&str> = rows.groups.iter().map(|g| g.groupname.as_str()).collect();
    assert_eq!(groups, vec!["isolir"]);
}

#[tokio::test]
async fn test_block_purges_every_row() {
    let h = Harness::new().await;
    let sub = h.add_subscriber(1, "budi", Some("100.64.5.5")).await;
    h.service
        .sync
        .sync_subscriber(&sub, SubscriberStatus::Active)
        .await
        .unwrap();

    h.service
        .sync
        .sync_subscriber(&sub, SubscriberStatus::Blocked)
        .await
        .unwrap();

    assert!(h.radius.user_rows("budi").await.unwrap().is_empty());
    assert_eq!(h.radius.user_count().await, 0);
}

#[tokio::test]
async fn test_reactivation_restores_rows() {
    let h = Harness::new().await;
    h.add_subscriber(1, "budi", None).await;

    h.service
        .orchestrator
        .set_status(1, SubscriberStatus::Blocked)
        .await
        .unwrap();
    let report = h
        .service
        .orchestrator
        .set_status(1, SubscriberStatus::Active)
        .await
        .unwrap();

    assert!(report.synced);
    let rows = h.radius.user_rows("budi").await.unwrap();
    assert_eq!(rows.groups[0].groupname, "home-20m");
}

#[tokio::test]
async fn test_voucher_first_login_then_allow_unchanged() {
    let h = Harness::new().await;
    h.add_voucher("K7P2QX", Some(9)).await;
    let t = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();

    let first = h
        .service
        .vouchers
        .handle_post_auth(&accept("K7P2QX"), t)
        .await
        .unwrap();
    assert_eq!(first.action, PostAuthAction::FirstLogin);
    assert_eq!(first.expires_at, Some(t + Duration::seconds(86_400)));

    let later = t + Duration::hours(2);
    let second = h
        .service
        .vouchers
        .handle_post_auth(&accept("K7P2QX"), later)
        .await
        .unwrap();
    assert_eq!(second.action, PostAuthAction::Allow);
    assert_eq!(second.expires_at, first.expires_at);

    let voucher = h.billing.voucher("K7P2QX").await.unwrap().unwrap();
    assert_eq!(voucher.status, VoucherStatus::Active);
    assert_eq!(voucher.first_login_at, Some(t));

    // Sale plus agent commission, booked once
    assert_eq!(h.billing.ledger().await.len(), 2);
}

#[tokio::test]
async fn test_voucher_past_expiry_is_rejected_and_removed() {
    let h = Harness::new().await;
    let voucher = h.add_voucher("Z9Z9Z9", None).await;
    h.service.orchestrator.voucher_saved("Z9Z9Z9").await.unwrap();
    assert!(!h.radius.user_rows("Z9Z9Z9").await.unwrap().is_empty());

    let t = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    h.service
        .vouchers
        .handle_post_auth(&accept(&voucher.code), t)
        .await
        .unwrap();

    let response = h
        .service
        .vouchers
        .handle_post_auth(&accept(&voucher.code), t + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(response.action, PostAuthAction::Reject);

    let stored = h.billing.voucher("Z9Z9Z9").await.unwrap().unwrap();
    assert_eq!(stored.status, VoucherStatus::Expired);
    assert!(h.radius.user_rows("Z9Z9Z9").await.unwrap().is_empty());
    assert!(
        h.radius
            .group_reply("Harian_5M_Z9Z9Z9")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_voucher_group_carries_session_timeout() {
    let h = Harness::new().await;
    h.add_voucher("AB12CD", None).await;

    h.service.orchestrator.voucher_saved("AB12CD").await.unwrap();

    let reply = h.radius.group_reply("Harian_5M_AB12CD").await.unwrap();
    let timeout = reply
        .iter()
        .find(|row| row.attribute == SESSION_TIMEOUT)
        .map(|row| row.value.as_str());
    assert_eq!(timeout, Some("86400"));
}

#[tokio::test]
async fn test_zombie_sessions_are_not_online() {
    let h = Harness::new().await;
    let now = Utc::now();

    h.accounting
        .insert(AccountingRecord {
            update_time: Some(now - Duration::minutes(14)),
            start_time: Some(now - Duration::hours(20)),
            ..common::live_record("zombie", NAS_CORE, now)
        })
        .await;
    h.accounting
        .insert(AccountingRecord {
            update_time: None,
            start_time: Some(now - Duration::hours(2)),
            ..common::live_record("quiet", NAS_CORE, now)
        })
        .await;

    let summary = h.service.observer.online_sessions(now).await.unwrap();
    let names: Vec<&str> = summary.sessions.iter().map(|s| s.username.as_str()).collect();
    assert_eq!(names, vec!["quiet"]);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.sessions[0].router_name.as_deref(), Some("core"));
}

#[tokio::test]
async fn test_disconnect_without_session_succeeds() {
    let h = Harness::new().await;
    h.add_subscriber(1, "sari", None).await;

    let outcome = h
        .service
        .orchestrator
        .enforcer()
        .disconnect_user("sari")
        .await;

    assert!(outcome.success);
    assert!(outcome.message.unwrap().contains("No active session"));
    assert!(h.sender.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_bulk_isolation_with_one_unregistered_nas() {
    let h = Harness::new().await;
    h.add_subscriber(1, "andi", Some("100.64.1.1")).await;
    h.add_subscriber(2, "dewi", None).await;
    h.add_subscriber(3, "joko", None).await;
    h.online("andi", NAS_CORE).await;
    h.online("dewi", NAS_CORE).await;
    h.online("joko", NAS_UNKNOWN).await;

    let report = h
        .service
        .orchestrator
        .change_status(&[1, 2, 3], SubscriberStatus::Isolated)
        .await
        .unwrap();

    assert_eq!(report.updated, 3);
    assert_eq!(report.synced, 3);
    assert_eq!(report.coa.total, 3);
    assert_eq!(report.coa.disconnected, 2);
    assert_eq!(report.coa.failed, 1);
    let failed: Vec<&str> = report
        .coa
        .results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.username.as_str())
        .collect();
    assert_eq!(failed, vec!["joko"]);

    for id in 1..=3 {
        let sub = h.billing.subscriber(id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriberStatus::Isolated);
        let rows = h.radius.user_rows(&sub.username).await.unwrap();
        assert_eq!(rows.groups[0].groupname, "isolir");
    }
    assert_eq!(h.sender.sent.lock().await.len(), 2);
}

#[tokio::test]
async fn test_bulk_change_survives_sync_failure() {
    let h = Harness::new().await;
    h.add_subscriber(1, "andi", None).await;
    h.add_subscriber(2, "dewi", None).await;
    h.online("dewi", NAS_CORE).await;
    h.radius.fail_for("dewi").await;

    let report = h
        .service
        .orchestrator
        .change_status(&[1, 2], SubscriberStatus::Blocked)
        .await
        .unwrap();

    assert_eq!(report.updated, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.sync_failed, vec!["dewi".to_string()]);
    // The drifted subscriber keeps its session until its rows are rewritten
    assert_eq!(report.coa.total, 1);
    assert_eq!(report.coa.results[0].username, "andi");
    assert!(h.sender.sent.lock().await.is_empty());

    let drifted = h.billing.subscriber(2).await.unwrap().unwrap();
    assert_eq!(drifted.status, SubscriberStatus::Blocked);
    assert!(!drifted.synced_to_radius);

    h.radius.recover("dewi").await;
    let resync = h.service.sync.resync_drifted().await.unwrap();
    assert_eq!(resync.subscribers_synced, 1);
    assert_eq!(resync.failed(), 0);
    assert!(h.radius.user_rows("dewi").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_rewrite_leaves_session_on_old_rows() {
    let h = Harness::new().await;
    let sub = h.add_subscriber(1, "andi", None).await;
    h.service
        .sync
        .sync_subscriber(&sub, SubscriberStatus::Active)
        .await
        .unwrap();
    h.online("andi", NAS_CORE).await;
    h.radius.fail_for("andi").await;

    let bulk = h
        .service
        .orchestrator
        .change_status(&[1], SubscriberStatus::Blocked)
        .await
        .unwrap();
    assert_eq!(bulk.sync_failed, vec!["andi".to_string()]);
    assert_eq!(bulk.coa.total, 0);

    let single = h
        .service
        .orchestrator
        .set_status(1, SubscriberStatus::Blocked)
        .await
        .unwrap();
    assert!(!single.synced);
    assert!(!single.coa.success);
    assert!(single.coa.error.unwrap().contains("not rewritten"));

    assert!(h.sender.sent.lock().await.is_empty());
    let rows = h.radius.user_rows("andi").await.unwrap();
    assert_eq!(rows.check_value(CLEARTEXT_PASSWORD), Some("andi-pw"));
}

#[tokio::test]
async fn test_failed_voucher_rewrite_is_not_disconnected() {
    let h = Harness::new().await;
    h.add_voucher("FA1L00", None).await;
    h.online("FA1L00", NAS_CORE).await;
    h.radius.fail_for("FA1L00").await;

    let report = h.service.orchestrator.voucher_saved("FA1L00").await.unwrap();

    assert!(!report.synced);
    assert!(!report.coa.success);
    assert!(h.sender.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_empty_bulk_request_is_rejected() {
    let h = Harness::new().await;
    let err = h
        .service
        .orchestrator
        .change_status(&[], SubscriberStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[tokio::test]
async fn test_deleted_subscriber_loses_rows_and_session() {
    let h = Harness::new().await;
    h.add_subscriber(1, "rina", None).await;
    h.service.orchestrator.subscriber_saved(1).await.unwrap();
    h.online("rina", NAS_CORE).await;

    let report = h.service.orchestrator.subscriber_deleted(1).await.unwrap();

    assert!(report.synced);
    assert!(report.coa.success);
    assert!(h.billing.subscriber(1).await.unwrap().is_none());
    assert!(h.radius.user_rows("rina").await.unwrap().is_empty());
    assert_eq!(h.sender.sent.lock().await[0].username, "rina");
}

#[tokio::test]
async fn test_expiry_sweep_cuts_overdue_vouchers() {
    let h = Harness::new().await;
    h.add_voucher("OLD001", None).await;
    let t = Utc::now() - Duration::days(3);
    h.service
        .vouchers
        .handle_post_auth(&accept("OLD001"), t)
        .await
        .unwrap();
    h.online("OLD001", NAS_CORE).await;

    let report = h
        .service
        .orchestrator
        .expire_overdue_vouchers(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.expired, 1);
    assert_eq!(report.coa.disconnected, 1);
    let voucher = h.billing.voucher("OLD001").await.unwrap().unwrap();
    assert_eq!(voucher.status, VoucherStatus::Expired);
}

#[tokio::test]
async fn test_expiry_sweep_skips_unpurged_vouchers() {
    let h = Harness::new().await;
    h.add_voucher("OLD001", None).await;
    h.add_voucher("OLD002", None).await;
    let t = Utc::now() - Duration::days(3);
    for code in ["OLD001", "OLD002"] {
        h.service
            .vouchers
            .handle_post_auth(&accept(code), t)
            .await
            .unwrap();
        h.online(code, NAS_CORE).await;
    }
    h.radius.fail_for("OLD002").await;

    let report = h
        .service
        .orchestrator
        .expire_overdue_vouchers(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.expired, 2);
    assert_eq!(report.purge_failed, vec!["OLD002".to_string()]);
    assert_eq!(report.coa.total, 1);
    let sent = h.sender.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].username, "OLD001");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_logins_activate_once() {
    let h = Harness::new().await;
    h.add_voucher("RACE01", Some(4)).await;
    let t = Utc.with_ymd_and_hms(2026, 5, 2, 19, 30, 0).unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
        let vouchers = h.service.vouchers.clone();
        tasks.spawn(async move {
            vouchers
                .handle_post_auth(&accept("RACE01"), t + Duration::milliseconds(i))
                .await
                .unwrap()
        });
    }

    let mut responses = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        responses.push(joined.unwrap());
    }

    let first = responses
        .iter()
        .filter(|r| r.action == PostAuthAction::FirstLogin)
        .count();
    let allowed = responses
        .iter()
        .filter(|r| r.action == PostAuthAction::Allow)
        .count();
    assert_eq!(first, 1);
    assert_eq!(allowed, 7);

    let expiries: HashSet<_> = responses.iter().map(|r| r.expires_at).collect();
    assert_eq!(expiries.len(), 1);
    assert!(expiries.iter().all(Option::is_some));
    assert_eq!(h.billing.ledger().await.len(), 2);
}
