//! Quota ledger behavior: redemption ownership, metered consumption, and
//! the gateway usage-reporting flow.

mod common;

use std::sync::Arc;

use meshshare_core::error::AppError;
use meshshare_core::models::UsageReporter;
use meshshare_core::store::CodeStore;

use common::{register_provider, test_env};

const MB: u64 = 1 << 20;

#[tokio::test]
async fn redeem_binds_first_writer_and_is_idempotent() {
    let env = test_env();
    let codes = env.quota.issue("prov-1", 100.0, 1, None).await.unwrap();
    let code = &codes[0].code;

    let redeemed = env.quota.redeem(code, "alice").await.unwrap();
    assert_eq!(redeemed.redeemed_by.as_deref(), Some("alice"));
    assert_eq!(redeemed.total_mb, 100.0);
    assert_eq!(redeemed.remaining_mb, 100.0);

    // Same consumer again: no-op success.
    env.quota.redeem(code, "alice").await.unwrap();

    // Different consumer: rejected.
    let err = env.quota.redeem(code, "bob").await.unwrap_err();
    assert!(matches!(err, AppError::CodeAlreadyRedeemed(_)));
}

#[tokio::test]
async fn consume_decrements_and_rejects_overdraw() {
    let env = test_env();
    let codes = env.quota.issue("prov-1", 10.0, 1, None).await.unwrap();
    let code = &codes[0].code;

    let updated = env.quota.consume(code, 4 * MB).await.unwrap();
    assert!((updated.remaining_mb - 6.0).abs() < 1e-9);

    let err = env.quota.consume(code, 7 * MB).await.unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded { .. }));

    // Failed consume must not have mutated the document.
    let current = CodeStore::get(&*env.store, code).await.unwrap().unwrap();
    assert!((current.remaining_mb - 6.0).abs() < 1e-9);

    // Within the 0.01 MB epsilon the decrement clamps to zero.
    let updated = env
        .quota
        .consume(code, 6 * MB + 1024) // 6.0009... MB against 6.0 remaining
        .await
        .unwrap();
    assert_eq!(updated.remaining_mb, 0.0);
}

#[tokio::test]
async fn concurrent_consumes_lose_no_updates() {
    let env = test_env();
    let codes = env.quota.issue("prov-1", 100.0, 1, None).await.unwrap();
    let code = codes[0].code.clone();

    // 50 tasks x 2 MB = exactly the full quota.
    let mut handles = Vec::new();
    for _ in 0..50 {
        let quota = Arc::clone(&env.quota);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            quota.consume(&code, 2 * MB).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let current = CodeStore::get(&*env.store, &code).await.unwrap().unwrap();
    assert!(
        current.remaining_mb.abs() < 0.01,
        "expected ~0 MB remaining, got {}",
        current.remaining_mb
    );

    // The quota invariant held: one more byte is an overdraw.
    let err = env.quota.consume(&code, MB).await.unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded { .. }));
}

#[tokio::test]
async fn expired_and_deactivated_codes_reject_consumption() {
    let env = test_env();

    let codes = env.quota.issue("prov-1", 10.0, 1, Some(-1)).await.unwrap();
    let err = env.quota.consume(&codes[0].code, MB).await.unwrap_err();
    assert!(matches!(err, AppError::CodeExpired(_)));
    let err = env.quota.redeem(&codes[0].code, "alice").await.unwrap_err();
    assert!(matches!(err, AppError::CodeExpired(_)));

    let codes = env.quota.issue("prov-1", 10.0, 1, None).await.unwrap();
    env.quota.deactivate(&codes[0].code).await.unwrap();
    let err = env.quota.consume(&codes[0].code, MB).await.unwrap_err();
    assert!(matches!(err, AppError::CodeNotFound(_)));

    let err = env.quota.consume("ZZZZ9999", MB).await.unwrap_err();
    assert!(matches!(err, AppError::CodeNotFound(_)));
}

#[tokio::test]
async fn balance_sums_active_redeemed_codes() {
    let env = test_env();
    let a = env.quota.issue("prov-1", 50.0, 1, None).await.unwrap();
    let b = env.quota.issue("prov-2", 30.0, 1, None).await.unwrap();

    env.quota.redeem(&a[0].code, "alice").await.unwrap();
    env.quota.redeem(&b[0].code, "alice").await.unwrap();
    env.quota.consume(&a[0].code, 10 * MB).await.unwrap();

    let balance = env.quota.balance("alice").await.unwrap();
    assert!((balance - 70.0).abs() < 1e-9);

    // Deactivated codes drop out of the balance.
    env.quota.deactivate(&b[0].code).await.unwrap();
    let balance = env.quota.balance("alice").await.unwrap();
    assert!((balance - 40.0).abs() < 1e-9);
}

#[tokio::test]
async fn report_usage_credits_provider_points_and_consumer_totals() {
    let env = test_env();
    register_provider(&env, "prov-1", 50.0, 20.0, None).await;
    register_provider(&env, "alice", 0.0, 0.0, None).await;

    let codes = env.quota.issue("prov-1", 100.0, 1, None).await.unwrap();
    env.quota.redeem(&codes[0].code, "alice").await.unwrap();

    let updated = env
        .quota
        .report_usage(&codes[0].code, 5 * MB, None, UsageReporter::Gateway)
        .await
        .unwrap();
    assert!((updated.remaining_mb - 95.0).abs() < 1e-9);

    let provider = env.peers.get("prov-1").await.unwrap();
    assert_eq!(provider.points, 5);
    assert_eq!(provider.total_data_shared, 5 * MB);

    // consumer_id omitted: credit goes to the code's redeemer.
    let consumer = env.peers.get("alice").await.unwrap();
    assert_eq!(consumer.total_data_consumed, 5 * MB);

    let dashboard = env.quota.usage_dashboard("prov-1", 200).await.unwrap();
    assert_eq!(dashboard.total_bytes, 5 * MB);
    assert_eq!(dashboard.logs.len(), 1);
}

#[tokio::test]
async fn report_usage_survives_missing_provider_peer() {
    // The issuing provider never registered as a peer: the decrement and the
    // usage log still land, the points credit is skipped.
    let env = test_env();
    let codes = env.quota.issue("ghost-prov", 10.0, 1, None).await.unwrap();
    env.quota.redeem(&codes[0].code, "alice").await.unwrap();

    let updated = env
        .quota
        .report_usage(&codes[0].code, 2 * MB, None, UsageReporter::Gateway)
        .await
        .unwrap();
    assert!((updated.remaining_mb - 8.0).abs() < 1e-9);

    let dashboard = env.quota.usage_dashboard("ghost-prov", 200).await.unwrap();
    assert_eq!(dashboard.logs.len(), 1);
}

#[tokio::test]
async fn issue_validates_quota_and_count() {
    let env = test_env();
    assert!(matches!(
        env.quota.issue("prov-1", 0.0, 1, None).await.unwrap_err(),
        AppError::Validation(_)
    ));
    assert!(matches!(
        env.quota.issue("prov-1", 10.0, 51, None).await.unwrap_err(),
        AppError::Validation(_)
    ));

    let codes = env.quota.issue("prov-1", 10.0, 5, Some(24)).await.unwrap();
    assert_eq!(codes.len(), 5);
    assert!(codes.iter().all(|c| c.expire_at.is_some()));
    assert_eq!(env.quota.list_codes("prov-1").await.unwrap().len(), 5);
}
