// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Ingestion Pipeline
//!
//! Tests critical boundary conditions in:
//! - Signature verification (PAY-S01 to PAY-S05)
//! - Event normalization (PAY-N01 to PAY-N07)
//! - Idempotency ledger (PAY-I01 to PAY-I03)
//! - Reconciliation (PAY-X01 to PAY-X02)

#[cfg(test)]
mod signature_edge_cases {
    use crate::signature::{compute, is_fresh, verify, REPLAY_WINDOW};
    use time::{Duration, OffsetDateTime};

    const SECRET: &str = "whsec_edge";

    // =========================================================================
    // PAY-S01: Empty body still signs and verifies deterministically
    // =========================================================================
    #[test]
    fn test_empty_body_verifies() {
        let sig = compute(b"", SECRET).unwrap();
        assert!(verify(b"", &sig, SECRET));
        assert!(!verify(b"x", &sig, SECRET));
    }

    // =========================================================================
    // PAY-S02: Signature over UTF-8 body bytes, not any re-serialization
    // =========================================================================
    #[test]
    fn test_unicode_body_byte_exact() {
        let body = "{\"note\":\"caf\u{00e9} \u{1f4b0}\"}".as_bytes();
        let sig = compute(body, SECRET).unwrap();
        assert!(verify(body, &sig, SECRET));
        // Re-serialized body with different whitespace must fail
        assert!(!verify("{ \"note\": \"caf\u{00e9} \u{1f4b0}\" }".as_bytes(), &sig, SECRET));
    }

    // =========================================================================
    // PAY-S03: Uppercase hex digests are accepted
    // =========================================================================
    #[test]
    fn test_uppercase_hex_accepted() {
        let sig = compute(b"body", SECRET).unwrap().to_uppercase();
        assert!(verify(b"body", &sig, SECRET));
    }

    // =========================================================================
    // PAY-S04: Surrounding whitespace in the header is tolerated
    // =========================================================================
    #[test]
    fn test_header_whitespace_trimmed() {
        let sig = format!("sha256= {} ", compute(b"body", SECRET).unwrap());
        assert!(verify(b"body", &sig, SECRET));
    }

    // =========================================================================
    // PAY-S05: Timestamp exactly at the window edge is still fresh
    // =========================================================================
    #[test]
    fn test_window_edge_inclusive() {
        let now = OffsetDateTime::now_utc();
        assert!(is_fresh(now - REPLAY_WINDOW, now, REPLAY_WINDOW));
        assert!(!is_fresh(
            now - REPLAY_WINDOW - Duration::seconds(1),
            now,
            REPLAY_WINDOW
        ));
    }
}

#[cfg(test)]
mod normalization_edge_cases {
    use crate::event::{normalize, EventStatus};
    use rust_decimal::Decimal;
    use serde_json::json;

    // =========================================================================
    // PAY-N01: Zero amount is valid (free promotional transactions)
    // =========================================================================
    #[test]
    fn test_zero_amount_accepted() {
        let event = normalize(&json!({
            "type": "payment.completed",
            "data": {"id": "evt_z", "amount": "0.00", "created_at": "2026-08-23T12:00:00Z"}
        }))
        .unwrap();
        assert_eq!(event.amount, Decimal::ZERO);
    }

    // =========================================================================
    // PAY-N02: Batch envelope processes the first element only
    // =========================================================================
    #[test]
    fn test_batch_takes_first_element() {
        let event = normalize(&json!({
            "topic": "payment_completed",
            "timestamp": 1756000000,
            "data": [
                {"id": "evt_first", "amount": "1.00"},
                {"id": "evt_second", "amount": "2.00"}
            ]
        }))
        .unwrap();
        assert_eq!(event.event_id, "evt_first");
    }

    // =========================================================================
    // PAY-N03: topic present but timestamp absent falls back to legacy rules
    // =========================================================================
    #[test]
    fn test_topic_without_timestamp_is_legacy() {
        // No `type` field either, so legacy validation rejects it
        let err = normalize(&json!({
            "topic": "payment_completed",
            "data": [{"id": "evt_1", "amount": "1.00"}]
        }));
        assert!(err.is_err());
    }

    // =========================================================================
    // PAY-N04: Explicit status field takes precedence over the event type
    // =========================================================================
    #[test]
    fn test_status_field_overrides_type() {
        let event = normalize(&json!({
            "type": "payment.completed",
            "data": {
                "id": "evt_s",
                "amount": "1.00",
                "status": "pending",
                "created_at": "2026-08-23T12:00:00Z"
            }
        }))
        .unwrap();
        assert_eq!(event.status, EventStatus::Pending);
    }

    // =========================================================================
    // PAY-N05: Batch data that is not an array is rejected
    // =========================================================================
    #[test]
    fn test_batch_non_array_data_rejected() {
        assert!(normalize(&json!({
            "topic": "payment_completed",
            "timestamp": 1756000000,
            "data": {"id": "evt_1"}
        }))
        .is_err());
    }

    // =========================================================================
    // PAY-N06: Empty-string event id is treated as missing
    // =========================================================================
    #[test]
    fn test_empty_event_id_rejected() {
        assert!(normalize(&json!({
            "type": "payment.completed",
            "data": {"id": "", "amount": "1.00", "created_at": "2026-08-23T12:00:00Z"}
        }))
        .is_err());
    }

    // =========================================================================
    // PAY-N07: High-precision amounts survive exactly
    // =========================================================================
    #[test]
    fn test_amount_precision_preserved() {
        let event = normalize(&json!({
            "type": "payment.completed",
            "data": {
                "id": "evt_p",
                "amount": "1234567.123456",
                "created_at": "2026-08-23T12:00:00Z"
            }
        }))
        .unwrap();
        assert_eq!(event.amount.to_string(), "1234567.123456");
    }
}

#[cfg(test)]
mod idempotency_edge_cases {
    use crate::idempotency::{IdempotencyLedger, Outcome};
    use crate::ledger::LedgerClient;
    use std::sync::Arc;

    fn unreachable_store() -> LedgerClient {
        LedgerClient::new("http://127.0.0.1:9", "test-key")
    }

    // =========================================================================
    // PAY-I01: Concurrent marks of the same event id race benignly
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_marks_last_write_wins() {
        let ledger = Arc::new(IdempotencyLedger::new(unreachable_store(), None));
        let mut handles = vec![];
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.mark_processed("evt_race", Outcome::Success).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(ledger.is_processed("evt_race").await);
    }

    // =========================================================================
    // PAY-I02: Failure then success on the same id ends up processed
    // =========================================================================
    #[tokio::test]
    async fn test_failure_then_success_transitions() {
        let ledger = IdempotencyLedger::new(unreachable_store(), None);
        ledger.mark_processed("evt_fs", Outcome::Failure).await;
        assert!(!ledger.is_processed("evt_fs").await);
        ledger.mark_processed("evt_fs", Outcome::Success).await;
        assert!(ledger.is_processed("evt_fs").await);
    }

    // =========================================================================
    // PAY-I03: Distinct event ids are fully isolated
    // =========================================================================
    #[tokio::test]
    async fn test_event_ids_isolated() {
        let ledger = IdempotencyLedger::new(unreachable_store(), None);
        ledger.mark_processed("evt_a", Outcome::Success).await;
        assert!(ledger.is_processed("evt_a").await);
        assert!(!ledger.is_processed("evt_b").await);
    }
}

#[cfg(test)]
mod reconciliation_edge_cases {
    use crate::event::normalize;
    use crate::executor::ReconciliationExecutor;
    use crate::ledger::LedgerClient;
    use crate::planner::plan;
    use mockito::Matcher;
    use serde_json::json;

    // =========================================================================
    // PAY-X01: Redelivery after a create patches instead of duplicating
    // =========================================================================
    #[tokio::test]
    async fn test_redelivery_upserts_by_idempotency_key() {
        let mut server = mockito::Server::new_async().await;
        let entry = json!({
            "id": 7,
            "amount": "10.00",
            "fee": "0",
            "net_amount": "10.00",
            "status": "completed",
            "idempotency_key": "evt_r",
            "metadata": {}
        });
        server
            .mock("GET", "/ledger")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!("[{entry}]"))
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/ledger/7")
            .with_status(200)
            .with_body(entry.to_string())
            .create_async()
            .await;
        let create = server
            .mock("POST", "/ledger")
            .with_status(200)
            .with_body(entry.to_string())
            .expect(0)
            .create_async()
            .await;
        server
            .mock("POST", "/event_log")
            .with_status(200)
            .with_body(
                json!({
                    "event_id": "evt_r",
                    "status": "completed",
                    "amount": "10.00",
                    "currency": "USDC",
                    "customer_wallet_address": "",
                    "metadata": {},
                    "timestamp": "2026-08-23T12:00:00Z",
                    "processed": true
                })
                .to_string(),
            )
            .create_async()
            .await;

        let executor =
            ReconciliationExecutor::new(LedgerClient::new(server.url(), "k"), "agency_default");
        let event = normalize(&json!({
            "type": "payment.completed",
            "data": {"id": "evt_r", "amount": "10.00", "created_at": "2026-08-23T12:00:00Z"}
        }))
        .unwrap();

        let report = executor.execute(&event, &plan(&event)).await;
        assert!(report.success());
        patch.assert_async().await;
        create.assert_async().await;
    }

    // =========================================================================
    // PAY-X02: Store unreachable -> every store-touching action fails
    // =========================================================================
    #[tokio::test]
    async fn test_unreachable_store_fails_all_store_actions() {
        let executor = ReconciliationExecutor::new(
            LedgerClient::new("http://127.0.0.1:9", "k"),
            "agency_default",
        );
        let event = normalize(&json!({
            "type": "payment.failed",
            "data": {"id": "evt_u", "amount": "1.00", "created_at": "2026-08-23T12:00:00Z"}
        }))
        .unwrap();

        let report = executor.execute(&event, &plan(&event)).await;
        assert!(!report.success());
        // UpdateLedgerStatus and WriteAuditLog fail; the log-only failure
        // cleanup hook still reports success.
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.results.len(), 3);
    }
}
