//! Scenario: End-to-End Through the Request Client
//!
//! The full engine (loader, machine, reader, mutation service, verifier)
//! over a scripted HTTP transport.
//!
//! # Invariants under test
//!
//! 1. A load with department selection `["All"]` sends no department filter
//!    and a selection of several names sends them comma-joined.
//! 2. Starting a loaded order sends one INPROC row per line, carries the
//!    token in header and body, and the re-read confirms it.
//! 3. A business-level rejection rolls the order back and surfaces the
//!    upstream message.
//! 4. With retries = 2, a persistently failing batch is attempted exactly
//!    3 times before the action fails.
//! 5. Non-INPROC targets are sent line-scoped then whole-order (NEW) or
//!    whole-order only (APPROVED).

use std::sync::Arc;
use std::time::Duration;

use kds_client::{ScriptedTransport, StaticToken, TOKEN_HEADER};
use kds_config::{SyncConfig, UndoTarget};
use kds_reconcile::Verdict;
use kds_runtime::{Engine, LoadOutcome, Notice, Tab, TransitionError};
use kds_schemas::UiStatus;
use kds_testkit::fixtures::{error_payload, list_payload, ok_payload, upstream_order};
use serde_json::Value;

fn cfg(retries: u32) -> SyncConfig {
    SyncConfig {
        base_url: "http://erp.test/api".into(),
        retries,
        timeout: Duration::from_secs(5),
        base_delay: Duration::from_millis(350),
        retryable_codes: Vec::new(),
        page_size: 24,
        strict_verification: false,
        undo_target: UndoTarget::New,
        notes_capacity: 16,
        notes_ttl: Duration::from_secs(900),
    }
}

fn engine(retries: u32) -> (Arc<ScriptedTransport>, Engine) {
    let t = Arc::new(ScriptedTransport::new());
    let e = Engine::with_transport(&cfg(retries), t.clone(), Arc::new(StaticToken::new("tok-123")));
    (t, e)
}

fn body(t: &ScriptedTransport, i: usize) -> Value {
    let req = &t.requests()[i];
    serde_json::from_str(req.body.as_deref().unwrap_or("{}")).unwrap()
}

/// Counts for both tabs, then the active page holding `orders`.
fn script_active_load(t: &ScriptedTransport, orders: Vec<Value>) {
    let n = orders.len() as u64;
    t.push_json(200, list_payload(vec![], n));
    t.push_json(200, list_payload(vec![], 0));
    t.push_json(200, list_payload(orders, n));
}

fn a1(header: &str, line_status: &str) -> Value {
    upstream_order("A1", header, &[("L1", "Grill", line_status), ("L2", "Bar", line_status)])
}

#[tokio::test]
async fn department_selection_reaches_the_wire() {
    let (t, e) = engine(0);

    script_active_load(&t, vec![a1("NEW", "NEW")]);
    let out = e.loader.load(Tab::Active, 1, &["Grill", "Bar"]).await;
    assert!(matches!(out, LoadOutcome::Committed(_)));
    for i in 0..3 {
        assert_eq!(body(&t, i)["filter_define"]["item_department_selection"], "Grill,Bar");
    }
    assert_eq!(body(&t, 0)["filter_define"]["invoice_status_selection"], "NEW,INPROC");
    assert_eq!(body(&t, 0)["filter_define"]["only_counted"], "Y");
    assert_eq!(body(&t, 1)["filter_define"]["invoice_status_selection"], "APPROVED,REJECTED");
    assert_eq!(body(&t, 2)["filter_define"]["only_counted"], "N");

    script_active_load(&t, vec![a1("NEW", "NEW")]);
    e.loader.load(Tab::Active, 1, &["Grill", "All"]).await;
    assert_eq!(body(&t, 5)["filter_define"]["item_department_selection"], "");
}

#[tokio::test]
async fn start_cooking_end_to_end() {
    let (t, e) = engine(0);
    let mut notices = e.bus.subscribe();

    script_active_load(&t, vec![a1("NEW", "NEW")]);
    e.loader.load(Tab::Active, 1, &["All"]).await;
    assert_eq!(e.board.read().await.active[0].status, UiStatus::Pending);

    t.push_json(200, ok_payload());
    t.push_json(200, list_payload(vec![a1("INPROC", "INPROC")], 1));
    let out = e.machine.primary_action("A1").await.unwrap();
    assert_eq!(out.verdict, Verdict::Confirmed);

    let submit = &t.requests()[3];
    assert!(submit.url.ends_with("/list_stock_batch_invoice_change_status"));
    assert_eq!(submit.header(TOKEN_HEADER), Some("tok-123"));
    let sent = body(&t, 3);
    assert_eq!(sent["api_credentials"]["token"], "tok-123");
    let rows = sent["list_stock_batch_invoice"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for (row, line) in rows.iter().zip(["L1", "L2"]) {
        assert_eq!(row["status_code_365"], "INPROC");
        assert_eq!(row["line_id_365"], line);
        assert_eq!(row["batch_invoice_number_365"], "A1");
        assert_eq!(row["batch_invoice_code_365"], "A1");
    }

    let verify = body(&t, 4);
    assert_eq!(verify["filter_define"]["invoice_365_code_selection"], "A1");

    let board = e.board.read().await;
    assert!(board.active[0].cooking);
    assert_eq!(board.active[0].status, UiStatus::Active);
    assert!(matches!(notices.try_recv().unwrap(), Notice::Success { .. }));
}

#[tokio::test]
async fn rejected_start_rolls_back_with_upstream_message() {
    let (t, e) = engine(0);
    script_active_load(&t, vec![a1("NEW", "NEW")]);
    e.loader.load(Tab::Active, 1, &["All"]).await;
    let before = e.board.read().await.clone();

    t.push_json(200, error_payload("0", "Invoice locked"));
    let err = e.machine.primary_action("A1").await.unwrap_err();
    match err {
        TransitionError::Submit { source, .. } => {
            assert_eq!(source.message, "(0) Invoice locked");
            assert_eq!(source.code.as_deref(), Some("0"));
        }
        other => panic!("expected submit failure, got {other:?}"),
    }
    assert_eq!(*e.board.read().await, before);
    assert_eq!(t.remaining(), 0, "no verification read after a rejection");
}

#[tokio::test(start_paused = true)]
async fn two_retries_mean_three_attempts() {
    let (t, e) = engine(2);
    script_active_load(&t, vec![a1("NEW", "NEW")]);
    e.loader.load(Tab::Active, 1, &["All"]).await;

    for _ in 0..3 {
        t.push_json(500, serde_json::json!({}));
    }
    assert!(e.machine.primary_action("A1").await.is_err());
    assert_eq!(t.requests().len(), 3 + 3);
    assert_eq!(t.remaining(), 0);
    assert!(!e.board.read().await.active[0].cooking);
}

#[tokio::test]
async fn revert_and_complete_batches_are_shaped() {
    let (t, e) = engine(0);
    script_active_load(&t, vec![upstream_order("A1", "INPROC", &[("L1", "Grill", "INPROC")])]);
    e.loader.load(Tab::Active, 1, &["All"]).await;

    // Revert to NEW: line-scoped row, then the same row whole-order.
    t.push_json(200, ok_payload());
    t.push_json(200, list_payload(vec![upstream_order("A1", "NEW", &[("L1", "Grill", "NEW")])], 1));
    e.machine.revert("A1").await.unwrap();
    let rows = body(&t, 3)["list_stock_batch_invoice"].as_array().unwrap().clone();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["line_id_365"], "L1");
    assert_eq!(rows[0]["status_code_365"], "NEW");
    assert_eq!(rows[1]["line_id_365"], "");
    assert_eq!(rows[1]["status_code_365"], "NEW");

    // Start, check, complete: APPROVED rows go whole-order only.
    t.push_json(200, ok_payload());
    t.push_json(200, list_payload(vec![upstream_order("A1", "INPROC", &[("L1", "Grill", "INPROC")])], 1));
    e.machine.primary_action("A1").await.unwrap();
    e.machine.toggle_item("A1", "L1").await;

    t.push_json(200, ok_payload());
    t.push_json(200, list_payload(vec![upstream_order("A1", "APPROVED", &[("L1", "Grill", "APPROVED")])], 1));
    let out = e.machine.primary_action("A1").await.unwrap();
    assert_eq!(out.verdict, Verdict::Confirmed);
    let rows = body(&t, 7)["list_stock_batch_invoice"].as_array().unwrap().clone();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["line_id_365"], "");
    assert_eq!(rows[0]["status_code_365"], "APPROVED");
    assert_eq!(e.board.read().await.completed[0].id, "A1");
}
