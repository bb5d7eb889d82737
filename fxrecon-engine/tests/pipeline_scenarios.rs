//! End-to-end reconciliation scenarios over the full pipeline:
//! in-memory store, fake LLM provider, capturing task scheduler.

mod common;

use common::*;
use fxrecon_common::events::{EventFilter, EventPriority};
use fxrecon_common::model::{
    AutomationToggle, MatchStatus, TenantAutomationConfig, TradeStatus,
};
use fxrecon_engine::db;
use fxrecon_engine::tasks::QueueName;

#[tokio::test]
async fn exact_match_creates_a_confirmed_match() {
    let h = harness(&confirmation_json("932.88")).await;
    let trade = client_trade();
    db::trades::insert_trade(&h.db, &trade).await.unwrap();

    let report = h.pipeline.process_unit(unit()).await;

    assert!(report.success);
    assert_eq!(report.trades_extracted, 1);
    assert_eq!(report.matches_found, 1);
    assert_eq!(report.duplicates_found, 0);
    assert_eq!(report.matched_trade_numbers, ["32013"]);
    assert_eq!(report.counterparty_name.as_deref(), Some("Banco ABC"));

    let stored = db::trades::get_trade(&h.db, TENANT_ID, trade.id).await.unwrap();
    assert_eq!(stored.status, TradeStatus::Matched);

    let record = db::matches::existing_match_for_trade(&h.db, TENANT_ID, trade.id)
        .await
        .unwrap()
        .expect("match record written");
    assert_eq!(record.confidence_score, 100);
    assert_eq!(record.status, MatchStatus::Confirmed);
    assert!(record.discrepancies.is_empty());

    // The extracted trade carries the back-reference.
    let email = db::emails::get_email(&h.db, TENANT_ID, report.email_id)
        .await
        .unwrap();
    assert_eq!(email.llm_payload.trades[0].match_id, Some(record.match_id));
    assert_eq!(email.llm_payload.trades[0].status.as_deref(), Some("matched"));
}

#[tokio::test]
async fn price_discrepancy_is_a_difference_with_dispute_email() {
    let h = harness(&confirmation_json("932.98")).await;
    db::trades::insert_trade(&h.db, &client_trade()).await.unwrap();
    db::tenants::set_automation_config(
        &h.db,
        TENANT_ID,
        &TenantAutomationConfig {
            auto_confirm_disputed: AutomationToggle {
                enabled: true,
                delay_minutes: 5,
            },
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let report = h.pipeline.process_unit(unit()).await;
    assert_eq!(report.matches_found, 1);

    let email = db::emails::get_email(&h.db, TENANT_ID, report.email_id)
        .await
        .unwrap();
    assert_eq!(
        email.llm_payload.trades[0].status.as_deref(),
        Some("difference")
    );

    let enqueued = h.scheduler.enqueued.lock().unwrap();
    assert_eq!(enqueued.len(), 1);
    let (queue, payload, delay) = &enqueued[0];
    assert_eq!(*queue, QueueName::Email);
    assert_eq!(payload.task_type, "send_dispute_email");
    assert_eq!(delay.as_secs(), 300);
    assert_eq!(payload.data["discrepancies"][0]["field"], "Price");
}

#[tokio::test]
async fn second_ingestion_of_the_same_confirmation_is_a_duplicate() {
    let h = harness(&confirmation_json("932.88")).await;
    let trade = client_trade();
    db::trades::insert_trade(&h.db, &trade).await.unwrap();

    let first = h.pipeline.process_unit(unit()).await;
    assert_eq!(first.matches_found, 1);
    assert_eq!(first.duplicates_found, 0);

    let original = db::matches::existing_match_for_trade(&h.db, TENANT_ID, trade.id)
        .await
        .unwrap()
        .expect("first ingestion created a match");

    let second = h.pipeline.process_unit(unit()).await;
    assert_eq!(second.matches_found, 0);
    assert_eq!(second.duplicates_found, 1);

    let email = db::emails::get_email(&h.db, TENANT_ID, second.email_id)
        .await
        .unwrap();
    assert!(email.has_duplicates);
    assert_eq!(email.duplicate_info.len(), 1);
    assert_eq!(email.duplicate_info[0].trade_number, "32013");
    assert_eq!(email.duplicate_info[0].existing_match_id, original.match_id);
    assert_eq!(
        email.llm_payload.trades[0].status.as_deref(),
        Some("duplicate")
    );

    // Trade status and the original match are untouched.
    let stored = db::trades::get_trade(&h.db, TENANT_ID, trade.id).await.unwrap();
    assert_eq!(stored.status, TradeStatus::Matched);
}

#[tokio::test]
async fn unrecognized_confirmation_creates_no_match_and_a_low_event() {
    let h = harness(&unrecognized_json()).await;
    db::trades::insert_trade(&h.db, &client_trade()).await.unwrap();

    let mut subscription = h.event_bus.subscribe(EventFilter::default());
    let report = h.pipeline.process_unit(unit()).await;

    assert!(report.success);
    assert_eq!(report.trades_extracted, 1);
    assert_eq!(report.matches_found, 0);
    assert_eq!(report.duplicates_found, 0);

    let email = db::emails::get_email(&h.db, TENANT_ID, report.email_id)
        .await
        .unwrap();
    assert_eq!(
        email.llm_payload.trades[0].status.as_deref(),
        Some("unrecognized")
    );

    let event = subscription.rx.recv().await.expect("summary event");
    assert_eq!(event.event_type, "gmail_processed");
    assert_eq!(event.priority, EventPriority::Low);
    assert_eq!(event.payload["matches_found"], 0);
}

#[tokio::test]
async fn provider_failure_saves_the_email_with_extraction_failed() {
    let h = harness("").await;
    db::trades::insert_trade(&h.db, &client_trade()).await.unwrap();

    let report = h.pipeline.process_unit(unit()).await;
    assert!(report.success);
    assert_eq!(report.trades_extracted, 0);
    assert_eq!(report.matches_found, 0);

    let email = db::emails::get_email(&h.db, TENANT_ID, report.email_id)
        .await
        .unwrap();
    assert!(email.extraction_failed);
    assert!(email.llm_payload.trades.is_empty());
    assert!(!email.llm_payload.email.confirmation);
}

#[tokio::test]
async fn malformed_provider_output_takes_the_fallback_path() {
    let h = harness("the trade was confirmed, thanks!").await;
    let report = h.pipeline.process_unit(unit()).await;
    assert!(report.success);
    assert_eq!(report.trades_extracted, 0);

    let email = db::emails::get_email(&h.db, TENANT_ID, report.email_id)
        .await
        .unwrap();
    assert!(email.extraction_failed);
}

#[tokio::test]
async fn non_confirmation_email_never_reaches_matching() {
    let h = harness(
        &serde_json::json!({
            "email": { "confirmation": "No", "num_trades": 0 },
            "trades": []
        })
        .to_string(),
    )
    .await;
    let trade = client_trade();
    db::trades::insert_trade(&h.db, &trade).await.unwrap();

    let report = h.pipeline.process_unit(unit()).await;
    assert!(report.success);
    assert_eq!(report.trades_extracted, 0);
    assert_eq!(report.matches_found, 0);

    let stored = db::trades::get_trade(&h.db, TENANT_ID, trade.id).await.unwrap();
    assert_eq!(stored.status, TradeStatus::Unmatched);
}

#[tokio::test]
async fn matched_event_is_published_per_match() {
    let h = harness(&confirmation_json("932.88")).await;
    db::trades::insert_trade(&h.db, &client_trade()).await.unwrap();

    let mut subscription = h.event_bus.subscribe(EventFilter {
        types: Some(vec!["trade_matched".to_string()]),
        ..Default::default()
    });
    h.pipeline.process_unit(unit()).await;

    let event = subscription.rx.recv().await.expect("match event");
    assert_eq!(event.event_type, "trade_matched");
    assert_eq!(event.tenant_id.as_deref(), Some(TENANT_ID));
    assert_eq!(event.payload["trade_number"], "32013");
    assert_eq!(event.payload["confidence"], 100);
}
