use std::{sync::Arc, time::Duration};

use actix_web::{http::StatusCode, test::TestRequest};
use alloy_primitives::B256;
use relay_indexer::{
    db_types::{FillRecord, OrderStatus},
    test_utils::{
        fixtures::{maker, sample_order},
        prepare_env::{prepare_test_env, random_db_path},
    },
    SqliteDatabase,
    TokenAmount,
};

use super::helpers::{error_message, mock_state, send_request, MockPublisher};
use crate::{config::IndexerConfig, server::ServerState, workers::start_consumers};

#[actix_web::test]
async fn messages_are_queued_verbatim() {
    let _ = env_logger::try_init();
    let publisher = Arc::new(MockPublisher::default());
    let state = mock_state(Arc::clone(&publisher)).await;
    for (path, body) in [("/fills", "fill message"), ("/spends", "spend message"), ("/orders", "order message")] {
        let req = TestRequest::post().uri(path).set_payload(body);
        let (status, body) = send_request(&state, req).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, r#"{"queued":true}"#);
    }
    assert_eq!(publisher.messages(), vec!["fill message", "spend message", "order message"]);
}

#[actix_web::test]
async fn empty_messages_are_refused() {
    let _ = env_logger::try_init();
    let publisher = Arc::new(MockPublisher::default());
    let state = mock_state(Arc::clone(&publisher)).await;
    let (status, body) = send_request(&state, TestRequest::post().uri("/fills").set_payload("  ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&body), "Could not read request body: The message is empty");
    assert!(publisher.messages().is_empty());
}

#[actix_web::test]
async fn closed_channel_is_reported() {
    let _ = env_logger::try_init();
    let state = mock_state(Arc::new(MockPublisher::closed())).await;
    let (status, body) = send_request(&state, TestRequest::post().uri("/spends").set_payload("{}")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_message(&body), "The message could not be queued. Channel mock is closed");
}

#[actix_web::test]
async fn orders_and_fills_flow_through_the_consumers() {
    let _ = env_logger::try_init();
    let db = prepare_test_env(&random_db_path()).await;
    let config = IndexerConfig::default();
    let (publishers, consumers) = start_consumers(&db, &config).expect("Could not start consumers");
    let state = ServerState { db: db.clone(), publishers, metrics: consumers.metrics(), monitor: consumers.monitor() };

    let order = sample_order(maker(3), 1000, 500, 11);
    let hash = order.hash();
    let req = TestRequest::post().uri("/orders").set_payload(serde_json::to_string(&order).unwrap());
    let (status, _) = send_request(&state, req).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_status(&db, hash, OrderStatus::Open).await;

    let fill = FillRecord::new(hash, TokenAmount::from(500));
    let req = TestRequest::post().uri("/fills").set_payload(serde_json::to_string(&fill).unwrap());
    let (status, _) = send_request(&state, req).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_status(&db, hash, OrderStatus::Filled).await;

    let (status, body) = send_request(&state, TestRequest::get().uri(&format!("/orders/{hash}"))).await;
    assert_eq!(status, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["status"], "Filled");
    assert_eq!(value["takerAssetAmountFilled"], "500");

    let (metrics, monitor) = (consumers.metrics(), consumers.monitor());
    consumers.shutdown().await;
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.orders_indexed, 1);
    assert_eq!(snapshot.fills_applied, 1);
    let channels = monitor.snapshot();
    assert_eq!(channels["orders"].acked, 1);
    assert_eq!(channels["fills"].acked, 1);
    assert_eq!(channels["spends"].published, 0);
}

async fn wait_for_status(db: &SqliteDatabase, hash: B256, status: OrderStatus) {
    for _ in 0..500 {
        if let Some(record) = db.fetch_order_by_hash(&hash).await.unwrap() {
            if record.status == status {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Order {hash} did not reach {status} in time");
}
