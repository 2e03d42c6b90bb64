use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest};
use relay_indexer::{
    db_types::OrderStatus,
    test_utils::fixtures::{maker, sample_order},
    Indexer,
};

use super::helpers::{error_message, mock_state, send_request, MockPublisher};

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init();
    let state = mock_state(Arc::new(MockPublisher::default())).await;
    let (status, body) = send_request(&state, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn fetch_indexed_order() {
    let _ = env_logger::try_init();
    let state = mock_state(Arc::new(MockPublisher::default())).await;
    let order = sample_order(maker(1), 1000, 500, 7);
    let mut tx = state.db.begin().await.unwrap();
    Indexer::new(OrderStatus::Open).index(&order, &mut tx).await.unwrap();
    tx.commit().await.unwrap();

    let hash = order.hash();
    let (status, body) = send_request(&state, TestRequest::get().uri(&format!("/orders/{hash}"))).await;
    assert_eq!(status, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["orderHash"], hash.to_string());
    assert_eq!(value["status"], "Open");
    assert_eq!(value["makerAssetAmount"], "1000");
    assert_eq!(value["takerAssetAmount"], "500");
    assert_eq!(value["takerAssetAmountFilled"], "0");
    assert!(value.get("id").is_none());
}

#[actix_web::test]
async fn fetch_unknown_order() {
    let _ = env_logger::try_init();
    let state = mock_state(Arc::new(MockPublisher::default())).await;
    let hash = sample_order(maker(1), 1000, 500, 7).hash();
    let (status, body) = send_request(&state, TestRequest::get().uri(&format!("/orders/{hash}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_message(&body), format!("The data was not found. Order {hash} has not been indexed"));
}

#[actix_web::test]
async fn fetch_order_with_invalid_hash() {
    let _ = env_logger::try_init();
    let state = mock_state(Arc::new(MockPublisher::default())).await;
    let (status, body) = send_request(&state, TestRequest::get().uri("/orders/0x1234")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).starts_with("Could not read request path: 0x1234 is not a valid order hash."));
}

#[actix_web::test]
async fn metrics_are_reported() {
    let _ = env_logger::try_init();
    let state = mock_state(Arc::new(MockPublisher::default())).await;
    state.metrics.inc_orders_indexed();
    state.metrics.inc_overfills();
    let (status, body) = send_request(&state, TestRequest::get().uri("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["indexer"]["orders_indexed"], 1);
    assert_eq!(value["indexer"]["overfills"], 1);
    assert_eq!(value["indexer"]["fills_applied"], 0);
    assert!(value["channels"].as_object().unwrap().is_empty());
}
