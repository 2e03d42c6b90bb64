//! Request handler definitions
//!
//! The ingest routes only queue messages. Decoding and validation happen in the consumers, so a malformed message is
//! accepted here and rejected later by its consumer.
//!
//! Handlers must not block the worker thread. Database access and publishing are async.
use std::str::FromStr;

use actix_web::{get, post, web, HttpResponse, Responder};
use alloy_primitives::B256;
use log::*;
use relay_indexer::{channels::Publisher, IndexerMetrics, SqliteDatabase};
use serde_json::json;

use crate::{
    errors::ServerError,
    workers::{ChannelMonitor, Publishers},
};

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

#[get("/metrics")]
pub async fn metrics(
    metrics: web::Data<IndexerMetrics>,
    monitor: web::Data<ChannelMonitor>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET metrics");
    let body = json!({ "indexer": metrics.snapshot(), "channels": monitor.snapshot() });
    Ok(HttpResponse::Ok().json(body))
}

#[get("/orders/{hash}")]
pub async fn order_by_hash(
    path: web::Path<String>,
    db: web::Data<SqliteDatabase>,
) -> Result<HttpResponse, ServerError> {
    let hash = B256::from_str(path.as_str())
        .map_err(|e| ServerError::InvalidRequestPath(format!("{path} is not a valid order hash. {e}")))?;
    debug!("💻️ GET order {hash}");
    let record = db
        .fetch_order_by_hash(&hash)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {hash} has not been indexed")))?;
    Ok(HttpResponse::Ok().json(record))
}

#[post("/fills")]
pub async fn publish_fill(body: web::Bytes, publishers: web::Data<Publishers>) -> Result<HttpResponse, ServerError> {
    queue_message(&body, publishers.fills.as_ref()).await
}

#[post("/spends")]
pub async fn publish_spend(body: web::Bytes, publishers: web::Data<Publishers>) -> Result<HttpResponse, ServerError> {
    queue_message(&body, publishers.spends.as_ref()).await
}

#[post("/orders")]
pub async fn publish_order(body: web::Bytes, publishers: web::Data<Publishers>) -> Result<HttpResponse, ServerError> {
    queue_message(&body, publishers.orders.as_ref()).await
}

async fn queue_message(body: &[u8], publisher: &dyn Publisher) -> Result<HttpResponse, ServerError> {
    let payload = std::str::from_utf8(body).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    if payload.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("The message is empty".into()));
    }
    publisher.publish(payload.to_string()).await?;
    trace!("💻️ Message queued");
    Ok(HttpResponse::Accepted().json(json!({ "queued": true })))
}
