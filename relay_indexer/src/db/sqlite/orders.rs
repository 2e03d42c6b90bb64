use std::str::FromStr;

use alloy_primitives::{hex, Address, B256};
use log::{debug, trace};
use relay_common::TokenAmount;
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, SqliteConnection};

use crate::{
    db_types::{Order, OrderRecord, OrderStatus},
    indexer::IndexerError,
};

/// Inserts the order into the database, returning `false` in the second parameter if the order already exists.
///
/// An existing record is returned untouched, so that neither its status nor its filled amount can regress.
pub async fn idempotent_insert(
    order_hash: &B256,
    order: &Order,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<(OrderRecord, bool), IndexerError> {
    match insert_order(order_hash, order, status, conn).await? {
        Some(record) => {
            debug!("🗃️ Order {order_hash} inserted with id {} and status {status}", record.id);
            Ok((record, true))
        },
        None => {
            let record = fetch_order_by_hash(order_hash, conn).await?.ok_or(IndexerError::OrderVanished(*order_hash))?;
            trace!("🗃️ Order {order_hash} already exists with id {}", record.id);
            Ok((record, false))
        },
    }
}

/// Inserts a new order. Returns `None` if an order with the same hash is already present. This is not atomic on its
/// own; embed it in a transaction and pass `&mut *tx` as the connection argument if you need atomicity.
async fn insert_order(
    order_hash: &B256,
    order: &Order,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderRecord>, IndexerError> {
    let expiration = i64::try_from(order.expiration_time_seconds)
        .map_err(|_| IndexerError::InvalidOrder("expirationTimeSeconds is out of range".into()))?;
    let record = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_hash,
                exchange_address,
                maker,
                taker,
                maker_token,
                taker_token,
                fee_recipient,
                maker_asset_amount,
                taker_asset_amount,
                maker_fee,
                taker_fee,
                expiration_time_seconds,
                salt,
                signature,
                status,
                taker_asset_amount_filled
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, '0')
            ON CONFLICT (order_hash) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(hex::encode_prefixed(order_hash))
    .bind(hex::encode_prefixed(order.exchange_address))
    .bind(hex::encode_prefixed(order.maker))
    .bind(hex::encode_prefixed(order.taker))
    .bind(hex::encode_prefixed(order.maker_token))
    .bind(hex::encode_prefixed(order.taker_token))
    .bind(hex::encode_prefixed(order.fee_recipient))
    .bind(order.maker_asset_amount.to_string())
    .bind(order.taker_asset_amount.to_string())
    .bind(order.maker_fee.to_string())
    .bind(order.taker_fee.to_string())
    .bind(expiration)
    .bind(order.salt.to_string())
    .bind(hex::encode_prefixed(&order.signature))
    .bind(status.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// Returns the order with the given hash, if it has been indexed.
pub async fn fetch_order_by_hash(
    order_hash: &B256,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderRecord>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_hash = $1")
        .bind(hex::encode_prefixed(order_hash))
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Overwrites the cumulative filled amount for the order with the given database id.
pub(crate) async fn update_filled_amount(
    record: &OrderRecord,
    filled: TokenAmount,
    conn: &mut SqliteConnection,
) -> Result<OrderRecord, IndexerError> {
    let result: Option<OrderRecord> = sqlx::query_as(
        "UPDATE orders SET taker_asset_amount_filled = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(filled.to_string())
    .bind(record.id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(IndexerError::OrderVanished(record.order_hash))
}

/// Moves the order into `status`, provided the transition is allowed.
pub(crate) async fn update_order_status(
    record: &OrderRecord,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<OrderRecord, IndexerError> {
    if !record.status.can_transition_to(status) {
        return Err(IndexerError::ForbiddenTransition { hash: record.order_hash, from: record.status, to: status });
    }
    let result: Option<OrderRecord> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status.to_string())
            .bind(record.id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(IndexerError::OrderVanished(record.order_hash))
}

/// Fetches every order offered by `maker` in `maker_token` whose status is one of `statuses`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn fetch_orders_for_maker_token(
    maker: &Address,
    maker_token: &Address,
    statuses: &[OrderStatus],
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderRecord>, sqlx::Error> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT * FROM orders WHERE maker = ");
    builder.push_bind(hex::encode_prefixed(maker));
    builder.push(" AND maker_token = ");
    builder.push_bind(hex::encode_prefixed(maker_token));
    builder.push(" AND status IN (");
    let mut in_clause = builder.separated(", ");
    for status in statuses {
        in_clause.push_bind(status.to_string());
    }
    builder.push(") ORDER BY created_at ASC, id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<OrderRecord>().fetch_all(conn).await?;
    trace!("🗃️ Result of fetch_orders_for_maker_token: {}", orders.len());
    Ok(orders)
}

fn decode_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(e) })
}

impl FromRow<'_, SqliteRow> for OrderRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let expiration: i64 = row.try_get("expiration_time_seconds")?;
        let expiration_time_seconds = u64::try_from(expiration).map_err(|e| sqlx::Error::ColumnDecode {
            index: "expiration_time_seconds".to_string(),
            source: Box::new(e),
        })?;
        let order = Order {
            exchange_address: decode_column(row, "exchange_address")?,
            maker: decode_column(row, "maker")?,
            taker: decode_column(row, "taker")?,
            maker_token: decode_column(row, "maker_token")?,
            taker_token: decode_column(row, "taker_token")?,
            fee_recipient: decode_column(row, "fee_recipient")?,
            maker_asset_amount: decode_column(row, "maker_asset_amount")?,
            taker_asset_amount: decode_column(row, "taker_asset_amount")?,
            maker_fee: decode_column(row, "maker_fee")?,
            taker_fee: decode_column(row, "taker_fee")?,
            expiration_time_seconds,
            salt: decode_column(row, "salt")?,
            signature: decode_column(row, "signature")?,
        };
        Ok(Self {
            id: row.try_get("id")?,
            order_hash: decode_column(row, "order_hash")?,
            order,
            status: decode_column(row, "status")?,
            taker_asset_amount_filled: decode_column(row, "taker_asset_amount_filled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
