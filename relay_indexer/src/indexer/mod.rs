//! # The Indexer
//!
//! The indexer keeps each order's status consistent with the latest facts known about it. It exposes three
//! mutations:
//!
//! * [`Indexer::index`] adds an order to the book (idempotently).
//! * [`Indexer::record_fill`] applies an on-chain fill.
//! * [`Indexer::record_spend`] re-evaluates whether a maker can still honour their orders in a token after a balance
//!   change.
//!
//! The indexer holds no connection and no concurrency state. Every operation receives its unit of work as a
//! `&mut SqliteConnection`, usually `&mut *tx` for a transaction the caller commits. Concurrent workers each use their
//! own transaction.
//!
//! Facts arrive out of order relative to one another. Fills and funding checks touch different status rules, and
//! `Filled` always wins, so they can be applied in any order.
mod errors;
mod metrics;

use std::sync::Arc;

use alloy_primitives::Address;
pub use errors::IndexerError;
use log::*;
pub use metrics::{IndexerMetrics, MetricsSnapshot};
use relay_common::TokenAmount;
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::orders,
    db_types::{FillRecord, Order, OrderRecord, OrderStatus},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Inserted(OrderRecord),
    AlreadyIndexed(OrderRecord),
}

impl IndexOutcome {
    pub fn record(&self) -> &OrderRecord {
        match self {
            Self::Inserted(r) | Self::AlreadyIndexed(r) => r,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// The order is not in the book. Fills for orders this relay does not track are expected.
    UnknownOrder,
    /// The reported amount is lower than the amount already recorded, and was ignored.
    Stale(OrderRecord),
    PartiallyFilled(OrderRecord),
    Filled(OrderRecord),
    /// The reported amount exceeds the order's taker amount. It is stored as reported.
    Overfilled(OrderRecord),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpendOutcome {
    /// The number of orders whose funding was evaluated
    pub checked: usize,
    /// Orders moved to the indexer's target status
    pub downgraded: usize,
    /// Orders moved back to `Open`
    pub restored: usize,
}

#[derive(Debug, Clone)]
pub struct Indexer {
    target_status: OrderStatus,
    metrics: Arc<IndexerMetrics>,
}

impl Indexer {
    /// Creates a new indexer.
    ///
    /// `target_status` is the status given to newly indexed orders, and the status given to orders that fail the
    /// funding check in [`Self::record_spend`]. The former is usually `Open`, the latter `Unfunded`.
    ///
    /// Only `Open` and `Unfunded` can be targets. `Filled` must follow from a fill, and `Cancelled` is never set by
    /// the indexer, so any other status is replaced with `Unfunded`.
    pub fn new(target_status: OrderStatus) -> Self {
        let target_status = if target_status.is_fundable() {
            target_status
        } else {
            error!("📇️ {target_status} cannot be an indexer target status. Using Unfunded instead.");
            OrderStatus::Unfunded
        };
        Self { target_status, metrics: Arc::new(IndexerMetrics::default()) }
    }

    pub fn with_metrics(mut self, metrics: Arc<IndexerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn target_status(&self) -> OrderStatus {
        self.target_status
    }

    pub fn metrics(&self) -> &Arc<IndexerMetrics> {
        &self.metrics
    }

    /// Adds the order to the book with the target status and nothing filled.
    ///
    /// This call is idempotent. If the order is already present, the stored record is returned unchanged. The
    /// signature is not verified here.
    pub async fn index(&self, order: &Order, conn: &mut SqliteConnection) -> Result<IndexOutcome, IndexerError> {
        order.validate()?;
        let order_hash = order.hash();
        let (record, inserted) = orders::idempotent_insert(&order_hash, order, self.target_status, conn).await?;
        if inserted {
            self.metrics.inc_orders_indexed();
            debug!("📇️ Order {order_hash} indexed as {}", record.status);
            Ok(IndexOutcome::Inserted(record))
        } else {
            trace!("📇️ Order {order_hash} was already indexed ({})", record.status);
            Ok(IndexOutcome::AlreadyIndexed(record))
        }
    }

    /// Applies a cumulative fill to the order it references.
    ///
    /// Unknown orders are ignored. A fill that reaches the taker amount marks the order `Filled`, whatever its funding
    /// status. Amounts beyond the taker amount are kept as reported, and counted as overfills. Reports lower than the
    /// recorded amount are out of date and leave the record alone.
    pub async fn record_fill(
        &self,
        fill: &FillRecord,
        conn: &mut SqliteConnection,
    ) -> Result<FillOutcome, IndexerError> {
        let hash = fill.order_hash;
        let Some(record) = orders::fetch_order_by_hash(&hash, conn).await? else {
            debug!("📇️ Fill received for unknown order {hash}. Ignoring it.");
            return Ok(FillOutcome::UnknownOrder);
        };
        let filled = fill.filled_taker_asset_amount;
        if filled < record.taker_asset_amount_filled {
            self.metrics.inc_stale_fills();
            debug!(
                "📇️ Fill of {filled} for order {hash} is behind the recorded {}. Ignoring it.",
                record.taker_asset_amount_filled
            );
            return Ok(FillOutcome::Stale(record));
        }
        let record = orders::update_filled_amount(&record, filled, conn).await?;
        self.metrics.inc_fills_applied();
        let total = record.order.taker_asset_amount;
        if filled < total {
            trace!("📇️ Order {hash} is partially filled: {filled} of {total}");
            return Ok(FillOutcome::PartiallyFilled(record));
        }
        let record = match record.status {
            OrderStatus::Filled => record,
            OrderStatus::Cancelled => {
                warn!("📇️ Cancelled order {hash} was filled on-chain. Its status remains Cancelled.");
                record
            },
            _ => {
                let record = orders::update_order_status(&record, OrderStatus::Filled, conn).await?;
                self.metrics.add_status_changes(1);
                debug!("📇️ Order {hash} is now Filled");
                record
            },
        };
        if filled > total {
            self.metrics.inc_overfills();
            warn!("📇️ Order {hash} has been filled beyond its taker amount: {filled} > {total}");
            Ok(FillOutcome::Overfilled(record))
        } else {
            Ok(FillOutcome::Filled(record))
        }
    }

    /// Re-evaluates funding for every open or previously underfunded order that `spender` offers in `spent_token`,
    /// given that `amount_available` of the token is now available to them.
    ///
    /// Each order is compared independently with the reported balance. An order is funded when the balance is at least
    /// its maker amount; funded orders are (re)opened and the rest move to the target status. Filled and cancelled
    /// orders are never touched.
    pub async fn record_spend(
        &self,
        spender: &Address,
        spent_token: &Address,
        reference_token: &Address,
        amount_available: TokenAmount,
        conn: &mut SqliteConnection,
    ) -> Result<SpendOutcome, IndexerError> {
        self.metrics.inc_spends_checked();
        let statuses = self.scannable_statuses();
        let candidates = orders::fetch_orders_for_maker_token(spender, spent_token, &statuses, conn).await?;
        trace!(
            "📇️ Funding check for {spender} in {spent_token} (reference {reference_token}): {} candidate orders, \
             {amount_available} available",
            candidates.len()
        );
        let mut outcome = SpendOutcome { checked: candidates.len(), ..Default::default() };
        for record in candidates {
            let funded = amount_available >= record.order.maker_asset_amount;
            let next = if funded { OrderStatus::Open } else { self.target_status };
            if next == record.status {
                continue;
            }
            orders::update_order_status(&record, next, conn).await?;
            if funded {
                outcome.restored += 1;
                debug!("📇️ Order {} is funded again and has been reopened", record.order_hash);
            } else {
                outcome.downgraded += 1;
                debug!(
                    "📇️ Order {} needs {} but only {amount_available} is available. Marked {next}",
                    record.order_hash, record.order.maker_asset_amount
                );
            }
        }
        self.metrics.add_status_changes((outcome.restored + outcome.downgraded) as u64);
        Ok(outcome)
    }

    /// The statuses the funding check scans: `Open`, plus the target status so that downgraded orders can recover.
    fn scannable_statuses(&self) -> Vec<OrderStatus> {
        let mut statuses = vec![OrderStatus::Open];
        if self.target_status != OrderStatus::Open {
            statuses.push(self.target_status);
        }
        statuses
    }
}
