//! # Indexer consumers
//!
//! Consumers adapt the [`Indexer`] to a message channel. Each delivery goes through the same steps:
//!
//! 1. The payload is decoded into a record. Undecodable messages are rejected; they will never succeed.
//! 2. A transaction is opened and the record is applied to the indexer.
//! 3. The transaction is committed, and only then is the message acknowledged.
//!
//! If the indexer or the commit fails with a transient error, the transaction is rolled back and the message is
//! `nack`ed so that the transport can redeliver it. One bad message never stops the consumer.
mod fill;
mod index;
mod spend;

use std::sync::Arc;

pub use fill::FillHandler;
use futures_util::future::BoxFuture;
pub use index::IndexHandler;
use log::*;
use serde::de::DeserializeOwned;
pub use spend::SpendHandler;
use sqlx::SqliteConnection;

use crate::{
    channels::{Consumer, Delivery},
    db_types::OrderStatus,
    indexer::{Indexer, IndexerError, IndexerMetrics},
    SqliteDatabase,
};

/// Applies one decoded record to the indexer.
pub trait RecordHandler: Send + Sync + 'static {
    type Record: DeserializeOwned + Send + 'static;

    /// A short name for log messages
    fn name(&self) -> &'static str;

    fn indexer_mut(&mut self) -> &mut Indexer;

    fn apply<'a>(
        &'a self,
        record: Self::Record,
        conn: &'a mut SqliteConnection,
    ) -> BoxFuture<'a, Result<(), IndexerError>>;
}

/// A channel consumer that feeds each delivery through a [`RecordHandler`], one transaction per message.
pub struct IndexerConsumer<H> {
    db: SqliteDatabase,
    handler: H,
    concurrency: usize,
}

/// Applies fill messages with [`Indexer::record_fill`].
pub type RecordFillConsumer = IndexerConsumer<FillHandler>;
/// Applies balance-change messages with [`Indexer::record_spend`].
pub type RecordSpendConsumer = IndexerConsumer<SpendHandler>;
/// Adds order messages to the book with [`Indexer::index`].
pub type IndexConsumer = IndexerConsumer<IndexHandler>;

impl<H: RecordHandler> IndexerConsumer<H> {
    pub fn with_handler(db: SqliteDatabase, handler: H, concurrency: usize) -> Self {
        Self { db, handler, concurrency: concurrency.max(1) }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Shares `metrics` with the indexer behind this consumer.
    pub fn with_metrics(mut self, metrics: Arc<IndexerMetrics>) -> Self {
        let indexer = self.handler.indexer_mut();
        *indexer = indexer.clone().with_metrics(metrics);
        self
    }

    async fn process(&self, delivery: Delivery) {
        let name = self.handler.name();
        let record = match serde_json::from_str::<H::Record>(delivery.payload()) {
            Ok(record) => record,
            Err(e) => {
                warn!("🧾️ [{name}] Rejecting message that could not be decoded: {e}");
                delivery.reject();
                return;
            },
        };
        match self.apply(record).await {
            Ok(()) => {
                trace!("🧾️ [{name}] Message applied");
                delivery.ack();
            },
            Err(e) if e.is_transient() => {
                error!("🧾️ [{name}] Could not apply message (attempt {}): {e}", delivery.attempt());
                delivery.nack();
            },
            Err(e) => {
                warn!("🧾️ [{name}] Rejecting message: {e}");
                delivery.reject();
            },
        }
    }

    async fn apply(&self, record: H::Record) -> Result<(), IndexerError> {
        let mut tx = self.db.begin().await?;
        self.handler.apply(record, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl<H: RecordHandler> Consumer for IndexerConsumer<H> {
    fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn consume(&self, delivery: Delivery) -> BoxFuture<'_, ()> {
        Box::pin(self.process(delivery))
    }
}

impl RecordFillConsumer {
    pub fn new(db: SqliteDatabase, concurrency: usize) -> Self {
        Self::with_handler(db, FillHandler::new(Indexer::new(OrderStatus::Open)), concurrency)
    }
}

impl RecordSpendConsumer {
    /// `unfunded_status` is the status given to orders whose maker cannot cover them, normally `Unfunded`.
    pub fn new(db: SqliteDatabase, unfunded_status: OrderStatus, concurrency: usize) -> Self {
        Self::with_handler(db, SpendHandler::new(Indexer::new(unfunded_status)), concurrency)
    }
}

impl IndexConsumer {
    /// `initial_status` is the status given to newly indexed orders, normally `Open`.
    pub fn new(db: SqliteDatabase, initial_status: OrderStatus, concurrency: usize) -> Self {
        Self::with_handler(db, IndexHandler::new(Indexer::new(initial_status)), concurrency)
    }
}
