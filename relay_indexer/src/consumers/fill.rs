use futures_util::future::BoxFuture;
use log::*;
use sqlx::SqliteConnection;

use super::RecordHandler;
use crate::{
    db_types::FillRecord,
    indexer::{FillOutcome, Indexer, IndexerError},
};

pub struct FillHandler {
    indexer: Indexer,
}

impl FillHandler {
    pub fn new(indexer: Indexer) -> Self {
        Self { indexer }
    }
}

impl RecordHandler for FillHandler {
    type Record = FillRecord;

    fn name(&self) -> &'static str {
        "fills"
    }

    fn indexer_mut(&mut self) -> &mut Indexer {
        &mut self.indexer
    }

    fn apply<'a>(
        &'a self,
        fill: FillRecord,
        conn: &'a mut SqliteConnection,
    ) -> BoxFuture<'a, Result<(), IndexerError>> {
        Box::pin(async move {
            match self.indexer.record_fill(&fill, conn).await? {
                FillOutcome::Filled(record) | FillOutcome::Overfilled(record) => {
                    info!("🧾️ Order {} filled ({})", record.order_hash, record.taker_asset_amount_filled);
                },
                FillOutcome::PartiallyFilled(record) => {
                    debug!(
                        "🧾️ Order {} partially filled: {} of {}",
                        record.order_hash, record.taker_asset_amount_filled, record.order.taker_asset_amount
                    );
                },
                FillOutcome::Stale(_) | FillOutcome::UnknownOrder => {},
            }
            Ok(())
        })
    }
}
