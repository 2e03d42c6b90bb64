use futures_util::future::BoxFuture;
use log::*;
use sqlx::SqliteConnection;

use super::RecordHandler;
use crate::{
    db_types::Order,
    indexer::{IndexOutcome, Indexer, IndexerError},
};

pub struct IndexHandler {
    indexer: Indexer,
}

impl IndexHandler {
    pub fn new(indexer: Indexer) -> Self {
        Self { indexer }
    }
}

impl RecordHandler for IndexHandler {
    type Record = Order;

    fn name(&self) -> &'static str {
        "orders"
    }

    fn indexer_mut(&mut self) -> &mut Indexer {
        &mut self.indexer
    }

    fn apply<'a>(
        &'a self,
        order: Order,
        conn: &'a mut SqliteConnection,
    ) -> BoxFuture<'a, Result<(), IndexerError>> {
        Box::pin(async move {
            if let IndexOutcome::Inserted(record) = self.indexer.index(&order, conn).await? {
                info!("🧾️ Order {} from {} added to the book", record.order_hash, record.order.maker);
            }
            Ok(())
        })
    }
}
