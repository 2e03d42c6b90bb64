use futures_util::future::BoxFuture;
use log::*;
use sqlx::SqliteConnection;

use super::RecordHandler;
use crate::{
    db_types::SpendRecord,
    indexer::{Indexer, IndexerError},
};

pub struct SpendHandler {
    indexer: Indexer,
}

impl SpendHandler {
    pub fn new(indexer: Indexer) -> Self {
        Self { indexer }
    }
}

impl RecordHandler for SpendHandler {
    type Record = SpendRecord;

    fn name(&self) -> &'static str {
        "spends"
    }

    fn indexer_mut(&mut self) -> &mut Indexer {
        &mut self.indexer
    }

    fn apply<'a>(
        &'a self,
        spend: SpendRecord,
        conn: &'a mut SqliteConnection,
    ) -> BoxFuture<'a, Result<(), IndexerError>> {
        Box::pin(async move {
            let outcome = self
                .indexer
                .record_spend(&spend.address, &spend.token, &spend.reference_token, spend.amount, conn)
                .await?;
            if outcome.downgraded + outcome.restored > 0 {
                info!(
                    "🧾️ Funding check for {} in {}: {} orders marked {}, {} reopened",
                    spend.address,
                    spend.token,
                    outcome.downgraded,
                    self.indexer.target_status(),
                    outcome.restored
                );
            }
            Ok(())
        })
    }
}
