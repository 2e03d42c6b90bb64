//! Relay Indexer
//!
//! The relay indexer is the order-book consistency engine for an off-chain order relay. It maintains a persisted index
//! of signed orders and keeps each order's status (open, filled, unfunded) in step with on-chain facts as they arrive.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@db`]). SQLite is the supported backend. The data types that are persisted are defined in
//!    [`mod@db_types`] and are public.
//! 2. The [`Indexer`] ([`mod@indexer`]), which holds the order status rules for indexing, fills and funding checks.
//! 3. Message channels ([`mod@channels`]) describing the publish/subscribe transport that delivers facts, along with an
//!    in-process implementation.
//! 4. Consumers ([`mod@consumers`]) that decode fill, spend and order messages and apply them to the indexer, one
//!    transaction per message.
pub mod channels;
pub mod consumers;
pub mod db;
pub mod db_types;
pub mod indexer;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use consumers::{IndexConsumer, RecordFillConsumer, RecordSpendConsumer};
pub use db::sqlite::SqliteDatabase;
pub use indexer::{FillOutcome, IndexOutcome, Indexer, IndexerError, IndexerMetrics, SpendOutcome};
pub use relay_common::TokenAmount;
