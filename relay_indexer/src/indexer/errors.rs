use alloy_primitives::B256;
use thiserror::Error;

use crate::db_types::OrderStatus;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
    #[error("Order {0} vanished while it was being updated")]
    OrderVanished(B256),
    #[error("Order {hash} cannot move from {from} to {to}")]
    ForbiddenTransition { hash: B256, from: OrderStatus, to: OrderStatus },
}

impl IndexerError {
    /// Whether retrying the same operation later could succeed. Storage failures are transient; a malformed order
    /// will be malformed forever.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::OrderVanished(_))
    }
}
