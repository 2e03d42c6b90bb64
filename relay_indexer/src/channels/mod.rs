//! # Message channels
//!
//! The indexer receives its facts from a publish/subscribe transport. This module defines the seam between the two:
//!
//! * A [`Consumer`] receives [`Delivery`]s and settles each one with `ack`, `reject` or `nack`.
//! * A transport implements [`Acknowledger`] to learn how each delivery was settled.
//! * A [`Publisher`] puts new messages onto a channel.
//!
//! [`memory_channel`] provides an in-process transport built on `tokio` channels.
mod delivery;
mod memory;

pub use delivery::{Acknowledger, Delivery, Envelope, Settlement};
use futures_util::future::BoxFuture;
pub use memory::{memory_channel, ChannelConfig, ChannelStats, ChannelStatsSnapshot, MemoryChannel, MemoryPublisher};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("Channel {0} is closed")]
    Closed(String),
    #[error("Channel {0} is already consuming")]
    AlreadyConsuming(String),
    #[error("Channel {0} has no consumers")]
    NoConsumers(String),
}

pub trait Consumer: Send + Sync + 'static {
    /// The maximum number of deliveries this consumer may be handling at any one time.
    fn concurrency(&self) -> usize {
        1
    }

    /// Handles a single delivery. Implementations must settle the delivery before the future completes.
    fn consume(&self, delivery: Delivery) -> BoxFuture<'_, ()>;
}

pub trait Publisher: Send + Sync + 'static {
    fn publish(&self, payload: String) -> BoxFuture<'_, Result<(), ChannelError>>;
}
