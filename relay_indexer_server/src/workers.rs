//! Starts the background consumers that apply queued messages to the indexer.
//!
//! Each kind of message (fills, spends, orders) has its own in-process channel and consumer. The HTTP routes only
//! publish; the consumers do all the work, one transaction per message.
use std::{collections::BTreeMap, sync::Arc};

use futures::future::join_all;
use log::*;
use relay_indexer::{
    channels::{memory_channel, ChannelStats, ChannelStatsSnapshot, MemoryChannel, Publisher},
    IndexConsumer,
    IndexerMetrics,
    RecordFillConsumer,
    RecordSpendConsumer,
    SqliteDatabase,
};

use crate::{config::IndexerConfig, errors::ServerError};

pub const FILLS_CHANNEL: &str = "fills";
pub const SPENDS_CHANNEL: &str = "spends";
pub const ORDERS_CHANNEL: &str = "orders";

/// The publishing halves of the indexer's channels.
#[derive(Clone)]
pub struct Publishers {
    pub fills: Arc<dyn Publisher>,
    pub spends: Arc<dyn Publisher>,
    pub orders: Arc<dyn Publisher>,
}

/// Read-only access to the statistics of every running channel.
#[derive(Clone, Default)]
pub struct ChannelMonitor {
    channels: Vec<(String, Arc<ChannelStats>)>,
}

impl ChannelMonitor {
    pub fn snapshot(&self) -> BTreeMap<String, ChannelStatsSnapshot> {
        self.channels.iter().map(|(name, stats)| (name.clone(), stats.snapshot())).collect()
    }
}

pub struct ConsumerHandles {
    channels: Vec<MemoryChannel>,
    metrics: Arc<IndexerMetrics>,
}

impl ConsumerHandles {
    pub fn metrics(&self) -> Arc<IndexerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn monitor(&self) -> ChannelMonitor {
        let channels = self.channels.iter().map(|c| (c.name().to_string(), c.stats())).collect();
        ChannelMonitor { channels }
    }

    /// Stops every channel, waiting for in-flight messages to be settled.
    pub async fn shutdown(mut self) {
        info!("🧾️ Stopping {} consumer channel(s)", self.channels.len());
        join_all(self.channels.iter_mut().map(|c| c.stop_consuming())).await;
        info!("🧾️ All consumers have stopped");
    }
}

/// Creates the fill, spend and order channels, registers a consumer on each and starts consuming.
pub fn start_consumers(
    db: &SqliteDatabase,
    config: &IndexerConfig,
) -> Result<(Publishers, ConsumerHandles), ServerError> {
    let metrics = Arc::new(IndexerMetrics::default());
    let channel_config = config.channel_config();

    let (fills, mut fill_channel) = memory_channel(FILLS_CHANNEL, channel_config);
    fill_channel.add_consumer(
        RecordFillConsumer::new(db.clone(), config.fill_concurrency).with_metrics(Arc::clone(&metrics)),
    );
    let (spends, mut spend_channel) = memory_channel(SPENDS_CHANNEL, channel_config);
    spend_channel.add_consumer(
        RecordSpendConsumer::new(db.clone(), config.unfunded_status, config.spend_concurrency)
            .with_metrics(Arc::clone(&metrics)),
    );
    let (orders, mut order_channel) = memory_channel(ORDERS_CHANNEL, channel_config);
    order_channel.add_consumer(
        IndexConsumer::new(db.clone(), config.initial_status, config.index_concurrency)
            .with_metrics(Arc::clone(&metrics)),
    );

    let mut channels = vec![fill_channel, spend_channel, order_channel];
    for channel in channels.iter_mut() {
        channel.start_consuming().map_err(|e| ServerError::InitializeError(e.to_string()))?;
    }
    info!(
        "🧾️ Consumers started. fills: {}, spends: {}, orders: {} handler(s)",
        config.fill_concurrency, config.spend_concurrency, config.index_concurrency
    );
    let publishers = Publishers { fills: Arc::new(fills), spends: Arc::new(spends), orders: Arc::new(orders) };
    Ok((publishers, ConsumerHandles { channels, metrics }))
}
