//! An in-process queue transport.
//!
//! Messages published on a [`MemoryPublisher`] are queued on a `tokio` mpsc channel. Every consumer registered with the
//! [`MemoryChannel`] gets its own worker task; the workers compete for messages, so each message is handed to exactly
//! one consumer. A worker only pulls a message when one of its handler slots is free.
//!
//! Messages that are `nack`ed are redelivered ahead of anything still queued, until they have been redelivered
//! `max_redeliveries` times. A consumer with a single handler slot therefore sees the messages of a stream in the
//! order they were published, retries included.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex as StdMutex,
        PoisonError,
    },
};

use futures_util::future::BoxFuture;
use log::*;
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch, Mutex, Notify, Semaphore},
    task::{JoinHandle, JoinSet},
};

use super::{Acknowledger, ChannelError, Consumer, Delivery, Envelope, Publisher, Settlement};

const DEFAULT_BUFFER_SIZE: usize = 1024;
const DEFAULT_MAX_REDELIVERIES: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// The number of messages that can be queued before `publish` waits for room
    pub buffer_size: usize,
    /// The number of times a `nack`ed message is redelivered before it is dropped
    pub max_redeliveries: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE, max_redeliveries: DEFAULT_MAX_REDELIVERIES }
    }
}

#[derive(Debug, Default)]
pub struct ChannelStats {
    published: AtomicU64,
    acked: AtomicU64,
    rejected: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStatsSnapshot {
    pub published: u64,
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
    pub dropped: u64,
}

impl ChannelStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Messages that have reached a final state: acknowledged, rejected, or dropped after too many redeliveries.
    pub fn settled(&self) -> u64 {
        self.acked() + self.rejected() + self.dropped()
    }

    pub fn snapshot(&self) -> ChannelStatsSnapshot {
        ChannelStatsSnapshot {
            published: self.published(),
            acked: self.acked(),
            rejected: self.rejected(),
            requeued: self.requeued(),
            dropped: self.dropped(),
        }
    }
}

struct ChannelCore {
    name: String,
    sender: mpsc::Sender<Envelope>,
    /// Nacked messages waiting to be handed out again. These take priority over the queue.
    redeliveries: StdMutex<VecDeque<Envelope>>,
    redelivery_ready: Notify,
    max_redeliveries: u32,
    stats: Arc<ChannelStats>,
}

impl ChannelCore {
    fn redeliver(&self, envelope: Envelope) {
        let next = Envelope { payload: envelope.payload, attempt: envelope.attempt + 1 };
        self.redeliveries.lock().unwrap_or_else(PoisonError::into_inner).push_back(next);
        self.redelivery_ready.notify_one();
    }

    fn take_redelivery(&self) -> Option<Envelope> {
        self.redeliveries.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }
}

impl Acknowledger for ChannelCore {
    fn settle(&self, envelope: Envelope, settlement: Settlement) {
        match settlement {
            Settlement::Ack => {
                self.stats.acked.fetch_add(1, Ordering::SeqCst);
                trace!("📬️ [{}] Message acknowledged", self.name);
            },
            Settlement::Reject => {
                self.stats.rejected.fetch_add(1, Ordering::SeqCst);
                debug!("📬️ [{}] Message rejected on attempt {}", self.name, envelope.attempt);
            },
            Settlement::Nack if envelope.attempt > self.max_redeliveries => {
                self.stats.dropped.fetch_add(1, Ordering::SeqCst);
                error!(
                    "📬️ [{}] Message failed {} times. Dropping it: {}",
                    self.name, envelope.attempt, envelope.payload
                );
            },
            Settlement::Nack => {
                self.stats.requeued.fetch_add(1, Ordering::SeqCst);
                debug!("📬️ [{}] Message nacked on attempt {}. Redelivering it.", self.name, envelope.attempt);
                self.redeliver(envelope);
            },
        }
    }
}

/// Creates a new in-process channel called `name`, returning the publishing and the consuming halves.
pub fn memory_channel(name: &str, config: ChannelConfig) -> (MemoryPublisher, MemoryChannel) {
    let (sender, receiver) = mpsc::channel(config.buffer_size.max(1));
    let core = Arc::new(ChannelCore {
        name: name.to_string(),
        sender,
        redeliveries: StdMutex::new(VecDeque::new()),
        redelivery_ready: Notify::new(),
        max_redeliveries: config.max_redeliveries,
        stats: Arc::new(ChannelStats::default()),
    });
    let (shutdown, _) = watch::channel(false);
    let channel = MemoryChannel {
        core: Arc::clone(&core),
        receiver: Arc::new(Mutex::new(receiver)),
        consumers: Vec::new(),
        shutdown,
        workers: Vec::new(),
    };
    (MemoryPublisher { core }, channel)
}

#[derive(Clone)]
pub struct MemoryPublisher {
    core: Arc<ChannelCore>,
}

impl MemoryPublisher {
    /// Queues a message. Waits for room if the channel buffer is full.
    pub async fn publish<S: Into<String>>(&self, payload: S) -> Result<(), ChannelError> {
        self.core
            .sender
            .send(Envelope::new(payload))
            .await
            .map_err(|_| ChannelError::Closed(self.core.name.clone()))?;
        self.core.stats.published.fetch_add(1, Ordering::SeqCst);
        trace!("📬️ [{}] Message published", self.core.name);
        Ok(())
    }

    pub fn channel_name(&self) -> &str {
        self.core.name.as_str()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, payload: String) -> BoxFuture<'_, Result<(), ChannelError>> {
        Box::pin(MemoryPublisher::publish(self, payload))
    }
}

pub struct MemoryChannel {
    core: Arc<ChannelCore>,
    receiver: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    consumers: Vec<Arc<dyn Consumer>>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl MemoryChannel {
    pub fn name(&self) -> &str {
        self.core.name.as_str()
    }

    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.core.stats)
    }

    /// Returns another publisher for this channel.
    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher { core: Arc::clone(&self.core) }
    }

    pub fn is_consuming(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Registers a consumer. If the channel is already consuming, the consumer starts receiving messages immediately.
    pub fn add_consumer<C: Consumer>(&mut self, consumer: C) {
        let consumer: Arc<dyn Consumer> = Arc::new(consumer);
        if self.is_consuming() {
            let worker = self.spawn_worker(Arc::clone(&consumer));
            self.workers.push(worker);
        }
        self.consumers.push(consumer);
    }

    pub fn start_consuming(&mut self) -> Result<(), ChannelError> {
        if self.is_consuming() {
            return Err(ChannelError::AlreadyConsuming(self.core.name.clone()));
        }
        if self.consumers.is_empty() {
            return Err(ChannelError::NoConsumers(self.core.name.clone()));
        }
        self.shutdown.send_replace(false);
        let workers = self.consumers.iter().map(|c| self.spawn_worker(Arc::clone(c))).collect();
        self.workers = workers;
        info!("📬️ [{}] Started consuming with {} consumer(s)", self.core.name, self.consumers.len());
        Ok(())
    }

    /// Stops pulling new messages and waits for every in-flight handler to finish. Queued messages stay in the
    /// channel and are delivered if consumption is started again.
    pub async fn stop_consuming(&mut self) {
        if !self.is_consuming() {
            return;
        }
        debug!("📬️ [{}] Stopping consumers", self.core.name);
        self.shutdown.send_replace(true);
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!("📬️ [{}] Consumer worker did not shut down cleanly: {e}", self.core.name);
            }
        }
        info!("📬️ [{}] Stopped consuming", self.core.name);
    }

    fn spawn_worker(&self, consumer: Arc<dyn Consumer>) -> JoinHandle<()> {
        let name = self.core.name.clone();
        let core = Arc::clone(&self.core);
        let receiver = Arc::clone(&self.receiver);
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(run_worker(name, consumer, core, receiver, shutdown))
    }
}

async fn run_worker(
    name: String,
    consumer: Arc<dyn Consumer>,
    core: Arc<ChannelCore>,
    receiver: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let acker: Arc<dyn Acknowledger> = core.clone();
    let width = consumer.concurrency().max(1);
    let slots = Arc::new(Semaphore::new(width));
    let mut in_flight = JoinSet::new();
    debug!("📬️ [{name}] Consumer worker started with {width} handler slot(s)");
    while !*shutdown.borrow() {
        while let Some(result) = in_flight.try_join_next() {
            log_handler_result(&name, result);
        }
        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let envelope = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            envelope = next_envelope(&core, &receiver) => match envelope {
                Some(e) => e,
                None => break,
            },
        };
        trace!("📬️ [{name}] Handing message to consumer (attempt {})", envelope.attempt);
        let delivery = Delivery::new(envelope, Arc::clone(&acker));
        let consumer = Arc::clone(&consumer);
        in_flight.spawn(async move {
            consumer.consume(delivery).await;
            drop(permit);
        });
    }
    if !in_flight.is_empty() {
        debug!("📬️ [{name}] Waiting for {} in-flight handler(s) to complete", in_flight.len());
    }
    while let Some(result) = in_flight.join_next().await {
        log_handler_result(&name, result);
    }
    debug!("📬️ [{name}] Consumer worker has shut down");
}

/// The next message to hand out. Redeliveries come first, then the queue in publishing order.
async fn next_envelope(core: &ChannelCore, receiver: &Mutex<mpsc::Receiver<Envelope>>) -> Option<Envelope> {
    let mut receiver = receiver.lock().await;
    loop {
        if let Some(envelope) = core.take_redelivery() {
            return Some(envelope);
        }
        tokio::select! {
            biased;
            _ = core.redelivery_ready.notified() => continue,
            envelope = receiver.recv() => return envelope,
        }
    }
}

fn log_handler_result(name: &str, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("📬️ [{name}] A message handler failed to complete: {e}");
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures_util::future::BoxFuture;

    use super::*;

    /// Acks even numbers, rejects odd numbers and nacks anything that isn't a number.
    struct NumberConsumer {
        sum: Arc<AtomicUsize>,
        started: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        width: usize,
    }

    impl NumberConsumer {
        fn new(width: usize) -> Self {
            Self {
                sum: Arc::default(),
                started: Arc::default(),
                in_flight: Arc::default(),
                max_in_flight: Arc::default(),
                width,
            }
        }
    }

    impl Consumer for NumberConsumer {
        fn concurrency(&self) -> usize {
            self.width
        }

        fn consume(&self, delivery: Delivery) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.started.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                match delivery.payload().parse::<usize>() {
                    Ok(n) if n % 2 == 0 => {
                        self.sum.fetch_add(n, Ordering::SeqCst);
                        delivery.ack();
                    },
                    Ok(_) => delivery.reject(),
                    Err(_) => delivery.nack(),
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        }
    }

    async fn wait_for_settled(stats: &ChannelStats, n: u64) {
        for _ in 0..200 {
            if stats.settled() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Timed out waiting for {n} messages to settle. Stats: {:?}", stats.snapshot());
    }

    #[tokio::test]
    async fn settles_every_message() {
        let _ = env_logger::try_init();
        let (publisher, mut channel) = memory_channel("numbers", ChannelConfig::default());
        let consumer = NumberConsumer::new(1);
        let sum = Arc::clone(&consumer.sum);
        channel.add_consumer(consumer);
        channel.start_consuming().unwrap();
        for i in 0..10 {
            publisher.publish(i.to_string()).await.unwrap();
        }
        let stats = channel.stats();
        wait_for_settled(&stats, 10).await;
        channel.stop_consuming().await;
        assert_eq!(sum.load(Ordering::SeqCst), 20);
        assert_eq!(stats.published(), 10);
        assert_eq!(stats.acked(), 5);
        assert_eq!(stats.rejected(), 5);
        assert_eq!(stats.requeued(), 0);
    }

    #[tokio::test]
    async fn nacked_messages_are_redelivered_then_dropped() {
        let _ = env_logger::try_init();
        let config = ChannelConfig { buffer_size: 4, max_redeliveries: 2 };
        let (publisher, mut channel) = memory_channel("poison", config);
        channel.add_consumer(NumberConsumer::new(1));
        channel.start_consuming().unwrap();
        publisher.publish("not a number").await.unwrap();
        let stats = channel.stats();
        wait_for_settled(&stats, 1).await;
        channel.stop_consuming().await;
        assert_eq!(stats.requeued(), 2);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.acked(), 0);
    }

    /// Records every payload it is handed, and nacks the first attempt of each payload listed in `fail_once`.
    struct FlakyConsumer {
        seen: Arc<std::sync::Mutex<Vec<String>>>,
        fail_once: Vec<&'static str>,
    }

    impl Consumer for FlakyConsumer {
        fn consume(&self, delivery: Delivery) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.seen.lock().unwrap().push(delivery.payload().to_string());
                if delivery.attempt() == 1 && self.fail_once.iter().any(|p| *p == delivery.payload()) {
                    delivery.nack();
                } else {
                    delivery.ack();
                }
            })
        }
    }

    #[tokio::test]
    async fn nacked_messages_are_redelivered_before_later_messages() {
        let _ = env_logger::try_init();
        let (publisher, mut channel) = memory_channel("ordered", ChannelConfig::default());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        channel.add_consumer(FlakyConsumer { seen: Arc::clone(&seen), fail_once: vec!["balance=0", "balance=5"] });
        // Queue everything before consuming starts, so later messages are already waiting when the nack happens
        for payload in ["balance=0", "balance=1000", "balance=5", "balance=7"] {
            publisher.publish(payload).await.unwrap();
        }
        channel.start_consuming().unwrap();
        let stats = channel.stats();
        wait_for_settled(&stats, 4).await;
        channel.stop_consuming().await;
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, ["balance=0", "balance=0", "balance=1000", "balance=5", "balance=5", "balance=7"]);
        assert_eq!(stats.requeued(), 2);
        assert_eq!(stats.acked(), 4);
    }

    #[tokio::test]
    async fn concurrency_width_bounds_in_flight_handlers() {
        let _ = env_logger::try_init();
        let (publisher, mut channel) = memory_channel("wide", ChannelConfig::default());
        let consumer = NumberConsumer::new(3);
        let max_in_flight = Arc::clone(&consumer.max_in_flight);
        channel.add_consumer(consumer);
        channel.start_consuming().unwrap();
        for i in 0..12 {
            publisher.publish((i * 2).to_string()).await.unwrap();
        }
        let stats = channel.stats();
        wait_for_settled(&stats, 12).await;
        channel.stop_consuming().await;
        let max = max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "Up to 3 handlers may run at once, but {max} did");
        assert!(max > 1, "Handlers should have run concurrently");
    }

    #[tokio::test]
    async fn start_requires_consumers_and_is_not_reentrant() {
        let (_publisher, mut channel) = memory_channel("empty", ChannelConfig::default());
        assert!(matches!(channel.start_consuming(), Err(ChannelError::NoConsumers(_))));
        channel.add_consumer(NumberConsumer::new(1));
        channel.start_consuming().unwrap();
        assert!(matches!(channel.start_consuming(), Err(ChannelError::AlreadyConsuming(_))));
        channel.stop_consuming().await;
        assert!(!channel.is_consuming());
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_handlers() {
        let (publisher, mut channel) = memory_channel("graceful", ChannelConfig::default());
        let consumer = NumberConsumer::new(4);
        let started = Arc::clone(&consumer.started);
        let in_flight = Arc::clone(&consumer.in_flight);
        channel.add_consumer(consumer);
        channel.start_consuming().unwrap();
        for i in 0..4 {
            publisher.publish((i * 2).to_string()).await.unwrap();
        }
        // Let the worker pick the messages up before stopping
        tokio::time::sleep(Duration::from_millis(5)).await;
        channel.stop_consuming().await;
        let stats = channel.stats();
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(stats.acked(), started.load(Ordering::SeqCst) as u64);
        assert_eq!(stats.published(), 4);
    }
}
