//! Record dispatcher.
//!
//! ```text
//! broker ──read loop──┬─► snapshot queue ─► worker ─► callback / tracker
//!                     ├─► order queue ────► worker ─► callback / tracker
//!                     ├─► transaction q ──► worker ─► callback / tracker
//!                     └─► envelope queue ─► worker ─► callback / tracker
//! ```
//!
//! Queues exist only for routes with a callback or a tracker. The envelope
//! queue sees every classified record in read order; the typed queues keep
//! order within their own type only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use md_core::{
    parse_market_data, parse_order, parse_snapshot, parse_transaction, MarketData, MdKey, Meta,
    Order, ParseError, RawRecord, Snapshot, Transaction,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::broker::{Broker, BrokerError};
use crate::config::ConsumerConfig;
use crate::error::ConsumerError;
use crate::queue::{OverflowPolicy, RecordQueue, RecordReceiver};
use crate::tracker::TickTracker;

/// User callback for a parsed payload and its provenance.
pub type Callback<T> = Arc<dyn Fn(&T, &Meta) + Send + Sync>;

type Parser<T> = fn(&RawRecord) -> Result<(T, Meta), ParseError>;

struct Route<T> {
    callback: Option<Callback<T>>,
    tracker: Option<Arc<TickTracker>>,
}

impl<T> Route<T> {
    fn empty() -> Self {
        Self {
            callback: None,
            tracker: None,
        }
    }

    fn is_active(&self) -> bool {
        self.callback.is_some() || self.tracker.is_some()
    }
}

struct Routes {
    snapshot: Route<Snapshot>,
    order: Route<Order>,
    transaction: Route<Transaction>,
    md: Route<MarketData>,
}

/// Per-consumer counters. Cheap to read while the consumer runs.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    records_read: AtomicU64,
    empty_key: AtomicU64,
    unknown_key: AtomicU64,
    parse_errors: AtomicU64,
    broker_errors: AtomicU64,
    dropped: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub records_read: u64,
    pub empty_key: u64,
    pub unknown_key: u64,
    pub parse_errors: u64,
    pub broker_errors: u64,
    pub dropped: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            empty_key: self.empty_key.load(Ordering::Relaxed),
            unknown_key: self.unknown_key.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            broker_errors: self.broker_errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Cloneable stop signal shared by the read loop and every worker.
#[derive(Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Ask everything to stop. Queued records are not drained.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct ConsumerBuilder<B> {
    broker: B,
    config: ConsumerConfig,
    routes: Routes,
}

impl<B: Broker + 'static> ConsumerBuilder<B> {
    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn with_snapshot_callback(
        mut self,
        callback: impl Fn(&Snapshot, &Meta) + Send + Sync + 'static,
    ) -> Self {
        self.routes.snapshot.callback = Some(Arc::new(callback));
        self
    }

    pub fn with_order_callback(
        mut self,
        callback: impl Fn(&Order, &Meta) + Send + Sync + 'static,
    ) -> Self {
        self.routes.order.callback = Some(Arc::new(callback));
        self
    }

    pub fn with_transaction_callback(
        mut self,
        callback: impl Fn(&Transaction, &Meta) + Send + Sync + 'static,
    ) -> Self {
        self.routes.transaction.callback = Some(Arc::new(callback));
        self
    }

    /// Receive every classified record as a [`MarketData`] envelope.
    pub fn with_md_callback(
        mut self,
        callback: impl Fn(&MarketData, &Meta) + Send + Sync + 'static,
    ) -> Self {
        self.routes.md.callback = Some(Arc::new(callback));
        self
    }

    pub fn with_snapshot_tracker(mut self, tracker: Arc<TickTracker>) -> Self {
        self.routes.snapshot.tracker = Some(tracker);
        self
    }

    pub fn with_order_tracker(mut self, tracker: Arc<TickTracker>) -> Self {
        self.routes.order.tracker = Some(tracker);
        self
    }

    pub fn with_transaction_tracker(mut self, tracker: Arc<TickTracker>) -> Self {
        self.routes.transaction.tracker = Some(tracker);
        self
    }

    pub fn with_md_tracker(mut self, tracker: Arc<TickTracker>) -> Self {
        self.routes.md.tracker = Some(tracker);
        self
    }

    pub fn build(self) -> Consumer<B> {
        Consumer {
            broker: self.broker,
            config: self.config,
            routes: self.routes,
            token: CancellationToken::new(),
            stats: Arc::new(ConsumerStats::default()),
        }
    }
}

/// Reads a broker and fans records out to typed worker loops.
pub struct Consumer<B> {
    broker: B,
    config: ConsumerConfig,
    routes: Routes,
    token: CancellationToken,
    stats: Arc<ConsumerStats>,
}

struct Queues {
    snapshot: Option<RecordQueue>,
    order: Option<RecordQueue>,
    transaction: Option<RecordQueue>,
    md: Option<RecordQueue>,
}

impl Queues {
    fn for_key(&self, key: MdKey) -> Option<&RecordQueue> {
        match key {
            MdKey::Snapshot => self.snapshot.as_ref(),
            MdKey::Order => self.order.as_ref(),
            MdKey::Transaction => self.transaction.as_ref(),
        }
    }

    fn names(&self) -> Vec<&'static str> {
        [&self.snapshot, &self.order, &self.transaction, &self.md]
            .into_iter()
            .flatten()
            .map(RecordQueue::name)
            .collect()
    }
}

impl<B: Broker + 'static> Consumer<B> {
    pub fn builder(broker: B) -> ConsumerBuilder<B> {
        ConsumerBuilder {
            broker,
            config: ConsumerConfig::default(),
            routes: Routes {
                snapshot: Route::empty(),
                order: Route::empty(),
                transaction: Route::empty(),
                md: Route::empty(),
            },
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.token.clone(),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the consumer on a new task.
    pub fn start(self) -> (StopHandle, JoinHandle<Result<(), ConsumerError>>) {
        let stop = self.stop_handle();
        (stop, tokio::spawn(self.run()))
    }

    /// Drive the read loop on the current task until stopped or the broker
    /// fails for good. The broker is always closed on the way out.
    ///
    /// A broker that reports [`BrokerError::Closed`] ends the run cleanly,
    /// after the workers have drained what was already queued.
    pub async fn run(self) -> Result<(), ConsumerError> {
        let Consumer {
            mut broker,
            config,
            routes,
            token,
            stats,
        } = self;

        let (queues, workers) = spawn_workers(routes, &config, &token, &stats);
        if queues.names().is_empty() {
            warn!("no callbacks or trackers registered, records will only be counted");
        }
        info!(
            queues = ?queues.names(),
            capacity = config.queue_capacity,
            overflow = ?config.overflow,
            "consumer started"
        );

        let mut fatal = None;
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = broker.read_next() => next,
            };

            match next {
                Ok(record) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = dispatch(record, &queues, &stats) => {}
                    }
                }
                Err(BrokerError::Closed) => {
                    info!("broker stream ended");
                    break;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "broker failed, stopping read loop");
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    bump(&stats.broker_errors);
                    error!(error = %e, "broker read failed, retrying");
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(config.retry_backoff) => {}
                    }
                }
            }
        }

        // dropping the senders lets workers finish their backlog unless stopped
        drop(queues);
        let closed = broker.close().await;
        match &closed {
            Ok(()) => info!("broker closed"),
            Err(e) => error!(error = %e, "failed to close broker"),
        }

        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker task failed");
            }
        }
        info!(stats = ?stats.snapshot(), "consumer stopped");

        if let Some(e) = fatal {
            return Err(e.into());
        }
        closed.map_err(ConsumerError::from)
    }
}

fn spawn_workers(
    routes: Routes,
    config: &ConsumerConfig,
    token: &CancellationToken,
    stats: &Arc<ConsumerStats>,
) -> (Queues, Vec<JoinHandle<()>>) {
    let mut workers = Vec::new();
    let queues = Queues {
        snapshot: spawn_route("snapshot", routes.snapshot, parse_snapshot, config, token, stats)
            .map(|(queue, worker)| {
                workers.push(worker);
                queue
            }),
        order: spawn_route("order", routes.order, parse_order, config, token, stats).map(
            |(queue, worker)| {
                workers.push(worker);
                queue
            },
        ),
        transaction: spawn_route(
            "transaction",
            routes.transaction,
            parse_transaction,
            config,
            token,
            stats,
        )
        .map(|(queue, worker)| {
            workers.push(worker);
            queue
        }),
        md: spawn_route("md", routes.md, parse_market_data, config, token, stats).map(
            |(queue, worker)| {
                workers.push(worker);
                queue
            },
        ),
    };
    (queues, workers)
}

/// Create the queue and worker for an active route.
fn spawn_route<T: Send + 'static>(
    name: &'static str,
    route: Route<T>,
    parse: Parser<T>,
    config: &ConsumerConfig,
    token: &CancellationToken,
    stats: &Arc<ConsumerStats>,
) -> Option<(RecordQueue, JoinHandle<()>)> {
    if !route.is_active() {
        return None;
    }
    let (queue, rx) = RecordQueue::bounded(
        name,
        config.queue_capacity,
        config.overflow,
        Arc::clone(&stats.dropped),
    );
    let worker = tokio::spawn(run_worker(
        name,
        rx,
        route,
        parse,
        token.clone(),
        Arc::clone(stats),
    ));
    Some((queue, worker))
}

async fn run_worker<T: Send>(
    name: &'static str,
    mut rx: RecordReceiver,
    route: Route<T>,
    parse: Parser<T>,
    token: CancellationToken,
    stats: Arc<ConsumerStats>,
) {
    info!(queue = name, "worker started");
    loop {
        let record = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            record = rx.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        let (payload, meta) = match parse(&record) {
            Ok(parsed) => parsed,
            Err(e) => {
                bump(&stats.parse_errors);
                warn!(
                    queue = name,
                    offset = e.meta.offset,
                    key = %e.meta.key,
                    error = %e.kind,
                    "dropping unparsable record"
                );
                continue;
            }
        };

        if let Some(callback) = &route.callback {
            callback(&payload, &meta);
        }
        if let Some(tracker) = &route.tracker {
            if let Some(tick) = tracker.observe_encoded(meta.event_time).await {
                debug!(queue = name, tick, offset = meta.offset, "tick advanced");
            }
        }
    }
    info!(queue = name, "worker stopped");
}

/// Classify one record by key and hand it to its queues.
async fn dispatch(record: RawRecord, queues: &Queues, stats: &ConsumerStats) {
    bump(&stats.records_read);

    if record.key.is_empty() {
        bump(&stats.empty_key);
        warn!(offset = record.offset, partition = record.partition, "record key is empty");
        return;
    }
    let key = match record.key.parse::<MdKey>() {
        Ok(key) => key,
        Err(_) => {
            bump(&stats.unknown_key);
            warn!(offset = record.offset, key = %record.key, "unknown record key");
            return;
        }
    };

    trace!(offset = record.offset, %key, "dispatching record");
    let record = Arc::new(record);
    if let Some(queue) = queues.for_key(key) {
        push(queue, Arc::clone(&record)).await;
    }
    if let Some(queue) = &queues.md {
        push(queue, record).await;
    }
}

async fn push(queue: &RecordQueue, record: Arc<RawRecord>) {
    let offset = record.offset;
    if queue.push(record).await.is_err() {
        warn!(queue = queue.name(), offset, "worker has exited, record lost");
    }
}
