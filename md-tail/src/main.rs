use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use md_consumer::{
    Broker, BrokerConfig, Consumer, LineBroker, Offset, OverflowPolicy, TickTracker,
    DEFAULT_QUEUE_CAPACITY,
};
use md_core::{MarketData, TimeScale};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Market data tail
///
/// Subscribes to a market data feed (or replays a captured frame file),
/// logs every tick transition of the trading session and prints per-type
/// record counts on exit.
#[derive(Parser, Debug)]
#[command(name = "md-tail")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Feed address (host:port)
    #[arg(long, default_value = "127.0.0.1:9092")]
    address: String,

    /// Topic to subscribe to
    #[arg(short, long, default_value = "md")]
    topic: String,

    /// Partition to read
    #[arg(short, long, default_value = "0")]
    partition: i32,

    /// Start offset: "earliest", "latest" or an absolute offset
    #[arg(short, long, default_value = "latest", allow_negative_numbers = true)]
    offset: String,

    /// Feed username, requires --password
    #[arg(long)]
    username: Option<String>,

    /// Feed password
    #[arg(long)]
    password: Option<String>,

    /// Replay newline-delimited frames from a file instead of dialing the feed
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Session start (HH:MM:SS)
    #[arg(long, default_value = "09:30:00")]
    session_start: String,

    /// Session end (HH:MM:SS)
    #[arg(long, default_value = "15:00:00")]
    session_end: String,

    /// Tick length in seconds
    #[arg(short, long, default_value = "60")]
    bucket: u32,

    /// Depth of each worker queue
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Drop records when a worker queue is full instead of waiting
    #[arg(long)]
    drop_newest: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn parse_offset(&self) -> Result<Offset> {
        match self.offset.to_lowercase().as_str() {
            "earliest" => Ok(Offset::Earliest),
            "latest" => Ok(Offset::Latest),
            other => {
                let offset: i64 = other
                    .parse()
                    .with_context(|| format!("invalid offset {other:?}"))?;
                if offset < 0 {
                    bail!("offset must not be negative, got {offset}");
                }
                Ok(Offset::At(offset))
            }
        }
    }

    fn broker_config(&self) -> Result<BrokerConfig> {
        let config = BrokerConfig::new(&self.address, &self.topic)
            .with_partition(self.partition)
            .with_offset(self.parse_offset()?);

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(config.with_auth(username, password)),
            (None, None) => Ok(config),
            _ => bail!("--username and --password must be given together"),
        }
    }

    fn time_scale(&self) -> Result<TimeScale> {
        TimeScale::parse(&self.session_start, &self.session_end, self.bucket)
            .context("invalid session settings")
    }

    fn overflow(&self) -> OverflowPolicy {
        if self.drop_newest {
            OverflowPolicy::DropNewest
        } else {
            OverflowPolicy::Block
        }
    }
}

#[derive(Default)]
struct Counts {
    snapshots: AtomicU64,
    orders: AtomicU64,
    transactions: AtomicU64,
}

impl Counts {
    fn record(&self, md: &MarketData) {
        let counter = match md {
            MarketData::Snapshot(_) => &self.snapshots,
            MarketData::Order(_) => &self.orders,
            MarketData::Transaction(_) => &self.transactions,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "md_tail={},md_consumer={},md_core={}",
                args.log_level, args.log_level, args.log_level
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let scale = args.time_scale()?;
    let config = args.broker_config()?;

    info!("📈 Market Data Tail Starting");
    info!("Configuration:");
    match &args.file {
        Some(path) => info!("  Replay file: {}", path.display()),
        None => info!("  Feed: {} topic={}", config.address, config.topic),
    }
    info!("  Partition: {}", config.partition);
    info!("  Offset: {:?}", config.offset);
    info!("  Session: {} ({} ticks)", scale, scale.tick_count());
    info!("  Queue: {} ({:?})", args.queue_capacity, args.overflow());

    match &args.file {
        Some(path) => {
            let broker = LineBroker::open(path, &config).await?;
            tail(broker, &args, scale).await
        }
        None => {
            let broker = LineBroker::connect(&config).await?;
            tail(broker, &args, scale).await
        }
    }
}

async fn tail<B: Broker + 'static>(broker: B, args: &Args, scale: TimeScale) -> Result<()> {
    let counts = Arc::new(Counts::default());

    let tick_counts = Arc::clone(&counts);
    let tracker = TickTracker::builder()
        .scale(scale)
        .on_tick_ordered(move |tick| {
            let started = scale
                .time_for(tick)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "--:--:--".to_string());
            info!(
                tick,
                started = %started,
                snapshots = tick_counts.snapshots.load(Ordering::Relaxed),
                orders = tick_counts.orders.load(Ordering::Relaxed),
                transactions = tick_counts.transactions.load(Ordering::Relaxed),
                "⏱ tick"
            );
        })
        .build()?;

    let md_counts = Arc::clone(&counts);
    let consumer = Consumer::builder(broker)
        .with_queue_capacity(args.queue_capacity)
        .with_overflow(args.overflow())
        .with_md_callback(move |md, _| md_counts.record(md))
        .with_md_tracker(Arc::clone(&tracker))
        .build();
    let stats = consumer.stats();

    let (stop, handle) = consumer.start();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            stop.stop();
        }
    });

    let result = handle.await.context("consumer task panicked")?;
    tracker.stop();

    let stats = stats.snapshot();
    info!("✅ Tail Complete");
    info!("  Records read: {}", stats.records_read);
    info!("  Snapshots: {}", counts.snapshots.load(Ordering::Relaxed));
    info!("  Orders: {}", counts.orders.load(Ordering::Relaxed));
    info!("  Transactions: {}", counts.transactions.load(Ordering::Relaxed));
    info!(
        "  Rejected: {} empty key, {} unknown key, {} unparsable, {} dropped",
        stats.empty_key, stats.unknown_key, stats.parse_errors, stats.dropped
    );
    if let Some(tick) = tracker.latest_tick().await {
        info!("  Last tick: {}", tick);
    }

    result?;
    Ok(())
}
