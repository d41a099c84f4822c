//! Tick tracker.
//!
//! Turns a stream of event times into tick transitions. Market data arrives
//! far more often than ticks change (one transition a minute against
//! thousands of records), so downstream code can aggregate per tick without
//! looking at every record.

use std::sync::Arc;

use chrono::NaiveTime;
use md_core::{decode_time, TimeScale};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Called with the new tick index on every transition.
pub type TickCallback = Arc<dyn Fn(i64) + Send + Sync>;

const DEFAULT_ORDERED_CAPACITY: usize = 1024;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("tick tracker must be built inside a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Monotonic tick high-water mark with two notification paths.
///
/// * `on_tick` runs as a detached blocking task per transition. Its
///   completion is never awaited and transitions may be seen out of order.
/// * `on_tick_ordered` runs on a single worker, strictly in transition order.
///
/// Ties and regressions never notify: each tick fires at most once.
pub struct TickTracker {
    scale: TimeScale,
    latest: Mutex<i64>,
    on_tick: Option<TickCallback>,
    ordered_tx: Option<mpsc::Sender<i64>>,
    runtime: Handle,
    token: CancellationToken,
}

pub struct TickTrackerBuilder {
    scale: TimeScale,
    on_tick: Option<TickCallback>,
    on_tick_ordered: Option<TickCallback>,
    ordered_capacity: usize,
}

impl Default for TickTrackerBuilder {
    fn default() -> Self {
        Self {
            scale: TimeScale::default(),
            on_tick: None,
            on_tick_ordered: None,
            ordered_capacity: DEFAULT_ORDERED_CAPACITY,
        }
    }
}

impl TickTrackerBuilder {
    pub fn scale(mut self, scale: TimeScale) -> Self {
        self.scale = scale;
        self
    }

    /// Best-effort, unordered, unawaited notification.
    pub fn on_tick(mut self, callback: impl Fn(i64) + Send + Sync + 'static) -> Self {
        self.on_tick = Some(Arc::new(callback));
        self
    }

    /// Sequential notification in transition order.
    pub fn on_tick_ordered(mut self, callback: impl Fn(i64) + Send + Sync + 'static) -> Self {
        self.on_tick_ordered = Some(Arc::new(callback));
        self
    }

    pub fn ordered_capacity(mut self, capacity: usize) -> Self {
        self.ordered_capacity = capacity.max(1);
        self
    }

    /// Build the tracker and start the ordered worker, if any.
    pub fn build(self) -> Result<Arc<TickTracker>, TrackerError> {
        let runtime = Handle::try_current()?;
        let token = CancellationToken::new();

        let ordered_tx = self.on_tick_ordered.map(|callback| {
            let (tx, rx) = mpsc::channel(self.ordered_capacity);
            runtime.spawn(run_ordered(rx, callback, token.clone()));
            tx
        });

        tracing::debug!(scale = %self.scale, ordered = ordered_tx.is_some(), "tick tracker built");

        Ok(Arc::new(TickTracker {
            scale: self.scale,
            latest: Mutex::new(-1),
            on_tick: self.on_tick,
            ordered_tx,
            runtime,
            token,
        }))
    }
}

async fn run_ordered(mut rx: mpsc::Receiver<i64>, callback: TickCallback, token: CancellationToken) {
    loop {
        let tick = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            tick = rx.recv() => match tick {
                Some(tick) => tick,
                None => break,
            },
        };

        let cb = Arc::clone(&callback);
        if let Err(e) = tokio::task::spawn_blocking(move || cb(tick)).await {
            tracing::error!(tick, error = %e, "ordered tick callback failed");
        }
    }
    tracing::debug!("ordered tick worker stopped");
}

impl TickTracker {
    pub fn builder() -> TickTrackerBuilder {
        TickTrackerBuilder::default()
    }

    pub fn scale(&self) -> &TimeScale {
        &self.scale
    }

    /// Highest tick seen so far, `None` before the first in-session event.
    pub async fn latest_tick(&self) -> Option<i64> {
        let latest = *self.latest.lock().await;
        (latest >= 0).then_some(latest)
    }

    /// Record an event time. Returns the new tick on a transition.
    pub async fn observe(&self, time_of_day: NaiveTime) -> Option<i64> {
        let tick = self.scale.tick_index_for(time_of_day);
        if tick < 0 {
            return None;
        }

        // Held until the tick is queued so the ordered path sees transitions
        // in the order they were made.
        let mut latest = self.latest.lock().await;
        if tick <= *latest {
            return None;
        }
        *latest = tick;
        tracing::debug!(tick, "tick transition");

        if let Some(callback) = &self.on_tick {
            let cb = Arc::clone(callback);
            // detached
            drop(self.runtime.spawn_blocking(move || cb(tick)));
        }
        if let Some(tx) = &self.ordered_tx {
            if tx.send(tick).await.is_err() {
                tracing::debug!(tick, "ordered tick worker gone, dropping transition");
            }
        }
        Some(tick)
    }

    /// Record an encoded `HHMMSSmmm` event time.
    pub async fn observe_encoded(&self, encoded: i64) -> Option<i64> {
        match decode_time(encoded) {
            Some(time_of_day) => self.observe(time_of_day).await,
            None => {
                tracing::debug!(encoded, "event time does not decode to a time of day");
                None
            }
        }
    }

    /// Halt the ordered worker. Queued ticks are not delivered.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[tokio::test]
    async fn test_monotonic_transitions() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = TickTracker::builder()
            .on_tick_ordered(move |tick| sink.lock().unwrap().push(tick))
            .build()
            .unwrap();

        // ticks 0, 0, 1, 1, 0, 2
        let times = [
            at(9, 30, 0),
            at(9, 30, 45),
            at(9, 31, 0),
            at(9, 31, 59),
            at(9, 30, 10),
            at(9, 32, 1),
        ];
        let mut transitions = Vec::new();
        for time in times {
            if let Some(tick) = tracker.observe(time).await {
                transitions.push(tick);
            }
        }

        assert_eq!(transitions, vec![0, 1, 2]);
        assert_eq!(tracker.latest_tick().await, Some(2));

        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().unwrap().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_pre_session_is_ignored() {
        let tracker = TickTracker::builder().build().unwrap();
        assert_eq!(tracker.observe(at(8, 45, 0)).await, None);
        assert_eq!(tracker.latest_tick().await, None);
        assert_eq!(tracker.observe_encoded(93000111).await, Some(0));
        assert_eq!(tracker.observe_encoded(99999999).await, None);
    }

    #[tokio::test]
    async fn test_best_effort_callback_fires_once_per_tick() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = TickTracker::builder()
            .scale(TimeScale::parse("09:30:00", "15:00:00", 300).unwrap())
            .on_tick(move |tick| {
                let _ = tx.send(tick);
            })
            .build()
            .unwrap();

        for encoded in [93000000, 93459000, 93500000, 93500001, 94000000] {
            tracker.observe_encoded(encoded).await;
        }

        let mut ticks = Vec::new();
        for _ in 0..3 {
            let tick = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            ticks.push(tick);
        }
        ticks.sort();
        assert_eq!(ticks, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_stop_halts_ordered_worker() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = TickTracker::builder()
            .on_tick_ordered(move |tick| sink.lock().unwrap().push(tick))
            .build()
            .unwrap();

        tracker.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // transition still recorded, delivery is not
        assert_eq!(tracker.observe(at(10, 0, 0)).await, Some(30));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_build_outside_runtime() {
        assert!(matches!(
            TickTracker::builder().build(),
            Err(TrackerError::NoRuntime(_))
        ));
    }
}
