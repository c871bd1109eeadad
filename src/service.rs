use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::sampling::{
    Clock, ConfigError, DataPoint, Sampler, SamplerStats, SamplingConfig, SystemClock, Timestamp,
    WindowSummary,
};

// ─── Configuration ───────────────────────────────────────────────

/// Bounded inbox: producers wait rather than grow memory without limit.
const INBOX_CAPACITY: usize = 1024;

/// Snapshots buffered per subscriber before the slowest one starts lagging.
const SNAPSHOT_CAPACITY: usize = 64;

pub const DEFAULT_RANGE_MINUTES: u32 = 5;
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub sampling: SamplingConfig,
    /// Active query range right after `init`
    pub default_range_minutes: u32,
    /// Minimum spacing between append-triggered snapshots
    pub snapshot_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            default_range_minutes: DEFAULT_RANGE_MINUTES,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampling.validate()?;
        if self.default_range_minutes == 0 {
            return Err(ConfigError::ZeroDefaultRange);
        }
        Ok(())
    }
}

// ─── Messages ────────────────────────────────────────────────────

/// Everything the service can be asked to do.
#[derive(Debug)]
pub enum Command {
    /// Replace the sampler; prior data is discarded.
    Init(ServiceConfig),
    /// One raw sample. `timestamp` defaults to the service clock.
    Append {
        up: f64,
        down: f64,
        timestamp: Option<Timestamp>,
    },
    Clear,
    SetRange { minutes: u32 },
    /// Broadcast now, bypassing the throttle. `reply` also receives the snapshot.
    RequestSnapshot {
        reply: Option<oneshot::Sender<Arc<Snapshot>>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotReason {
    Init,
    Append,
    Clear,
    RangeChange,
    Request,
}

/// Complete queryable state, broadcast to every subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// The active range, oldest first
    pub data_points: Vec<DataPoint>,
    /// The longest range the sampler can answer, for range pickers
    pub available_data_points: Vec<DataPoint>,
    pub sampler_stats: SamplerStats,
    pub range_minutes: u32,
    pub last_timestamp: Option<Timestamp>,
    pub reason: SnapshotReason,
    /// Percentiles over `data_points`
    pub summary: WindowSummary,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("sampling service has shut down")]
    Closed,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("range must be at least one minute")]
    InvalidRange,
}

// ─── Handle ──────────────────────────────────────────────────────

/// Cloneable front door to a running `SamplingService`.
/// The service stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct SamplingHandle {
    tx: mpsc::Sender<Command>,
    snapshots: broadcast::Sender<Arc<Snapshot>>,
}

impl SamplingHandle {
    pub async fn init(&self, config: ServiceConfig) -> Result<(), ServiceError> {
        config.validate()?;
        self.send(Command::Init(config)).await
    }

    pub async fn append(
        &self,
        up: f64,
        down: f64,
        timestamp: Option<Timestamp>,
    ) -> Result<(), ServiceError> {
        self.send(Command::Append {
            up,
            down,
            timestamp,
        })
        .await
    }

    pub async fn clear(&self) -> Result<(), ServiceError> {
        self.send(Command::Clear).await
    }

    pub async fn set_range(&self, minutes: u32) -> Result<(), ServiceError> {
        if minutes == 0 {
            return Err(ServiceError::InvalidRange);
        }
        self.send(Command::SetRange { minutes }).await
    }

    pub async fn request_snapshot(&self) -> Result<(), ServiceError> {
        self.send(Command::RequestSnapshot { reply: None }).await
    }

    /// Request a snapshot and wait for it. Subscribers see it too.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RequestSnapshot { reply: Some(reply) })
            .await?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.snapshots.subscribe()
    }

    async fn send(&self, cmd: Command) -> Result<(), ServiceError> {
        self.tx.send(cmd).await.map_err(|_| ServiceError::Closed)
    }
}

// ─── Service ─────────────────────────────────────────────────────

/// Owns the sampler. All mutation happens inside `run`, one message at a time.
pub struct SamplingService {
    sampler: Sampler,
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    range_minutes: u32,
    last_timestamp: Option<Timestamp>,
    // Deadline of the pending throttled broadcast, if one is armed
    flush_at: Option<Instant>,
    inbox: mpsc::Receiver<Command>,
    outbox: broadcast::Sender<Arc<Snapshot>>,
}

impl SamplingService {
    /// Start the service on the current tokio runtime.
    pub fn spawn(config: ServiceConfig) -> Result<SamplingHandle, ServiceError> {
        Self::spawn_with_clock(config, Arc::new(SystemClock))
    }

    pub fn spawn_with_clock(
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<SamplingHandle, ServiceError> {
        config.validate()?;
        let sampler = Sampler::with_clock(config.sampling, clock.clone())?;
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (outbox, _) = broadcast::channel(SNAPSHOT_CAPACITY);

        let service = Self {
            sampler,
            config,
            clock,
            range_minutes: config.default_range_minutes,
            last_timestamp: None,
            flush_at: None,
            inbox,
            outbox: outbox.clone(),
        };
        tokio::spawn(service.run());

        Ok(SamplingHandle {
            tx,
            snapshots: outbox,
        })
    }

    async fn run(mut self) {
        info!(config = ?self.config, "sampling service started");
        loop {
            tokio::select! {
                cmd = self.inbox.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                () = flush_due(self.flush_at), if self.flush_at.is_some() => {
                    self.flush_at = None;
                    self.broadcast(SnapshotReason::Append);
                }
            }
        }
        info!("sampling service stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Init(config) => self.init(config),
            Command::Append {
                up,
                down,
                timestamp,
            } => self.append(up, down, timestamp),
            Command::Clear => {
                self.sampler.clear();
                self.last_timestamp = None;
                info!("sampler cleared");
                self.broadcast(SnapshotReason::Clear);
            }
            Command::SetRange { minutes } => {
                if minutes != self.range_minutes {
                    debug!(from = self.range_minutes, to = minutes, "range changed");
                    self.range_minutes = minutes;
                    self.broadcast(SnapshotReason::RangeChange);
                }
            }
            Command::RequestSnapshot { reply } => {
                let snapshot = self.broadcast(SnapshotReason::Request);
                if let Some(reply) = reply {
                    let _ = reply.send(snapshot);
                }
            }
        }
    }

    fn init(&mut self, config: ServiceConfig) {
        match Sampler::with_clock(config.sampling, self.clock.clone()) {
            Ok(sampler) => {
                self.sampler = sampler;
                self.config = config;
                self.range_minutes = config.default_range_minutes;
                self.last_timestamp = None;
                info!(config = ?config, "sampler re-initialized");
                self.broadcast(SnapshotReason::Init);
            }
            Err(e) => warn!(error = %e, "ignoring init with invalid config"),
        }
    }

    fn append(&mut self, up: f64, down: f64, timestamp: Option<Timestamp>) {
        let timestamp = timestamp.unwrap_or_else(|| self.clock.now_ms());
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                warn!(timestamp, last, "append timestamp went backwards");
            }
        }
        self.sampler.add_data_point(DataPoint::new(up, down, timestamp));
        self.last_timestamp = Some(timestamp);

        // Arm the throttle once; later appends ride on the pending flush.
        if self.flush_at.is_none() {
            self.flush_at = Some(Instant::now() + self.config.snapshot_interval);
        }
    }

    fn broadcast(&self, reason: SnapshotReason) -> Arc<Snapshot> {
        let snapshot = Arc::new(self.snapshot(reason));
        // No subscribers is fine; the snapshot is simply dropped.
        let _ = self.outbox.send(snapshot.clone());
        snapshot
    }

    fn snapshot(&self, reason: SnapshotReason) -> Snapshot {
        let data_points = self.sampler.get_data_for_time_range(self.range_minutes);
        let summary = WindowSummary::from_points(&data_points);
        Snapshot {
            data_points,
            available_data_points: self.sampler.get_available_data(),
            sampler_stats: self.sampler.get_stats(),
            range_minutes: self.range_minutes,
            last_timestamp: self.last_timestamp,
            reason,
            summary,
        }
    }
}

async fn flush_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::ManualClock;
    use tokio::sync::broadcast::error::TryRecvError;

    fn config() -> ServiceConfig {
        ServiceConfig {
            sampling: SamplingConfig {
                raw_retention_minutes: 10,
                compressed_retention_minutes: 60,
                compression_ratio: 5,
            },
            default_range_minutes: 5,
            snapshot_interval: Duration::from_millis(250),
        }
    }

    fn spawn_at(now: Timestamp) -> (SamplingHandle, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let handle = SamplingService::spawn_with_clock(config(), clock.clone()).unwrap();
        (handle, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_appends_coalesces_into_one_snapshot() {
        let (handle, clock) = spawn_at(1_000_000);
        let mut rx = handle.subscribe();

        for i in 0..100 {
            handle.append(1.0, 2.0, Some(1_000_000 + i)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        clock.set(1_000_099);

        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.reason, SnapshotReason::Append);
        assert_eq!(snap.data_points.len(), 100);
        assert_eq!(snap.last_timestamp, Some(1_000_099));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_rearms_after_firing() {
        let (handle, _clock) = spawn_at(0);
        let mut rx = handle.subscribe();

        handle.append(1.0, 1.0, Some(0)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().reason, SnapshotReason::Append);

        handle.append(1.0, 1.0, Some(1)).await.unwrap();
        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.reason, SnapshotReason::Append);
        assert_eq!(snap.data_points.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn control_messages_broadcast_immediately() {
        let (handle, _clock) = spawn_at(10_000);
        let mut rx = handle.subscribe();

        handle.append(5.0, 6.0, Some(10_000)).await.unwrap();
        handle.request_snapshot().await.unwrap();
        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.reason, SnapshotReason::Request);
        // The request reflects the append processed before it.
        assert_eq!(snap.data_points.len(), 1);

        // The pending throttle was not cancelled.
        assert_eq!(rx.recv().await.unwrap().reason, SnapshotReason::Append);

        handle.clear().await.unwrap();
        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.reason, SnapshotReason::Clear);
        assert!(snap.data_points.is_empty());
        assert_eq!(snap.last_timestamp, None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_range_is_idempotent() {
        let (handle, _clock) = spawn_at(0);
        let mut rx = handle.subscribe();

        handle.set_range(5).await.unwrap();
        handle.set_range(30).await.unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.range_minutes, 30);

        // Only the actual change and the request were broadcast.
        assert_eq!(rx.recv().await.unwrap().reason, SnapshotReason::RangeChange);
        assert_eq!(rx.recv().await.unwrap().reason, SnapshotReason::Request);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        assert!(matches!(
            handle.set_range(0).await,
            Err(ServiceError::InvalidRange)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn init_replaces_sampler_and_resets_range() {
        let (handle, _clock) = spawn_at(0);
        handle.append(1.0, 1.0, Some(0)).await.unwrap();
        handle.set_range(30).await.unwrap();
        // Round-trip so the range change is broadcast before we subscribe.
        handle.snapshot().await.unwrap();

        let mut rx = handle.subscribe();
        let next = ServiceConfig {
            default_range_minutes: 2,
            ..config()
        };
        handle.init(next).await.unwrap();

        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.reason, SnapshotReason::Init);
        assert_eq!(snap.range_minutes, 2);
        assert_eq!(snap.sampler_stats.total_memory_points, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_init_is_rejected_at_the_handle() {
        let (handle, _clock) = spawn_at(0);
        handle.append(1.0, 1.0, Some(0)).await.unwrap();

        let bad = ServiceConfig {
            sampling: SamplingConfig {
                raw_retention_minutes: 30,
                compressed_retention_minutes: 10,
                compression_ratio: 5,
            },
            ..config()
        };
        assert!(matches!(
            handle.init(bad).await,
            Err(ServiceError::Config(_))
        ));

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.sampler_stats.raw_buffer_size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_timestamp_uses_the_service_clock() {
        let (handle, _clock) = spawn_at(3_723_000);
        handle.append(1.0, 2.0, None).await.unwrap();

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.last_timestamp, Some(3_723_000));
        assert_eq!(snap.data_points[0].label, "01:02:03");
        assert_eq!(snap.available_data_points.len(), 1);
        assert_eq!(snap.summary.down.p50, 2);
    }
}
