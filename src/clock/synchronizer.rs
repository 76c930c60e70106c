use chrono::{DateTime, Local, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::source::{TimeSource, WallClock};
use super::state::{ClockState, RoundTripSample, SyncPhase};
use crate::config::ClockConfig;
use crate::gate::ReadyGate;

/// Called with the current estimate after every local advance.
pub type ClockObserver = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSyncConfig {
    pub resync_interval: Duration,
    pub tick_interval: Duration,
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl From<&ClockConfig> for ClockSyncConfig {
    fn from(cfg: &ClockConfig) -> Self {
        Self {
            resync_interval: cfg.resync_interval(),
            tick_interval: cfg.tick_interval(),
        }
    }
}

enum SampleMsg {
    Completed { request: u64, sample: RoundTripSample },
    Failed,
}

struct Shared {
    cfg: ClockSyncConfig,
    state: Mutex<ClockState>,
    observer: Mutex<Option<ClockObserver>>,
    wall: Arc<dyn WallClock>,
    source: Arc<dyn TimeSource>,
    ready: ReadyGate,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ClockState> {
        // Reads must never fail; a poisoned lock still holds a usable estimate.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn observer(&self) -> Option<ClockObserver> {
        self.observer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn request_sample(self: &Arc<Self>, tx: mpsc::UnboundedSender<SampleMsg>) {
        let request = self.state().begin_sample();
        let send_epoch = self.wall.now_epoch();

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let msg = match shared.source.fetch_time().await {
                Ok(reply) => SampleMsg::Completed {
                    request,
                    sample: RoundTripSample {
                        client_send_epoch: send_epoch,
                        server_time: reply.time,
                        client_receive_epoch: shared.wall.now_epoch(),
                    },
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Time source request failed");
                    SampleMsg::Failed
                }
            };
            let _ = tx.send(msg);
        });
    }

    /// Returns `true` when the estimate was re-anchored.
    fn on_sample(&self, msg: SampleMsg) -> bool {
        let (request, sample) = match msg {
            SampleMsg::Completed { request, sample } => (request, sample),
            SampleMsg::Failed => {
                self.state().abort_sample();
                return false;
            }
        };

        let applied = self.state().apply_sample(request, sample);
        match applied {
            Some(epoch) => {
                tracing::debug!(
                    epoch,
                    rtt_ms = (sample.round_trip_secs() * 1000.0) as u64,
                    "Clock re-anchored"
                );
                if self.ready.open() {
                    tracing::info!(epoch, "Clock synchronized");
                }
                true
            }
            None => {
                tracing::debug!(server_time = sample.server_time, "Ignored time sample");
                false
            }
        }
    }

    fn on_tick(&self) {
        let advanced = self.state().advance(self.cfg.tick_interval.as_secs_f64());
        if let (Some(epoch), Some(observer)) = (advanced, self.observer()) {
            observer(epoch);
        }
    }
}

/// Drift-corrected estimate of a remote clock.
///
/// Samples the [`TimeSource`] every `resync_interval`, attributing half of
/// each round trip to the return leg, and advances the estimate locally every
/// `tick_interval` in between. Reads never block and never fail: before the
/// first sample they return the local wall clock.
pub struct ClockSynchronizer {
    shared: Arc<Shared>,
    started: AtomicBool,
    sample_tx: mpsc::UnboundedSender<SampleMsg>,
    sample_rx: Mutex<Option<mpsc::UnboundedReceiver<SampleMsg>>>,
    shutdown_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ClockSynchronizer {
    pub fn new(
        cfg: ClockSyncConfig,
        wall: Arc<dyn WallClock>,
        source: Arc<dyn TimeSource>,
    ) -> Self {
        assert!(!cfg.tick_interval.is_zero(), "tick_interval must be > 0");
        assert!(!cfg.resync_interval.is_zero(), "resync_interval must be > 0");
        let (sample_tx, sample_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                cfg,
                state: Mutex::new(ClockState::new()),
                observer: Mutex::new(None),
                wall,
                source,
                ready: ReadyGate::new(),
            }),
            started: AtomicBool::new(false),
            sample_tx,
            sample_rx: Mutex::new(Some(sample_rx)),
            shutdown_tx,
            driver: Mutex::new(None),
        }
    }

    /// Start sampling and wait for the first processed sample.
    ///
    /// The observer slot is replaced on every call. Calls after the first do
    /// not restart sampling; they wait on the same readiness gate.
    pub async fn init(&self, observer: Option<ClockObserver>) {
        self.set_observer(observer);
        self.start();
        self.shared.ready.wait().await;
    }

    /// Spawn the driver task if it is not running yet. Must be called from
    /// within a Tokio runtime. Returns `false` when already started.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let Some(sample_rx) = self
            .sample_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return false;
        };

        tracing::info!(
            resync_ms = self.shared.cfg.resync_interval.as_millis() as u64,
            tick_ms = self.shared.cfg.tick_interval.as_millis() as u64,
            "Starting clock synchronizer"
        );
        let handle = tokio::spawn(run_driver(
            Arc::clone(&self.shared),
            self.sample_tx.clone(),
            sample_rx,
            self.shutdown_tx.subscribe(),
        ));
        *self.driver.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        true
    }

    pub fn set_observer(&self, observer: Option<ClockObserver>) {
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = observer;
    }

    /// Deliver a sample obtained outside the driver.
    ///
    /// If the synchronizer was never started, the sample is dropped and a
    /// fresh start is performed instead.
    pub fn handle_sample(&self, sample: RoundTripSample) {
        if !self.started.load(Ordering::SeqCst) {
            tracing::warn!("Time sample received before start, initializing");
            self.start();
            return;
        }
        let request = self.shared.state().issue_request();
        let _ = self.sample_tx.send(SampleMsg::Completed { request, sample });
    }

    /// Best current estimate of the remote clock in epoch seconds.
    pub fn estimated_epoch(&self) -> f64 {
        let local_now = self.shared.wall.now_epoch();
        self.shared.state().epoch_or(local_now)
    }

    pub fn utc_date(&self) -> DateTime<Utc> {
        epoch_to_utc(self.estimated_epoch())
    }

    pub fn local_date(&self) -> DateTime<Local> {
        self.utc_date().with_timezone(&Local)
    }

    pub fn phase(&self) -> SyncPhase {
        self.shared.state().phase()
    }

    pub fn is_synced(&self) -> bool {
        self.shared.ready.is_open()
    }

    pub fn last_sync_epoch(&self) -> Option<f64> {
        self.shared.state().last_sync_epoch()
    }

    pub fn samples_applied(&self) -> u64 {
        self.shared.state().samples_applied()
    }

    /// Readiness gate opened by the first processed sample.
    pub fn ready(&self) -> ReadyGate {
        self.shared.ready.clone()
    }

    /// Cancel both timers and wait for the driver to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Clock driver ended abnormally");
            }
            tracing::info!("Clock synchronizer stopped");
        }
    }
}

impl Drop for ClockSynchronizer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn epoch_to_utc(epoch: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis((epoch * 1000.0).round() as i64).unwrap_or_default()
}

fn arm_ticker(period: Duration) -> Interval {
    tokio::time::interval_at(Instant::now() + period, period)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn run_driver(
    shared: Arc<Shared>,
    sample_tx: mpsc::UnboundedSender<SampleMsg>,
    mut sample_rx: mpsc::UnboundedReceiver<SampleMsg>,
    mut shutdown: watch::Receiver<bool>,
) {
    if *shutdown.borrow() {
        return;
    }
    let mut resync = tokio::time::interval(shared.cfg.resync_interval);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Armed by the first sample, re-armed by every later one.
    let mut ticker: Option<Interval> = None;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = resync.tick() => shared.request_sample(sample_tx.clone()),
            Some(msg) = sample_rx.recv() => {
                if shared.on_sample(msg) {
                    ticker = Some(arm_ticker(shared.cfg.tick_interval));
                }
            }
            _ = next_tick(&mut ticker) => shared.on_tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_to_utc_keeps_millis() {
        let dt = epoch_to_utc(202.5);
        assert_eq!(dt.timestamp(), 202);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn config_conversion() {
        let cfg = ClockSyncConfig::from(&ClockConfig::default());
        assert_eq!(cfg, ClockSyncConfig::default());
    }
}
