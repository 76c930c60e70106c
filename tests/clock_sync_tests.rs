use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use digit_pulse::clock::{
    ClockObserver, ClockSyncConfig, ClockSynchronizer, RoundTripSample, SyncPhase, SystemClock,
    TimeReply, TimeSource, WallClock,
};

#[derive(Clone)]
struct ManualClock(Arc<Mutex<f64>>);

impl ManualClock {
    fn new(epoch: f64) -> Self {
        Self(Arc::new(Mutex::new(epoch)))
    }

    fn set(&self, epoch: f64) {
        *self.0.lock().unwrap() = epoch;
    }
}

impl WallClock for ManualClock {
    fn now_epoch(&self) -> f64 {
        *self.0.lock().unwrap()
    }
}

/// Replies with scripted server times; optionally moves the local clock
/// while the "request" is in flight.
struct ScriptedSource {
    replies: Mutex<VecDeque<f64>>,
    clock: ManualClock,
    receive_at: Option<f64>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(replies: &[f64], clock: ManualClock, receive_at: Option<f64>) -> Self {
        Self {
            replies: Mutex::new(replies.iter().copied().collect()),
            clock,
            receive_at,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeSource for ScriptedSource {
    async fn fetch_time(&self) -> anyhow::Result<TimeReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(t) = self.receive_at {
            self.clock.set(t);
        }
        let mut replies = self.replies.lock().unwrap();
        let time = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().copied()
        };
        time.map(|time| TimeReply { time })
            .ok_or_else(|| anyhow::anyhow!("no scripted reply"))
    }
}

struct FailingSource;

#[async_trait]
impl TimeSource for FailingSource {
    async fn fetch_time(&self) -> anyhow::Result<TimeReply> {
        anyhow::bail!("time source unreachable")
    }
}

fn observer_channel() -> (ClockObserver, mpsc::UnboundedReceiver<f64>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer: ClockObserver = Arc::new(move |epoch| {
        let _ = tx.send(epoch);
    });
    (observer, rx)
}

#[tokio::test(start_paused = true)]
async fn first_sample_uses_half_round_trip_then_ticks_forward() {
    let clock = ManualClock::new(100.0);
    let source = Arc::new(ScriptedSource::new(&[200.0], clock.clone(), Some(104.0)));
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(clock.clone()),
        source.clone(),
    );
    let (observer, mut epochs) = observer_channel();

    sync.init(Some(observer)).await;
    assert_eq!(sync.phase(), SyncPhase::Steady);
    assert_eq!(sync.estimated_epoch(), 202.0);

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(epochs.recv().await.unwrap());
    }
    assert_eq!(seen, vec![203.0, 204.0, 205.0]);
    assert_eq!(sync.estimated_epoch(), 205.0);
    assert_eq!(source.calls(), 1);

    sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn resync_reanchors_the_estimate() {
    let clock = ManualClock::new(100.0);
    let source = Arc::new(ScriptedSource::new(&[200.0, 500.0], clock.clone(), None));
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(clock.clone()),
        source.clone(),
    );
    let (observer, mut epochs) = observer_channel();
    sync.init(Some(observer)).await;
    assert_eq!(sync.estimated_epoch(), 200.0);

    let mut last = 0.0;
    for _ in 0..40 {
        last = epochs.recv().await.unwrap();
        if last > 300.0 {
            break;
        }
    }
    assert_eq!(last, 501.0);
    assert_eq!(source.calls(), 2);
    assert_eq!(sync.samples_applied(), 2);

    sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn resync_applies_after_wall_clock_steps_backward() {
    let clock = ManualClock::new(10_000.0);
    let source = Arc::new(ScriptedSource::new(&[5_000.0, 9_000.0], clock.clone(), None));
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(clock.clone()),
        source.clone(),
    );
    let (observer, mut epochs) = observer_channel();
    sync.init(Some(observer)).await;
    assert_eq!(sync.estimated_epoch(), 5_000.0);
    assert_eq!(sync.last_sync_epoch(), Some(10_000.0));

    clock.set(6_400.0);

    let mut last = 0.0;
    for _ in 0..40 {
        last = epochs.recv().await.unwrap();
        if last > 8_000.0 {
            break;
        }
    }
    assert_eq!(last, 9_001.0);
    assert_eq!(sync.samples_applied(), 2);
    assert_eq!(sync.last_sync_epoch(), Some(6_400.0));

    sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_init_does_not_restart_sampling() {
    let clock = ManualClock::new(10.0);
    let source = Arc::new(ScriptedSource::new(&[1_000.0], clock.clone(), None));
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(clock.clone()),
        source.clone(),
    );

    tokio::join!(sync.init(None), sync.init(None));
    sync.init(None).await;

    assert!(sync.is_synced());
    assert_eq!(source.calls(), 1);
    assert!(!sync.start());

    sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transport_failure_keeps_local_fallback() {
    let clock = ManualClock::new(1_234.5);
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(clock.clone()),
        Arc::new(FailingSource),
    );

    let waited = tokio::time::timeout(Duration::from_secs(5), sync.init(None)).await;
    assert!(waited.is_err());
    assert_eq!(sync.phase(), SyncPhase::Syncing);
    assert!(!sync.is_synced());
    assert_eq!(sync.estimated_epoch(), 1_234.5);

    clock.set(1_300.0);
    assert_eq!(sync.estimated_epoch(), 1_300.0);

    sync.shutdown().await;
}

#[tokio::test]
async fn estimate_before_any_sample_is_wall_clock() {
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(SystemClock),
        Arc::new(FailingSource),
    );
    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    assert!((sync.estimated_epoch() - now).abs() < 1.0);
    assert_eq!(sync.phase(), SyncPhase::Uninitialized);
    assert!((sync.utc_date().timestamp() as f64 - now).abs() < 2.0);
}

#[tokio::test(start_paused = true)]
async fn sample_before_start_triggers_initialization() {
    let clock = ManualClock::new(50.0);
    let source = Arc::new(ScriptedSource::new(&[900.0], clock.clone(), None));
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(clock.clone()),
        source.clone(),
    );

    sync.handle_sample(RoundTripSample {
        client_send_epoch: 1.0,
        server_time: 5.0,
        client_receive_epoch: 2.0,
    });
    sync.ready().wait().await;

    // The stray sample was dropped; the estimate comes from the source.
    assert_eq!(sync.estimated_epoch(), 900.0);
    assert_eq!(source.calls(), 1);

    sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn external_sample_reanchors_when_running() {
    let clock = ManualClock::new(50.0);
    let source = Arc::new(ScriptedSource::new(&[900.0], clock.clone(), None));
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(clock.clone()),
        source.clone(),
    );
    let (observer, mut epochs) = observer_channel();
    sync.init(Some(observer)).await;

    sync.handle_sample(RoundTripSample {
        client_send_epoch: 60.0,
        server_time: 2_000.0,
        client_receive_epoch: 62.0,
    });
    assert_eq!(epochs.recv().await.unwrap(), 2_002.0);

    sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_ticking() {
    let clock = ManualClock::new(100.0);
    let source = Arc::new(ScriptedSource::new(&[200.0], clock.clone(), None));
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(clock.clone()),
        source.clone(),
    );
    let (observer, mut epochs) = observer_channel();
    sync.init(Some(observer)).await;
    assert_eq!(epochs.recv().await.unwrap(), 201.0);

    sync.shutdown().await;
    let frozen = sync.estimated_epoch();
    tokio::time::sleep(Duration::from_secs(90)).await;

    assert_eq!(sync.estimated_epoch(), frozen);
    assert!(epochs.try_recv().is_err());
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn local_and_utc_dates_follow_the_estimate() {
    let clock = ManualClock::new(100.0);
    let source = Arc::new(ScriptedSource::new(&[1_700_000_000.0], clock.clone(), None));
    let sync = ClockSynchronizer::new(
        ClockSyncConfig::default(),
        Arc::new(clock.clone()),
        source,
    );
    sync.init(None).await;

    assert_eq!(sync.utc_date().timestamp(), 1_700_000_000);
    assert_eq!(sync.local_date().timestamp(), 1_700_000_000);

    sync.shutdown().await;
}
