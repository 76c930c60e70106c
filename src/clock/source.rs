use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Local wall clock, in epoch seconds.
pub trait WallClock: Send + Sync {
    fn now_epoch(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_epoch(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Reply of a time source: seconds since epoch, integer or fractional.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TimeReply {
    pub time: f64,
}

/// Remote reference clock sampled by the synchronizer.
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn fetch_time(&self) -> Result<TimeReply>;
}

/// Answers with the local wall clock truncated to whole seconds.
///
/// Useful when no remote reference is configured: the estimate then tracks
/// local time, advanced between samples by the synchronizer's ticker.
pub struct LocalTimeSource {
    clock: Arc<dyn WallClock>,
}

impl LocalTimeSource {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        Self { clock }
    }
}

impl Default for LocalTimeSource {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl TimeSource for LocalTimeSource {
    async fn fetch_time(&self) -> Result<TimeReply> {
        Ok(TimeReply {
            time: self.clock.now_epoch().floor(),
        })
    }
}
