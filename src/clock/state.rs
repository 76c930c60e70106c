/// Lifecycle of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    /// First request issued, no sample processed yet.
    Syncing,
    /// At least one sample processed; re-syncing periodically.
    Steady,
}

/// One completed time-source round trip, all values in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTripSample {
    pub client_send_epoch: f64,
    pub server_time: f64,
    pub client_receive_epoch: f64,
}

impl RoundTripSample {
    pub fn round_trip_secs(&self) -> f64 {
        (self.client_receive_epoch - self.client_send_epoch).max(0.0)
    }

    /// Server time at receipt: half the round trip is attributed to the
    /// return leg.
    pub fn estimate(&self) -> f64 {
        self.server_time + (self.client_receive_epoch - self.client_send_epoch) / 2.0
    }
}

/// Cached clock estimate. Pure state: no timers, no I/O.
#[derive(Debug, Clone)]
pub struct ClockState {
    phase: SyncPhase,
    estimated_server_epoch: Option<f64>,
    // Request ids are issued in send order; the wall clock may step backward.
    next_request: u64,
    last_applied_request: Option<u64>,
    last_sync_epoch: Option<f64>,
    sync_in_progress: bool,
    samples_applied: u64,
}

impl ClockState {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Uninitialized,
            estimated_server_epoch: None,
            next_request: 0,
            last_applied_request: None,
            last_sync_epoch: None,
            sync_in_progress: false,
            samples_applied: 0,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn last_sync_epoch(&self) -> Option<f64> {
        self.last_sync_epoch
    }

    pub fn sync_in_progress(&self) -> bool {
        self.sync_in_progress
    }

    pub fn samples_applied(&self) -> u64 {
        self.samples_applied
    }

    pub fn estimated_server_epoch(&self) -> Option<f64> {
        self.estimated_server_epoch
    }

    /// Record that a request is leaving. Returns its request id.
    pub fn begin_sample(&mut self) -> u64 {
        if self.phase == SyncPhase::Uninitialized {
            self.phase = SyncPhase::Syncing;
        }
        self.sync_in_progress = true;
        self.issue_request()
    }

    /// Next request id, without touching the phase.
    pub fn issue_request(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }

    /// A request failed; the estimate and phase are left as they were.
    pub fn abort_sample(&mut self) {
        self.sync_in_progress = false;
    }

    /// Re-anchor on `sample`. Returns the new estimate, or `None` when the
    /// sample was ignored: never started, zero/non-finite server time, or
    /// issued before the request already applied.
    pub fn apply_sample(&mut self, request: u64, sample: RoundTripSample) -> Option<f64> {
        if self.phase == SyncPhase::Uninitialized {
            return None;
        }
        self.sync_in_progress = false;
        if !sample.server_time.is_finite() || sample.server_time <= 0.0 {
            return None;
        }
        if self.last_applied_request.is_some_and(|prev| request < prev) {
            return None;
        }

        let estimate = sample.estimate();
        self.estimated_server_epoch = Some(estimate);
        self.last_applied_request = Some(request);
        self.last_sync_epoch = Some(sample.client_receive_epoch);
        self.samples_applied += 1;
        self.phase = SyncPhase::Steady;
        Some(estimate)
    }

    /// Move the estimate forward by `step_secs` (no-op before the first sample).
    pub fn advance(&mut self, step_secs: f64) -> Option<f64> {
        let est = self.estimated_server_epoch.as_mut()?;
        *est += step_secs;
        Some(*est)
    }

    /// Cached estimate, or `local_now` when no sample has been processed.
    pub fn epoch_or(&self, local_now: f64) -> f64 {
        self.estimated_server_epoch.unwrap_or(local_now)
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(send: f64, server: f64, recv: f64) -> RoundTripSample {
        RoundTripSample {
            client_send_epoch: send,
            server_time: server,
            client_receive_epoch: recv,
        }
    }

    #[test]
    fn half_round_trip_is_added() {
        let mut state = ClockState::new();
        let request = state.begin_sample();
        assert_eq!(state.phase(), SyncPhase::Syncing);
        assert_eq!(state.apply_sample(request, sample(100.0, 200.0, 104.0)), Some(202.0));
        assert_eq!(state.phase(), SyncPhase::Steady);

        for _ in 0..3 {
            state.advance(1.0);
        }
        assert_eq!(state.epoch_or(0.0), 205.0);
    }

    #[test]
    fn sample_before_start_is_ignored() {
        let mut state = ClockState::new();
        assert_eq!(state.apply_sample(1, sample(1.0, 2.0, 3.0)), None);
        assert_eq!(state.phase(), SyncPhase::Uninitialized);
        assert_eq!(state.epoch_or(42.5), 42.5);
    }

    #[test]
    fn stale_sample_does_not_reanchor() {
        let mut state = ClockState::new();
        let first = state.begin_sample();
        let second = state.begin_sample();
        assert_eq!(state.apply_sample(second, sample(20.0, 500.0, 22.0)), Some(501.0));
        assert_eq!(state.apply_sample(first, sample(10.0, 400.0, 23.0)), None);
        assert_eq!(state.estimated_server_epoch(), Some(501.0));
        assert_eq!(state.samples_applied(), 1);
    }

    #[test]
    fn later_request_applies_after_wall_clock_steps_back() {
        let mut state = ClockState::new();
        let first = state.begin_sample();
        assert_eq!(state.apply_sample(first, sample(10_000.0, 5_000.0, 10_000.0)), Some(5_000.0));

        let second = state.begin_sample();
        assert_eq!(state.apply_sample(second, sample(6_400.0, 9_000.0, 6_402.0)), Some(9_001.0));
        assert_eq!(state.last_sync_epoch(), Some(6_402.0));
        assert_eq!(state.samples_applied(), 2);
    }

    #[test]
    fn zero_server_time_is_ignored() {
        let mut state = ClockState::new();
        let request = state.begin_sample();
        assert_eq!(state.apply_sample(request, sample(10.0, 0.0, 11.0)), None);
        assert!(!state.sync_in_progress());
        assert_eq!(state.phase(), SyncPhase::Syncing);
    }

    #[test]
    fn advance_before_first_sample_is_noop() {
        let mut state = ClockState::new();
        assert_eq!(state.advance(1.0), None);
        assert_eq!(state.estimated_server_epoch(), None);
    }
}
