//! Drift-corrected logical server time.

pub mod source;
pub mod state;
pub mod synchronizer;

pub use source::{LocalTimeSource, SystemClock, TimeReply, TimeSource, WallClock};
pub use state::{ClockState, RoundTripSample, SyncPhase};
pub use synchronizer::{ClockObserver, ClockSyncConfig, ClockSynchronizer};
