//! Sliding-window frequency of the last quoted digit.

pub mod bars;
pub mod extract;
pub mod tracker;
pub mod window;

pub use bars::{derive_bars, Bar, BarClass};
pub use extract::{format_fixed, last_digit};
pub use tracker::{DigitFrequencyTracker, TickOutcome};
pub use window::{HistogramWindow, DEFAULT_WINDOW_CAPACITY, DIGIT_BUCKETS};
