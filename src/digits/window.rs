use std::collections::VecDeque;

pub const DIGIT_BUCKETS: usize = 10;
pub const DEFAULT_WINDOW_CAPACITY: usize = 1000;

/// One admitted observation: the raw price and the digit it was counted under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEntry {
    pub price: f64,
    pub digit: u8,
}

/// Fixed-capacity FIFO of recent observations with a 10-bucket digit histogram.
///
/// `counts` always sums to `len()`. Eviction decrements the digit the entry
/// was admitted under, so the histogram never depends on how a price would
/// be re-formatted later.
#[derive(Debug, Clone)]
pub struct HistogramWindow {
    capacity: usize,
    entries: VecDeque<WindowEntry>,
    counts: [u32; DIGIT_BUCKETS],
}

impl HistogramWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be > 0");
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            counts: [0; DIGIT_BUCKETS],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn counts(&self) -> &[u32; DIGIT_BUCKETS] {
        &self.counts
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.price).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.counts = [0; DIGIT_BUCKETS];
    }

    /// Admit an observation, evicting the oldest one only when full.
    pub fn push(&mut self, price: f64, digit: u8) -> Option<WindowEntry> {
        let evicted = if self.is_full() {
            self.evict_oldest()
        } else {
            None
        };
        self.admit(price, digit);
        evicted
    }

    /// Evict the oldest observation and admit a new one, keeping `len()` fixed.
    ///
    /// Returns `None` without touching the window when it is empty.
    pub fn rotate(&mut self, price: f64, digit: u8) -> Option<WindowEntry> {
        let evicted = self.evict_oldest()?;
        self.admit(price, digit);
        Some(evicted)
    }

    fn admit(&mut self, price: f64, digit: u8) {
        debug_assert!((digit as usize) < DIGIT_BUCKETS);
        self.entries.push_back(WindowEntry { price, digit });
        self.counts[digit as usize] += 1;
    }

    fn evict_oldest(&mut self) -> Option<WindowEntry> {
        let oldest = self.entries.pop_front()?;
        let bucket = &mut self.counts[oldest.digit as usize];
        *bucket = bucket.saturating_sub(1);
        Some(oldest)
    }
}

impl Default for HistogramWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}
