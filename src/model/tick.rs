/// One price observation delivered by the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub timestamp_ms: u64,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, price: f64, timestamp_ms: u64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp_ms,
        }
    }

    /// Create a synthetic tick from a bare price (history seeding, tests).
    pub fn from_price(price: f64) -> Self {
        Self::new("SYNTH", price, 0)
    }

    /// Event time in epoch seconds.
    pub fn event_epoch(&self) -> f64 {
        self.timestamp_ms as f64 / 1000.0
    }
}
