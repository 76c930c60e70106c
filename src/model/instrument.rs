use crate::config::{FeedConfig, DEFAULT_DECIMAL_PLACES};

/// The instrument currently shown to the user.
///
/// `display_name` is the identity used for change detection; two
/// instruments with the same display name are treated as the same stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveInstrument {
    pub symbol: String,
    pub display_name: String,
    pub decimal_places: Option<u32>,
}

impl ActiveInstrument {
    pub fn new(symbol: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            display_name: display_name.into(),
            decimal_places: None,
        }
    }

    pub fn with_decimal_places(mut self, decimal_places: u32) -> Self {
        self.decimal_places = Some(decimal_places);
        self
    }

    /// Quoted precision, defaulting to two places when the venue did not say.
    pub fn decimal_places(&self) -> u32 {
        self.decimal_places.unwrap_or(DEFAULT_DECIMAL_PLACES)
    }

    pub fn from_feed_config(cfg: &FeedConfig) -> Self {
        Self {
            symbol: cfg.normalized_symbol(),
            display_name: cfg.display_name(),
            decimal_places: cfg.decimal_places,
        }
    }
}
