use anyhow::Result;

use super::bars::{derive_bars, empty_bars, Bar};
use super::extract::last_digit;
use super::window::{HistogramWindow, DIGIT_BUCKETS};
use crate::feed::QuoteHistory;
use crate::model::instrument::ActiveInstrument;
use crate::model::tick::Tick;

/// What happened to a feed tick handed to [`DigitFrequencyTracker::on_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Counted through the incremental path.
    Applied,
    /// The instrument changed (state was discarded) or no rebuild has
    /// succeeded yet; a full rebuild is needed before ticks count again.
    RebuildRequired,
    /// No context, hidden, empty window or unformattable price.
    Skipped,
}

/// Last-digit distribution over the most recent `N` prices of the active
/// instrument.
///
/// Every mutating call refreshes `bars` before returning.
#[derive(Debug, Clone)]
pub struct DigitFrequencyTracker {
    window: HistogramWindow,
    bars: Vec<Bar>,
    instrument: Option<ActiveInstrument>,
    last_symbol: Option<String>,
    needs_rebuild: bool,
    visible: bool,
    minimised: bool,
    last_tick: Option<Tick>,
}

impl DigitFrequencyTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: HistogramWindow::new(capacity),
            bars: empty_bars(),
            instrument: None,
            last_symbol: None,
            needs_rebuild: true,
            visible: true,
            minimised: false,
            last_tick: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }

    pub fn counts(&self) -> &[u32; DIGIT_BUCKETS] {
        self.window.counts()
    }

    pub fn window(&self) -> &HistogramWindow {
        &self.window
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn instrument(&self) -> Option<&ActiveInstrument> {
        self.instrument.as_ref()
    }

    pub fn last_tick(&self) -> Option<&Tick> {
        self.last_tick.as_ref()
    }

    /// True until a rebuild has succeeded for the current instrument.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_minimised(&self) -> bool {
        self.minimised
    }

    pub fn set_minimised(&mut self, minimised: bool) {
        self.minimised = minimised;
    }

    /// Install or clear the instrument context. The window is not touched;
    /// the next tick detects the identity change and asks for a rebuild.
    pub fn set_instrument(&mut self, instrument: Option<ActiveInstrument>) {
        self.instrument = instrument;
    }

    /// Decimal places of the active instrument, if any.
    pub fn decimal_places(&self) -> Option<u32> {
        self.instrument.as_ref().map(ActiveInstrument::decimal_places)
    }

    /// Toggle visibility. Returns `true` when the caller must run a full
    /// rebuild because counts went stale while hidden.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        let was_visible = self.visible;
        self.visible = visible;
        if visible && !was_visible {
            self.reset();
            return self.instrument.is_some();
        }
        false
    }

    /// Clear the histogram and repopulate it from `samples` (oldest first).
    ///
    /// Only the last `capacity` samples survive. Prices that cannot be
    /// formatted are skipped. Without an instrument context this is a no-op.
    pub fn rebuild(&mut self, samples: &[f64], decimal_places: u32) {
        let Some(instrument) = self.instrument.as_ref() else {
            return;
        };
        let display_name = instrument.display_name.clone();

        self.window.clear();
        let start = samples.len().saturating_sub(self.window.capacity());
        for &price in &samples[start..] {
            match last_digit(price, decimal_places) {
                Ok(digit) => {
                    self.window.push(price, digit);
                }
                Err(e) => tracing::debug!(price, error = %e, "Skipping history sample"),
            }
        }
        self.last_symbol = Some(display_name);
        self.needs_rebuild = false;
        self.refresh_bars();

        tracing::debug!(
            symbol = self.last_symbol.as_deref().unwrap_or_default(),
            window_len = self.window.len(),
            decimal_places,
            "Digit histogram rebuilt"
        );
    }

    /// Rebuild using the active instrument's own precision.
    pub fn reload(&mut self, samples: &[f64]) {
        if let Some(dp) = self.decimal_places() {
            self.rebuild(samples, dp);
        }
    }

    /// O(1) incremental update: evict the oldest sample, admit `new_price`.
    ///
    /// No-op when the window is empty (no rebuild has run yet) or the price
    /// cannot be formatted.
    pub fn apply_tick(&mut self, new_price: f64, decimal_places: u32) -> bool {
        if self.window.is_empty() {
            return false;
        }
        let digit = match last_digit(new_price, decimal_places) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(price = new_price, error = %e, "Skipping tick");
                return false;
            }
        };
        if self.window.rotate(new_price, digit).is_none() {
            return false;
        }
        self.refresh_bars();
        true
    }

    /// Pure derivation of bars from the current counts.
    pub fn derive_bars(&self) -> Vec<Bar> {
        derive_bars(self.window.counts(), self.window.capacity())
    }

    /// Feed-side entry point for one live tick.
    pub fn on_tick(&mut self, tick: &Tick) -> TickOutcome {
        let Some(instrument) = self.instrument.as_ref() else {
            return TickOutcome::Skipped;
        };
        if !self.visible {
            return TickOutcome::Skipped;
        }
        let decimal_places = instrument.decimal_places();
        let identity_changed =
            self.last_symbol.as_deref() != Some(instrument.display_name.as_str());
        self.last_tick = Some(tick.clone());

        if identity_changed {
            tracing::info!(
                from = self.last_symbol.as_deref().unwrap_or("-"),
                to = %instrument.display_name,
                "Instrument changed, discarding digit window"
            );
            self.last_symbol = Some(instrument.display_name.clone());
            self.reset();
            return TickOutcome::RebuildRequired;
        }
        if self.needs_rebuild {
            return TickOutcome::RebuildRequired;
        }

        if self.apply_tick(tick.price, decimal_places) {
            TickOutcome::Applied
        } else {
            TickOutcome::Skipped
        }
    }

    /// Fetch `capacity` prices for the active symbol and rebuild from them.
    ///
    /// State is cleared before the request, so a failed fetch leaves an
    /// empty (flat) histogram rather than stale counts, and the tracker
    /// keeps asking for a rebuild.
    pub async fn refresh<H>(&mut self, history: &H) -> Result<()>
    where
        H: QuoteHistory + ?Sized,
    {
        let Some(instrument) = self.instrument.clone() else {
            return Ok(());
        };
        self.reset();

        let quotes = history
            .get_quotes(&instrument.symbol, self.window.capacity())
            .await?;
        if quotes.prices().is_empty() {
            tracing::warn!(symbol = %instrument.symbol, "Quote history is empty");
        }
        self.rebuild(quotes.prices(), instrument.decimal_places());
        Ok(())
    }

    fn reset(&mut self) {
        self.needs_rebuild = true;
        self.window.clear();
        self.bars = empty_bars();
    }

    fn refresh_bars(&mut self) {
        self.bars = self.derive_bars();
    }
}

impl Default for DigitFrequencyTracker {
    fn default() -> Self {
        Self::new(super::window::DEFAULT_WINDOW_CAPACITY)
    }
}
