//! Collaborators on the feed side: quote history and the single live
//! tick subscription.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Response shape of a quote-history request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotesResponse {
    #[serde(default)]
    pub history: Option<QuoteHistoryPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteHistoryPayload {
    #[serde(default)]
    pub prices: Vec<f64>,
}

impl QuotesResponse {
    pub fn from_prices(prices: Vec<f64>) -> Self {
        Self {
            history: Some(QuoteHistoryPayload { prices }),
        }
    }

    /// Prices oldest-first; empty when the venue returned no history.
    pub fn prices(&self) -> &[f64] {
        self.history
            .as_ref()
            .map(|h| h.prices.as_slice())
            .unwrap_or(&[])
    }
}

/// Source of recent prices used to seed a full rebuild.
#[async_trait]
pub trait QuoteHistory: Send + Sync {
    async fn get_quotes(&self, symbol: &str, count: usize) -> Result<QuotesResponse>;
}

struct ActiveSubscription {
    symbol: String,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Holds at most one live tick subscription.
///
/// Installing a new subscription first stops the previous one, so ticks are
/// never delivered twice across an instrument change.
#[derive(Default)]
pub struct FeedSubscription {
    active: Option<ActiveSubscription>,
}

impl FeedSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_symbol(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.symbol.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Replace the current subscription with one for `symbol`.
    ///
    /// `spawn` receives a shutdown receiver that flips to `true` when this
    /// subscription is dropped.
    pub async fn subscribe<F>(&mut self, symbol: &str, spawn: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> JoinHandle<()>,
    {
        self.unsubscribe().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn(shutdown_rx);
        tracing::info!(symbol, "Feed subscription installed");
        self.active = Some(ActiveSubscription {
            symbol: symbol.to_string(),
            shutdown_tx,
            handle,
        });
    }

    /// Stop the current subscription, if any, and wait for its task to end.
    pub async fn unsubscribe(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let _ = active.shutdown_tx.send(true);
        if let Err(e) = active.handle.await {
            if !e.is_cancelled() {
                tracing::warn!(symbol = %active.symbol, error = %e, "Feed task ended abnormally");
            }
        }
        tracing::info!(symbol = %active.symbol, "Feed subscription removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_history_reads_as_empty() {
        let resp: QuotesResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.prices().is_empty());

        let resp: QuotesResponse =
            serde_json::from_str(r#"{"history":{"prices":[1.5,2.25]}}"#).unwrap();
        assert_eq!(resp.prices(), &[1.5, 2.25]);
    }
}
