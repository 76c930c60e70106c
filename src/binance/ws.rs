use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;

use super::types::BinanceTradeEvent;
use crate::error::AppError;
use crate::event::{AppEvent, WsConnectionStatus};
use crate::model::tick::Tick;

/// Exponential backoff for reconnection.
struct ExponentialBackoff {
    current: Duration,
    initial: Duration,
    max: Duration,
    factor: f64,
}

impl ExponentialBackoff {
    fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            current: initial,
            initial,
            max,
            factor,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * self.factor).min(self.max.as_secs_f64()),
        );
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Parse one `symbol@trade` frame into a tick.
pub fn parse_trade_frame(text: &str) -> Result<Tick> {
    let event: BinanceTradeEvent =
        serde_json::from_str(text).context("invalid trade frame")?;
    Ok(Tick::new(event.symbol, event.price, event.event_time))
}

/// Live `symbol@trade` stream for one symbol.
pub struct BinanceWsClient {
    url: String,
    symbol: String,
}

impl BinanceWsClient {
    pub fn new(ws_base_url: &str, symbol: &str) -> Self {
        Self {
            url: format!(
                "{}/{}@trade",
                ws_base_url.trim_end_matches('/'),
                symbol.to_ascii_lowercase()
            ),
            symbol: symbol.to_ascii_uppercase(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect and run the WebSocket loop with automatic reconnection.
    /// Ticks and connection status both go out through `event_tx`.
    pub async fn connect_and_run(
        &self,
        event_tx: mpsc::Sender<AppEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 2.0);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.connect_once(&event_tx, &mut shutdown, &mut backoff).await {
                Ok(()) => {
                    // Clean shutdown requested
                    let _ = event_tx
                        .send(AppEvent::WsStatus(WsConnectionStatus::Disconnected))
                        .await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(symbol = %self.symbol, error = %e, "WS error");
                    let _ = event_tx
                        .send(AppEvent::WsStatus(WsConnectionStatus::Disconnected))
                        .await;

                    let delay = backoff.next_delay();
                    let _ = event_tx
                        .send(AppEvent::WsStatus(WsConnectionStatus::Reconnecting {
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                        }))
                        .await;

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue,
                        _ = shutdown.changed() => {
                            tracing::info!(symbol = %self.symbol, "Shutdown during reconnect");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn connect_once(
        &self,
        event_tx: &mpsc::Sender<AppEvent>,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut ExponentialBackoff,
    ) -> Result<()> {
        tracing::info!(url = %self.url, "Connecting");

        let (ws_stream, _resp) = tokio_tungstenite::connect_async(&self.url)
            .await
            .context("WebSocket connect failed")?;

        backoff.reset();
        // Send Connected AFTER successful connection
        let _ = event_tx
            .send(AppEvent::WsStatus(WsConnectionStatus::Connected))
            .await;

        let (_write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            match parse_trade_frame(&text) {
                                Ok(tick) => {
                                    if event_tx.try_send(AppEvent::MarketTick(tick)).is_err() {
                                        tracing::warn!("Event channel full, dropping tick");
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "Failed to parse WS message");
                                }
                            }
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tokio-tungstenite handles pong automatically
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(AppError::WebSocket(format!("read error: {}", e)).into());
                        }
                        None => {
                            return Err(AppError::WebSocket("stream ended".to_string()).into());
                        }
                    }
                }
                _ = shutdown.changed() => {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut b = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(4), 2.0);
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(2));
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn stream_url_uses_lowercase_symbol() {
        let client = BinanceWsClient::new("wss://stream.binance.com:9443/ws/", "BTCUSDT");
        assert_eq!(client.url(), "wss://stream.binance.com:9443/ws/btcusdt@trade");
    }

    #[test]
    fn trade_frame_becomes_tick() {
        let tick = parse_trade_frame(
            r#"{"e":"trade","E":1700000000500,"s":"ETHUSDT","t":7,"p":"2000.25","q":"1"}"#,
        )
        .unwrap();
        assert_eq!(tick, Tick::new("ETHUSDT", 2000.25, 1_700_000_000_500));
        assert!(parse_trade_frame("not json").is_err());
    }
}
