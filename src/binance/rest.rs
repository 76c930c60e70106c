use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::clock::source::{TimeReply, TimeSource};
use crate::error::AppError;
use crate::feed::{QuoteHistory, QuotesResponse};

use super::types::{BinanceApiErrorResponse, BinanceRecentTrade, ServerTimeResponse};

/// Largest `limit` accepted by `GET /api/v3/trades`.
pub const MAX_RECENT_TRADES: usize = 1000;

/// Public (unsigned) market-data endpoints.
pub struct BinanceRestClient {
    http: reqwest::Client,
    base_url: String,
    // Simple rate limiter: request count in current minute window
    request_count: AtomicU64,
    window_start: std::sync::Mutex<Instant>,
}

impl BinanceRestClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_count: AtomicU64::new(0),
            window_start: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn check_rate_limit(&self) {
        let mut start = self.window_start.lock().unwrap_or_else(|e| e.into_inner());
        if start.elapsed().as_secs() >= 60 {
            *start = Instant::now();
            self.request_count.store(0, Ordering::Relaxed);
        }
        let count = self.request_count.fetch_add(1, Ordering::Relaxed);
        if count > 960 {
            tracing::warn!(count, "Approaching rate limit (80% of 1200/min)");
        }
    }

    /// Server time in epoch milliseconds.
    pub async fn server_time(&self) -> Result<u64> {
        self.check_rate_limit();
        let url = format!("{}/api/v3/time", self.base_url);
        let resp: ServerTimeResponse = self
            .http
            .get(&url)
            .send()
            .await
            .context("server_time failed")?
            .json()
            .await?;
        Ok(resp.server_time)
    }

    /// Most recent trade prices for `symbol`, oldest first.
    pub async fn recent_trades(&self, symbol: &str, limit: usize) -> Result<Vec<BinanceRecentTrade>> {
        self.check_rate_limit();
        let limit = limit.clamp(1, MAX_RECENT_TRADES);
        let url = format!(
            "{}/api/v3/trades?symbol={}&limit={}",
            self.base_url, symbol, limit
        );

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("recent_trades HTTP failed")?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<BinanceApiErrorResponse>(&body) {
                return Err(AppError::BinanceApi {
                    code: err.code,
                    msg: err.msg,
                }
                .into());
            }
            return Err(anyhow::anyhow!("Recent trades request failed: {}", body));
        }

        let mut trades: Vec<BinanceRecentTrade> = resp.json().await?;
        trades.sort_by_key(|t| t.id);
        tracing::debug!(symbol, count = trades.len(), "Fetched recent trades");
        Ok(trades)
    }
}

#[async_trait]
impl QuoteHistory for BinanceRestClient {
    async fn get_quotes(&self, symbol: &str, count: usize) -> Result<QuotesResponse> {
        let trades = self.recent_trades(symbol, count).await?;
        Ok(QuotesResponse::from_prices(
            trades.into_iter().map(|t| t.price).collect(),
        ))
    }
}

#[async_trait]
impl TimeSource for BinanceRestClient {
    async fn fetch_time(&self) -> Result<TimeReply> {
        let ms = self.server_time().await?;
        Ok(TimeReply {
            time: ms as f64 / 1000.0,
        })
    }
}
