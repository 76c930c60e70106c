use serde::Deserialize;

/// Deserialize Binance string-encoded numbers to f64.
pub fn string_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<f64>().map_err(serde::de::Error::custom)
}

/// Binance trade stream event (symbol@trade).
#[derive(Debug, Deserialize)]
pub struct BinanceTradeEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub trade_id: u64,
    #[serde(rename = "p", deserialize_with = "string_to_f64")]
    pub price: f64,
}

/// Recent trades list item (GET /api/v3/trades).
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BinanceRecentTrade {
    pub id: u64,
    #[serde(deserialize_with = "string_to_f64")]
    pub price: f64,
    pub time: u64,
}

/// Binance API error response.
#[derive(Debug, Deserialize)]
pub struct BinanceApiErrorResponse {
    pub code: i64,
    pub msg: String,
}

/// Binance server time response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTimeResponse {
    pub server_time: u64,
}
