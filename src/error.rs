use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("binance API error (code {code}): {msg}")]
    BinanceApi { code: i64, msg: String },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("cannot format price {price} to {decimal_places} decimal places")]
    DigitFormat { price: f64, decimal_places: u32 },
}
