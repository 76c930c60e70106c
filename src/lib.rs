pub mod binance;
pub mod clock;
pub mod config;
pub mod digits;
pub mod error;
pub mod event;
pub mod feed;
pub mod gate;
pub mod model;
