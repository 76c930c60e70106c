use crate::model::tick::Tick;

#[derive(Debug, Clone)]
pub enum WsConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32, delay_ms: u64 },
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    MarketTick(Tick),
    WsStatus(WsConnectionStatus),
    /// Local advance of the server-time estimate.
    ClockTick { epoch: f64 },
}
