use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{mpsc, watch};

use digit_pulse::binance::rest::BinanceRestClient;
use digit_pulse::binance::ws::BinanceWsClient;
use digit_pulse::clock::{
    ClockObserver, ClockSyncConfig, ClockSynchronizer, LocalTimeSource, SystemClock, TimeSource,
};
use digit_pulse::config::{ClockSourceKind, Config};
use digit_pulse::digits::{Bar, DigitFrequencyTracker, TickOutcome};
use digit_pulse::event::{AppEvent, WsConnectionStatus};
use digit_pulse::feed::FeedSubscription;
use digit_pulse::gate::ReadyGate;
use digit_pulse::model::instrument::ActiveInstrument;

const CLOCK_INIT_TIMEOUT_SECS: u64 = 5;
const REFRESH_RETRY_SECS: u64 = 5;
const SUMMARY_EVERY_TICKS: u64 = 50;

fn bars_summary(bars: &[Bar]) -> String {
    bars.iter()
        .map(|b| format!("{}:{:.1}%{}", b.digit, b.height_pct, b.class.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn refresh_digits(tracker: &mut DigitFrequencyTracker, rest: &BinanceRestClient) {
    match tracker.refresh(rest).await {
        Ok(()) => tracing::info!(
            window_len = tracker.window().len(),
            bars = %bars_summary(tracker.bars()),
            "Digit stats rebuilt"
        ),
        Err(e) => tracing::warn!(error = %e, "Digit stats refresh failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required by rustls 0.23+)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    // Load config
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Make sure config/default.toml exists and is valid");
            std::process::exit(1);
        }
    };

    let log_file = std::fs::File::create(&config.logging.file)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                config
                    .logging
                    .level
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    let instrument = ActiveInstrument::from_feed_config(&config.feed);
    tracing::info!(
        symbol = %instrument.symbol,
        display_name = %instrument.display_name,
        decimal_places = instrument.decimal_places(),
        rest_url = %config.feed.rest_base_url,
        ws_url = %config.feed.ws_base_url,
        "Starting digit-pulse"
    );

    // Channels
    let (app_tx, mut app_rx) = mpsc::channel::<AppEvent>(256);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let rest = Arc::new(BinanceRestClient::new(&config.feed.rest_base_url));

    // Clock
    let time_source: Arc<dyn TimeSource> = match config.clock.source {
        ClockSourceKind::Local => Arc::new(LocalTimeSource::default()),
        ClockSourceKind::Binance => rest.clone(),
    };
    let clock = Arc::new(ClockSynchronizer::new(
        ClockSyncConfig::from(&config.clock),
        Arc::new(SystemClock),
        time_source,
    ));
    let observer: ClockObserver = {
        let clock_tx = app_tx.clone();
        Arc::new(move |epoch| {
            let _ = clock_tx.try_send(AppEvent::ClockTick { epoch });
        })
    };
    if tokio::time::timeout(
        Duration::from_secs(CLOCK_INIT_TIMEOUT_SECS),
        clock.init(Some(observer)),
    )
    .await
    .is_err()
    {
        tracing::warn!("Clock not synchronized yet, falling back to local time until it is");
    }

    // Digit stats
    let mut tracker = DigitFrequencyTracker::new(config.digits.window_capacity);
    tracker.set_instrument(Some(instrument.clone()));
    tracker.set_visible(config.digits.visible);

    // Feed wiring waits for the instrument context to be ready.
    let context_ready = ReadyGate::new();
    let feed_task = {
        let context_ready = context_ready.clone();
        let mut feed_shutdown = shutdown_tx.subscribe();
        let ws = BinanceWsClient::new(&config.feed.ws_base_url, &instrument.symbol);
        let feed_tx = app_tx.clone();
        let symbol = instrument.symbol.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = context_ready.wait() => {}
                _ = feed_shutdown.changed() => return,
            }
            let mut subscription = FeedSubscription::new();
            subscription
                .subscribe(&symbol, move |ws_shutdown| {
                    tokio::spawn(async move {
                        if let Err(e) = ws.connect_and_run(feed_tx, ws_shutdown).await {
                            tracing::error!(error = %e, "Trade stream failed");
                        }
                    })
                })
                .await;
            let _ = feed_shutdown.changed().await;
            subscription.unsubscribe().await;
        })
    };
    drop(app_tx);

    if tracker.is_visible() {
        refresh_digits(&mut tracker, &rest).await;
    }
    context_ready.open();

    // Ctrl+C handler
    let ctrl_c_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Ctrl+C received");
        let _ = ctrl_c_shutdown.send(true);
    });

    let mut applied_ticks: u64 = 0;
    let mut last_refresh = Instant::now();

    loop {
        tokio::select! {
            event = app_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    AppEvent::MarketTick(tick) => match tracker.on_tick(&tick) {
                        TickOutcome::Applied => {
                            applied_ticks += 1;
                            if applied_ticks % SUMMARY_EVERY_TICKS == 0 {
                                tracing::info!(
                                    price = tick.price,
                                    server_epoch = clock.estimated_epoch(),
                                    bars = %bars_summary(tracker.bars()),
                                    "Digit stats"
                                );
                            }
                        }
                        TickOutcome::RebuildRequired => {
                            if last_refresh.elapsed() < Duration::from_secs(REFRESH_RETRY_SECS) {
                                continue;
                            }
                            last_refresh = Instant::now();
                            refresh_digits(&mut tracker, &rest).await;
                        }
                        TickOutcome::Skipped => {}
                    },
                    AppEvent::WsStatus(status) => match status {
                        WsConnectionStatus::Connected => tracing::info!("Trade stream connected"),
                        WsConnectionStatus::Disconnected => tracing::info!("Trade stream disconnected"),
                        WsConnectionStatus::Reconnecting { attempt, delay_ms } => {
                            tracing::info!(attempt, delay_ms, "Trade stream reconnecting")
                        }
                    },
                    AppEvent::ClockTick { epoch } => {
                        tracing::debug!(epoch, utc = %clock.utc_date(), "Clock tick");
                    }
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = feed_task.await {
        tracing::warn!(error = %e, "Feed task ended abnormally");
    }
    clock.shutdown().await;
    tracing::info!("digit-pulse stopped");
    Ok(())
}
