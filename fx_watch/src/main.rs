use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use fx_common::core::{AppPhase, LifecycleController, SubscriptionManager, TokioScheduler};
use fx_common::ingestors::{PollingDriver, RateSource};
use fx_common::loggers::init_tracing;
use fx_common::retrieve::{open_rate_stream, ApiClient, ProviderRateSource, ProxyRateSource};
use fx_common::watchlist::{FileKeyValueStore, WatchlistStore};
use fx_common::CurrencyPair;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod commands;
mod config;

use config::{Command, Config, SourceMode};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let (config, config_status) = config::load_config();
    let _guard = init_tracing(&config.log_dir(), config.log_level(), "fx_watch")?;
    config_status.log();

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.cancel();
        });
    }

    let result = match config.command() {
        Command::Watch => run_watch(&config, shutdown.clone()).await,
        Command::Stream { pair, max_secs } => run_stream(&config, &pair, Duration::from_secs(max_secs), shutdown.clone()).await,
    };

    shutdown.cancel();
    info!("Shutdown complete.");
    result
}

async fn wait_for_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }
}

fn build_source(config: &Config, timeout: Duration) -> Result<Arc<dyn RateSource>> {
    match config.source() {
        SourceMode::Proxy => {
            let client = ApiClient::new(config.endpoint_url(), None, timeout)
                .with_context(|| format!("Invalid endpoint URL {}", config.endpoint_url()))?;
            Ok(Arc::new(ProxyRateSource::new(client)))
        }
        SourceMode::Provider => {
            let base = config
                .provider_base_url
                .as_deref()
                .context("Provider mode needs --provider-base-url or FOREX_SERVICE_URL")?;
            if config.provider_token.is_none() {
                warn!("No provider token configured, requests will be unauthenticated");
            }
            let client = ApiClient::new(base, config.provider_token.as_deref(), timeout)
                .with_context(|| format!("Invalid provider URL {}", base))?;
            Ok(Arc::new(ProviderRateSource::new(client)))
        }
    }
}

async fn run_watch(config: &Config, shutdown: CancellationToken) -> Result<()> {
    let scheduler = Arc::new(TokioScheduler::with_parent(&shutdown));
    let settings = config.polling_settings()?;
    let driver = PollingDriver::new(build_source(config, settings.fetch_timeout)?, settings);
    let manager = SubscriptionManager::new(driver, scheduler.clone());

    let storage_dir = config.storage_dir();
    info!(dir = %storage_dir.display(), "Loading watchlist");
    let store = Arc::new(WatchlistStore::new(
        Arc::new(FileKeyValueStore::new(storage_dir)),
        config.watchlist_settings()?,
    ));
    let entries = store.load().await;
    info!(entries = entries.len(), "Watchlist loaded");
    for pair in store.active_pairs().await {
        manager.subscribe(&pair);
    }

    let (phase_tx, phase_rx) = watch::channel(AppPhase::Active);
    let lifecycle = Arc::new(LifecycleController::new(manager.clone()));
    let lifecycle_handle = {
        let lifecycle = lifecycle.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { lifecycle.run(phase_rx, shutdown).await })
    };

    let relay_handle = tokio::spawn(relay_events(manager.clone(), shutdown.clone()));

    let console = commands::Console::new(store.clone(), manager.clone(), phase_tx);
    let console_result = console.run(shutdown.clone()).await;

    shutdown.cancel();
    scheduler.shutdown();
    let (lifecycle_result, relay_result) = tokio::join!(lifecycle_handle, relay_handle);
    if let Err(e) = lifecycle_result {
        warn!("Lifecycle task failed: {}", e);
    }
    if let Err(e) = relay_result {
        warn!("Event relay task failed: {}", e);
    }

    for pair in manager.active_pairs() {
        manager.unsubscribe(&pair);
    }
    console_result
}

async fn relay_events(manager: SubscriptionManager, shutdown: CancellationToken) {
    let mut events = manager.events();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(event) => {
                let view = &event.view;
                match (&view.data, &view.error) {
                    (_, Some(error)) => warn!(
                        pair = %event.pair,
                        state = ?view.connection_state,
                        kind = ?view.error_kind,
                        "{}",
                        error
                    ),
                    (Some(snapshot), None) => info!(
                        pair = %event.pair,
                        state = ?view.connection_state,
                        bid = %snapshot.formatted_bid(),
                        ask = %snapshot.formatted_ask(),
                        price = %snapshot.formatted_price(),
                        "Rate update"
                    ),
                    (None, None) => info!(pair = %event.pair, state = ?view.connection_state, "State change"),
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event relay lagging, skipped events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_stream(config: &Config, pair: &str, max_duration: Duration, shutdown: CancellationToken) -> Result<()> {
    let pair: CurrencyPair = pair.parse()?;
    let client = ApiClient::new(config.endpoint_url(), None, config.polling_settings()?.fetch_timeout)?;

    info!(pair = %pair, max_secs = max_duration.as_secs(), "Opening rate stream");
    let stream = open_rate_stream(&client, &pair, max_duration).await?;
    let mut stream = Box::pin(stream);

    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => break,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(snapshot)) => println!(
                "{} bid {} ask {} price {} at {}",
                snapshot.pair,
                snapshot.formatted_bid(),
                snapshot.formatted_ask(),
                snapshot.formatted_price(),
                snapshot.observed_at.to_rfc3339()
            ),
            Some(Err(e)) => println!("{} error: {}", pair, e),
            None => break,
        }
    }
    info!(pair = %pair, "Rate stream finished");
    Ok(())
}
