use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use ddguard_blynk::{BlynkClient, ClientConfig};
use ddguard_core::{logging, Config};
use ddguard_nightscout::NightscoutClient;
use ddguard_relay::{
    ClassifierConfig, DashboardSink, FanOut, Relay, RetryPolicy, RetryingFetcher, Scheduler,
    TrackingSink,
};

mod source;

use source::CommandSource;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting DD-Guard daemon");

    let path = Config::path_from_env();
    let config = Config::from_file(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    let fanout = build_sinks(&config)?;
    if fanout.is_empty() {
        warn!("No sink configured, pump data will only be logged");
    }

    let fetcher = RetryingFetcher::new(
        Arc::new(CommandSource::new(&config.source)),
        RetryPolicy::from(&config.relay),
    );
    let relay = Relay::new(
        fetcher,
        fanout,
        ClassifierConfig {
            thresholds: config.thresholds,
            poll_interval: config.relay.poll_interval,
        },
    );

    Scheduler::new(relay, config.relay.poll_interval)
        .run_until(shutdown_signal())
        .await;

    info!("Exiting DD-Guard daemon");
    Ok(())
}

fn build_sinks(config: &Config) -> Result<FanOut> {
    let mut fanout = FanOut::new();

    if let Some(dashboard) = &config.dashboard {
        let client = BlynkClient::start(ClientConfig::new(
            dashboard.server.clone(),
            dashboard.port,
            dashboard.token.clone(),
            dashboard.heartbeat,
        ));
        fanout.push(Box::new(DashboardSink::new(Arc::new(client))));
    }

    if let Some(tracking) = &config.tracking {
        let client = NightscoutClient::new(&tracking.server, tracking.secret.as_str())
            .context("Failed to set up Nightscout client")?;
        info!(server = client.base(), upload_basal = tracking.upload_basal, "Nightscout uploads enabled");
        fanout.push(Box::new(TrackingSink::new(Arc::new(client), tracking.upload_basal)));
    }

    Ok(fanout)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
