//! Long-running server: webhook ingestion, broker login and position monitors.

use alert_bridge_core::{AppConfig, BrokerageGateway, CredentialStore, ExecutionMode};
use alert_bridge_kite::{api_secret_from_env, KiteClient, KiteClientConfig, KiteGateway, KiteTickerConfig, PaperGateway};
use alert_bridge_pipeline::{
    ActivityLog, AlertDispatcher, CatalogProvider, FileActivityLog, MonitorSupervisor, OrderSubmitter,
    PriceAdjuster, TradeConfigStore,
};
use alert_bridge_web_api::{ApiServer, AppState, LoginService};
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

const PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides `server.host`/`server.port`).
    #[arg(short, long)]
    pub addr: Option<String>,

    /// Simulate order placement even if the config says live.
    #[arg(long)]
    pub paper: bool,
}

/// Live orders go to the broker; paper orders are filled locally over the same price and tick feed.
pub fn build_gateway(
    mode: ExecutionMode,
    client: Arc<KiteClient>,
    ticker: KiteTickerConfig,
) -> Arc<dyn BrokerageGateway> {
    let live: Arc<dyn BrokerageGateway> = Arc::new(KiteGateway::new(client, ticker));
    match mode {
        ExecutionMode::Live => live,
        ExecutionMode::Paper => Arc::new(PaperGateway::new(live)),
    }
}

pub async fn run(args: ServeArgs, mut config: AppConfig) -> Result<()> {
    if args.paper {
        config.execution.mode = ExecutionMode::Paper;
    }
    if config.kite.api_key.is_empty() {
        tracing::warn!("kite.api_key is empty; login will not work until it is configured");
    }

    let credentials = Arc::new(CredentialStore::new());
    let client = Arc::new(
        KiteClient::new(KiteClientConfig::from_settings(&config.kite), Arc::clone(&credentials))
            .context("failed to build Kite REST client")?,
    );
    let gateway = build_gateway(
        config.execution.mode,
        Arc::clone(&client),
        KiteTickerConfig::from_settings(&config.kite, &config.ticker),
    );

    let file_log = Arc::new(
        FileActivityLog::open(&config.paths.trade_log, &config.paths.tick_log)
            .await
            .context("failed to open activity logs")?,
    );
    let log: Arc<dyn ActivityLog> = file_log.clone();
    let submitter = Arc::new(OrderSubmitter::new(
        Arc::clone(&gateway),
        PriceAdjuster::new(config.execution.price_bias_pct),
        Arc::clone(&log),
    ));
    let supervisor = Arc::new(MonitorSupervisor::new(
        Arc::clone(&gateway),
        Arc::clone(&submitter),
        Arc::clone(&credentials),
        Arc::clone(&log),
    ));

    let trade_configs = Arc::new(
        TradeConfigStore::load(&config.paths.trade_config).context("failed to load trade config")?,
    );
    let watcher = trade_configs.watch();

    let dispatcher = Arc::new(AlertDispatcher::new(
        Arc::new(CatalogProvider::new(&config.paths.instruments)),
        trade_configs,
        gateway,
        submitter,
        Arc::clone(&supervisor),
        log,
    ));

    let api_secret = match api_secret_from_env() {
        Ok(secret) => Some(secret),
        Err(e) => {
            tracing::warn!(error = %e, "Login callback disabled");
            None
        }
    };

    let state = AppState {
        dispatcher,
        credentials,
        login: Arc::new(LoginService { client, api_secret }),
    };

    let pruner = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                let pruned = supervisor.prune_finished().await;
                if pruned > 0 {
                    tracing::debug!(pruned, "Pruned finished monitors");
                }
            }
        })
    };

    let addr = args.addr.unwrap_or_else(|| config.server.addr());
    tracing::info!(
        mode = ?config.execution.mode,
        bias_pct = %config.execution.price_bias_pct,
        instruments = %config.paths.instruments.display(),
        "Alert bridge starting"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };
    let served = ApiServer::new(state).serve_with_shutdown(&addr, shutdown).await;

    pruner.abort();
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    let cancelled = supervisor.shutdown_all().await;
    file_log.flush().await;
    tracing::info!(cancelled, "Alert bridge stopped");

    served
}
