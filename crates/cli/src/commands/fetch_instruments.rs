//! Refreshes the local instrument catalog from the broker's instrument dump.

use alert_bridge_core::{AccessTokenLease, AppConfig, CredentialStore, InstrumentRow};
use alert_bridge_kite::{KiteClient, KiteClientConfig};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments for the fetch-instruments command.
#[derive(Args, Debug)]
pub struct FetchInstrumentsArgs {
    /// Exchange segment to download (defaults to `kite.exchange`).
    #[arg(long)]
    pub exchange: Option<String>,

    /// Output catalog file (defaults to `paths.instruments`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Access token from an earlier login, if the dump requires one.
    #[arg(long, env = "KITE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
}

/// Writes rows as a pretty JSON array, replacing the file atomically.
pub fn write_catalog(path: &Path, rows: &[InstrumentRow]) -> Result<()> {
    let json = serde_json::to_vec_pretty(rows).context("failed to encode instruments")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub async fn run(args: FetchInstrumentsArgs, config: &AppConfig) -> Result<()> {
    let exchange = args.exchange.unwrap_or_else(|| config.kite.exchange.clone());
    let output = args.output.unwrap_or_else(|| config.paths.instruments.clone());

    let credentials = Arc::new(CredentialStore::new());
    if let Some(token) = args.access_token.filter(|t| !t.is_empty()) {
        credentials.install(AccessTokenLease::until_daily_reset(token, Utc::now()));
    }
    let client = KiteClient::new(KiteClientConfig::from_settings(&config.kite), credentials)
        .context("failed to build Kite REST client")?;

    tracing::info!(%exchange, "Fetching instrument dump");
    let rows = client
        .instruments(&exchange)
        .await
        .with_context(|| format!("failed to download instruments for {exchange}"))?;
    if rows.is_empty() {
        anyhow::bail!("No instruments returned for {exchange}");
    }

    let options = rows.iter().filter(|row| row.to_record().is_some()).count();
    write_catalog(&output, &rows)?;
    tracing::info!(
        rows = rows.len(),
        options,
        output = %output.display(),
        "Instrument catalog written"
    );

    Ok(())
}
