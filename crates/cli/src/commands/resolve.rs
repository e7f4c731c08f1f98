//! Dry-run of contract selection against the local instrument catalog.

use alert_bridge_core::{AppConfig, OptionType, ResolvedContract};
use alert_bridge_pipeline::{exchange_date, target_expiry_month, InstrumentCatalog};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Args;
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Arguments for the resolve command.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Underlying symbol (e.g. SBIN).
    pub symbol: String,

    /// Reference price; the nearest strike to it is picked.
    #[arg(long)]
    pub price: Decimal,

    /// CE or PE.
    #[arg(long, default_value = "CE")]
    pub option_type: OptionType,

    /// Trading date to resolve for (defaults to today on the exchange).
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Catalog file (overrides `paths.instruments`).
    #[arg(long)]
    pub instruments: Option<PathBuf>,
}

pub fn describe(contract: &ResolvedContract) -> String {
    format!(
        "{} (token {}, lot {}, tick {})",
        contract.tradingsymbol, contract.instrument_token, contract.lot_size, contract.tick_size
    )
}

pub async fn run(args: ResolveArgs, config: &AppConfig) -> Result<()> {
    let path = args.instruments.unwrap_or_else(|| config.paths.instruments.clone());
    let catalog = InstrumentCatalog::load(&path)
        .await
        .with_context(|| format!("failed to load catalog {}", path.display()))?;

    let as_of = args.date.unwrap_or_else(|| exchange_date(Utc::now()));
    let (year, month) = target_expiry_month(as_of);
    tracing::info!(contracts = catalog.len(), %as_of, "Catalog loaded");

    let contract = catalog
        .resolve(&args.symbol, args.option_type, args.price, as_of)
        .with_context(|| {
            format!(
                "no {} contract for {} expiring {year}-{month:02}",
                args.option_type, args.symbol
            )
        })?;

    println!("{}", describe(&contract));
    Ok(())
}
