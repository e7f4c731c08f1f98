//! Instrument resolution: alert symbol and trigger price to a nearest-the-money option.

use alert_bridge_core::{InstrumentRecord, InstrumentRow, OptionType, ResolvedContract};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::CatalogError;

/// Last day of the month on which the near-month series is still preferred.
pub const ROLL_DAY: u32 = 15;

/// Returns the (year, month) whose expiries are traded on `as_of`.
///
/// Up to and including the 15th the current month is used; afterwards the
/// next month, wrapping December into January of the following year.
#[must_use]
pub fn target_expiry_month(as_of: NaiveDate) -> (i32, u32) {
    if as_of.day() <= ROLL_DAY {
        (as_of.year(), as_of.month())
    } else if as_of.month() == 12 {
        (as_of.year() + 1, 1)
    } else {
        (as_of.year(), as_of.month() + 1)
    }
}

/// Today's date at the exchange (UTC+05:30).
#[must_use]
pub fn exchange_date(now: DateTime<Utc>) -> NaiveDate {
    FixedOffset::east_opt(5 * 3600 + 30 * 60)
        .map_or_else(|| now.date_naive(), |ist| now.with_timezone(&ist).date_naive())
}

/// Picks the contract whose strike is closest to `reference_price`.
///
/// Only rows for `symbol` and `option_type` expiring in the target month are
/// considered. Equidistant strikes resolve to the earliest row in catalog order.
#[must_use]
pub fn resolve(
    catalog: &[InstrumentRecord],
    symbol: &str,
    option_type: OptionType,
    reference_price: Decimal,
    as_of: NaiveDate,
) -> Option<ResolvedContract> {
    let (year, month) = target_expiry_month(as_of);

    let mut best: Option<(&InstrumentRecord, Decimal)> = None;
    for record in catalog.iter().filter(|r| {
        r.symbol == symbol
            && r.option_type == option_type
            && r.expiry.year() == year
            && r.expiry.month() == month
    }) {
        let distance = (record.strike - reference_price).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((record, distance)),
        }
    }

    best.map(|(record, _)| ResolvedContract::from(record))
}

/// Read-only snapshot of tradable option contracts.
#[derive(Debug, Clone, Default)]
pub struct InstrumentCatalog {
    records: Vec<InstrumentRecord>,
}

impl InstrumentCatalog {
    #[must_use]
    pub fn from_records(records: Vec<InstrumentRecord>) -> Self {
        Self { records }
    }

    /// Loads a JSON instrument dump, keeping option rows in file order.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a JSON array of rows.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rows: Vec<InstrumentRow> =
            serde_json::from_slice(&bytes).map_err(|source| CatalogError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        let total = rows.len();
        let records: Vec<InstrumentRecord> = rows.iter().filter_map(InstrumentRow::to_record).collect();
        tracing::info!(
            path = %path.display(),
            rows = total,
            options = records.len(),
            "Instrument catalog loaded"
        );

        Ok(Self { records })
    }

    #[must_use]
    pub fn records(&self) -> &[InstrumentRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn resolve(
        &self,
        symbol: &str,
        option_type: OptionType,
        reference_price: Decimal,
        as_of: NaiveDate,
    ) -> Option<ResolvedContract> {
        resolve(&self.records, symbol, option_type, reference_price, as_of)
    }
}

/// Loads the catalog on first use and shares it afterwards.
///
/// A failed load is not cached; the next caller retries.
#[derive(Debug)]
pub struct CatalogProvider {
    path: PathBuf,
    catalog: OnceCell<Arc<InstrumentCatalog>>,
}

impl CatalogProvider {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            catalog: OnceCell::new(),
        }
    }

    /// A provider that never touches disk.
    #[must_use]
    pub fn preloaded(catalog: InstrumentCatalog) -> Self {
        Self {
            path: PathBuf::new(),
            catalog: OnceCell::new_with(Some(Arc::new(catalog))),
        }
    }

    /// # Errors
    /// Returns error if the catalog has not been loaded yet and loading fails.
    pub async fn get(&self) -> Result<Arc<InstrumentCatalog>, CatalogError> {
        self.catalog
            .get_or_try_init(|| async { InstrumentCatalog::load(&self.path).await.map(Arc::new) })
            .await
            .cloned()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.catalog.initialized()
    }
}
