//! Per-symbol quantity and take-profit/stop-loss policy.
//!
//! Persisted as a JSON object keyed by symbol, with `DEFAULT` as the fallback:
//!
//! ```json
//! { "DEFAULT": { "qty": 1, "tp": 5, "sl": 2 }, "SBIN": { "qty": 2, "tp": 8, "sl": 3 } }
//! ```

use alert_bridge_core::{FileWatcher, TradeConfig};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::TradeConfigError;

/// Reserved key consulted when a symbol has no entry of its own.
pub const DEFAULT_KEY: &str = "DEFAULT";

#[derive(Debug, Default)]
pub struct TradeConfigStore {
    path: Option<PathBuf>,
    configs: RwLock<BTreeMap<String, TradeConfig>>,
}

impl TradeConfigStore {
    /// A store that is never written to disk.
    #[must_use]
    pub fn in_memory(configs: BTreeMap<String, TradeConfig>) -> Self {
        Self {
            path: None,
            configs: RwLock::new(configs),
        }
    }

    /// Loads the store from `path`; a missing file starts empty.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or decoded, or if
    /// any entry fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TradeConfigError> {
        let path = path.as_ref().to_path_buf();
        let configs = read_file(&path)?;
        tracing::info!(path = %path.display(), symbols = configs.len(), "Trade config loaded");
        Ok(Self {
            path: Some(path),
            configs: RwLock::new(configs),
        })
    }

    /// Returns the config for `symbol`, falling back to `DEFAULT`.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<TradeConfig> {
        let configs = self.configs.read();
        configs.get(symbol).or_else(|| configs.get(DEFAULT_KEY)).copied()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, TradeConfig> {
        self.configs.read().clone()
    }

    /// Validates and stores a config, then persists the whole map.
    ///
    /// # Errors
    /// Returns `Invalid` for a rejected config, or an I/O error if persisting fails.
    pub fn upsert(&self, symbol: &str, config: TradeConfig) -> Result<(), TradeConfigError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(TradeConfigError::Invalid {
                symbol: String::new(),
                reason: "symbol must not be empty".to_string(),
            });
        }
        config.validate().map_err(|reason| TradeConfigError::Invalid {
            symbol: symbol.to_string(),
            reason,
        })?;

        let snapshot = {
            let mut configs = self.configs.write();
            configs.insert(symbol.to_string(), config);
            configs.clone()
        };
        tracing::info!(symbol, qty = config.qty, tp = %config.tp, sl = %config.sl, "Trade config updated");

        match &self.path {
            Some(path) => write_file(path, &snapshot),
            None => Ok(()),
        }
    }

    /// Re-reads the backing file. Returns the number of symbols loaded.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, decoded or validated; the
    /// current map is kept.
    pub fn reload(&self) -> Result<usize, TradeConfigError> {
        let Some(path) = &self.path else {
            return Ok(self.configs.read().len());
        };
        let configs = read_file(path)?;
        let count = configs.len();
        *self.configs.write() = configs;
        Ok(count)
    }

    /// Reloads whenever the backing file changes. No-op for in-memory stores.
    #[must_use]
    pub fn watch(self: &Arc<Self>) -> Option<JoinHandle<anyhow::Result<()>>> {
        let path = self.path.clone()?;
        let store = Arc::clone(self);
        Some(FileWatcher::new(path).spawn(move || match store.reload() {
            Ok(count) => tracing::info!(symbols = count, "Trade config reloaded"),
            Err(e) => tracing::error!(error = %e, "Trade config reload failed; keeping previous values"),
        }))
    }
}

fn read_file(path: &Path) -> Result<BTreeMap<String, TradeConfig>, TradeConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Trade config file missing; starting empty");
            return Ok(BTreeMap::new());
        }
        Err(source) => {
            return Err(TradeConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let configs: BTreeMap<String, TradeConfig> =
        serde_json::from_str(&text).map_err(|source| TradeConfigError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    // A file is accepted whole or not at all.
    for (symbol, config) in &configs {
        config.validate().map_err(|reason| TradeConfigError::Invalid {
            symbol: symbol.clone(),
            reason,
        })?;
    }
    Ok(configs)
}

fn write_file(path: &Path, configs: &BTreeMap<String, TradeConfig>) -> Result<(), TradeConfigError> {
    let io_err = |source| TradeConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_string_pretty(configs).map_err(|source| TradeConfigError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    // Write-then-rename so readers never observe a half-written file.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cfg(qty: u32) -> TradeConfig {
        TradeConfig {
            qty,
            tp: dec!(5),
            sl: dec!(2),
        }
    }

    #[test]
    fn symbol_entry_wins_over_default() {
        let store = TradeConfigStore::in_memory(BTreeMap::from([
            (DEFAULT_KEY.to_string(), cfg(1)),
            ("SBIN".to_string(), cfg(3)),
        ]));

        assert_eq!(store.get("SBIN").unwrap().qty, 3);
        assert_eq!(store.get("TCS").unwrap().qty, 1);
    }

    #[test]
    fn no_entry_and_no_default_is_absent() {
        let store = TradeConfigStore::in_memory(BTreeMap::from([("SBIN".to_string(), cfg(3))]));
        assert!(store.get("TCS").is_none());
    }

    #[test]
    fn upsert_rejects_invalid_config() {
        let store = TradeConfigStore::default();
        let err = store.upsert("SBIN", cfg(0)).unwrap_err();
        assert!(matches!(err, TradeConfigError::Invalid { .. }));
        assert!(store.get("SBIN").is_none());

        assert!(store.upsert("  ", cfg(1)).is_err());
    }

    #[test]
    fn upsert_persists_and_reload_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tpsl.json");

        let store = TradeConfigStore::load(&path).unwrap();
        assert!(store.snapshot().is_empty());
        store.upsert("DEFAULT", cfg(1)).unwrap();
        store.upsert("SBIN", cfg(2)).unwrap();

        let reopened = TradeConfigStore::load(&path).unwrap();
        assert_eq!(reopened.get("SBIN").unwrap().qty, 2);
        assert_eq!(reopened.get("INFY").unwrap().qty, 1);

        std::fs::write(&path, r#"{"DEFAULT": {"qty": 4, "tp": 10, "sl": 5}}"#).unwrap();
        assert_eq!(reopened.reload().unwrap(), 1);
        assert_eq!(reopened.get("SBIN").unwrap().qty, 4);
        assert_eq!(reopened.get("SBIN").unwrap().tp, dec!(10));
    }

    #[test]
    fn corrupt_file_keeps_previous_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tpsl.json");
        std::fs::write(&path, r#"{"DEFAULT": {"qty": 1, "tp": 5, "sl": 2}}"#).unwrap();

        let store = TradeConfigStore::load(&path).unwrap();
        std::fs::write(&path, "{oops").unwrap();

        assert!(matches!(store.reload(), Err(TradeConfigError::Decode { .. })));
        assert_eq!(store.get("ANY").unwrap().qty, 1);
    }

    #[test]
    fn invalid_entries_in_file_keep_previous_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tpsl.json");
        std::fs::write(&path, r#"{"DEFAULT": {"qty": 1, "tp": 5, "sl": 2}}"#).unwrap();

        let store = TradeConfigStore::load(&path).unwrap();
        std::fs::write(&path, r#"{"DEFAULT": {"qty": 0, "tp": -5, "sl": -3}}"#).unwrap();

        match store.reload() {
            Err(TradeConfigError::Invalid { symbol, .. }) => assert_eq!(symbol, DEFAULT_KEY),
            other => panic!("expected Invalid, got {other:?}"),
        }
        let kept = store.get("ANY").unwrap();
        assert_eq!(kept.qty, 1);
        assert_eq!(kept.tp, dec!(5));
        assert_eq!(kept.sl, dec!(2));
    }

    #[test]
    fn load_rejects_file_with_invalid_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tpsl.json");
        std::fs::write(
            &path,
            r#"{"DEFAULT": {"qty": 1, "tp": 5, "sl": 2}, "SBIN": {"qty": 2, "tp": 8, "sl": -3}}"#,
        )
        .unwrap();

        let err = TradeConfigStore::load(&path).unwrap_err();

        assert!(matches!(err, TradeConfigError::Invalid { ref symbol, .. } if symbol == "SBIN"));
    }
}
