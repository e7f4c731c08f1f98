use alert_bridge_core::{BrokerageGateway, CredentialStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::activity_log::ActivityLog;
use crate::error::MonitorError;
use crate::monitor::{MonitorSnapshot, Position, PositionMonitor};
use crate::submitter::OrderSubmitter;

struct MonitorEntry {
    monitor: Arc<PositionMonitor>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Owns every running position monitor so they can be listed and cancelled.
pub struct MonitorSupervisor {
    gateway: Arc<dyn BrokerageGateway>,
    submitter: Arc<OrderSubmitter>,
    credentials: Arc<CredentialStore>,
    log: Arc<dyn ActivityLog>,
    monitors: Arc<RwLock<HashMap<u64, MonitorEntry>>>,
    next_id: AtomicU64,
}

impl MonitorSupervisor {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn BrokerageGateway>,
        submitter: Arc<OrderSubmitter>,
        credentials: Arc<CredentialStore>,
        log: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            gateway,
            submitter,
            credentials,
            log,
            monitors: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a tick stream for `position` and starts its monitor task.
    ///
    /// # Errors
    /// Fails without side effects if no valid lease is installed or the
    /// stream cannot be opened.
    pub async fn spawn(&self, position: Position) -> Result<Arc<PositionMonitor>, MonitorError> {
        if let Err(e) = self.credentials.current() {
            self.log.trade(&format!(
                "Monitor not started for {}: {e}",
                position.tradingsymbol
            ));
            return Err(e.into());
        }

        let subscription = match self.gateway.open_tick_stream().await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.log.trade(&format!(
                    "Monitor not started for {}: {e}",
                    position.tradingsymbol
                ));
                return Err(e.into());
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let monitor = Arc::new(PositionMonitor::new(
            id,
            position,
            subscription.commands,
            Arc::clone(&self.submitter),
            Arc::clone(&self.log),
        ));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(&monitor).run(subscription.events, cancel_rx));

        let snapshot = monitor.snapshot();
        tracing::info!(
            monitor_id = id,
            tradingsymbol = %snapshot.tradingsymbol,
            token = snapshot.instrument_token,
            entry = %snapshot.entry_price,
            take_profit = %snapshot.take_profit_price,
            stop_loss = %snapshot.stop_loss_price,
            "Position monitor started"
        );

        self.monitors.write().await.insert(
            id,
            MonitorEntry {
                monitor: Arc::clone(&monitor),
                cancel: Some(cancel_tx),
                task,
            },
        );

        Ok(monitor)
    }

    /// Snapshots of all registered monitors, ordered by id.
    pub async fn list(&self) -> Vec<MonitorSnapshot> {
        let mut snapshots: Vec<_> = self
            .monitors
            .read()
            .await
            .values()
            .map(|entry| entry.monitor.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    pub async fn get(&self, id: u64) -> Option<MonitorSnapshot> {
        self.monitors
            .read()
            .await
            .get(&id)
            .map(|entry| entry.monitor.snapshot())
    }

    /// Monitors still watching an open position.
    pub async fn active_count(&self) -> usize {
        self.monitors
            .read()
            .await
            .values()
            .filter(|entry| !entry.monitor.is_exited() && entry.monitor.is_streaming())
            .count()
    }

    /// Open positions whose tick stream ended before an exit; they need manual handling.
    pub async fn unmonitored(&self) -> Vec<MonitorSnapshot> {
        let mut snapshots: Vec<_> = self
            .monitors
            .read()
            .await
            .values()
            .filter(|entry| !entry.monitor.is_exited() && !entry.monitor.is_streaming())
            .map(|entry| entry.monitor.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// Unsubscribes a monitor without placing an order.
    ///
    /// Cancelling an already exited monitor is a no-op that returns its snapshot.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id.
    pub async fn cancel(&self, id: u64) -> Result<MonitorSnapshot, MonitorError> {
        let (monitor, cancel) = {
            let mut monitors = self.monitors.write().await;
            let entry = monitors.get_mut(&id).ok_or(MonitorError::NotFound(id))?;
            (Arc::clone(&entry.monitor), entry.cancel.take())
        };

        monitor.cancel().await;
        if let Some(cancel) = cancel {
            let _ = cancel.send(());
        }

        Ok(monitor.snapshot())
    }

    /// Cancels every monitor and waits for their tasks. Returns how many were active.
    pub async fn shutdown_all(&self) -> usize {
        let entries: Vec<MonitorEntry> = self.monitors.write().await.drain().map(|(_, e)| e).collect();
        let mut cancelled = 0;

        for mut entry in entries {
            if entry.monitor.cancel().await {
                cancelled += 1;
            }
            if let Some(cancel) = entry.cancel.take() {
                let _ = cancel.send(());
            }
            if let Err(e) = entry.task.await {
                tracing::error!(monitor_id = entry.monitor.id(), error = %e, "Monitor task failed");
            }
        }

        tracing::info!(cancelled, "All position monitors shut down");
        cancelled
    }

    /// Drops monitors whose tasks have finished, exited or not. Returns how many were removed.
    ///
    /// A position dropped here while still open was already reported on the
    /// trade log when its stream ended.
    pub async fn prune_finished(&self) -> usize {
        let mut monitors = self.monitors.write().await;
        let before = monitors.len();
        monitors.retain(|id, entry| {
            if !entry.task.is_finished() {
                return true;
            }
            if !entry.monitor.is_exited() {
                tracing::warn!(
                    monitor_id = *id,
                    tradingsymbol = %entry.monitor.position().tradingsymbol,
                    "Pruning monitor whose position was left open"
                );
            }
            false
        });
        before - monitors.len()
    }
}
