//! The long-running scan and monitor service.

use crate::monitor::{MonitorReport, PositionMonitor};
use crate::scanner::{ScanSummary, Scanner};
use anyhow::{anyhow, Result};
use autotrader_core::{EngineError, SchedulerConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Snapshot of the service, published on every iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub scans_completed: u64,
    pub monitor_ticks: u64,
    pub last_scan: Option<ScanSummary>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_monitor: Option<MonitorReport>,
    pub last_monitor_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Scanner and monitor wired to their intervals.
pub struct AutoTrader {
    scanner: Arc<Scanner>,
    monitor: Arc<PositionMonitor>,
    config: SchedulerConfig,
}

impl AutoTrader {
    #[must_use]
    pub fn new(
        scanner: Arc<Scanner>,
        monitor: Arc<PositionMonitor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            scanner,
            monitor,
            config,
        }
    }

    /// Spawns the scan loop and the monitor loop. Both run their first iteration
    /// immediately.
    #[must_use]
    pub fn start(self) -> AutoTraderHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(ServiceStatus {
            running: true,
            ..ServiceStatus::default()
        });
        let status_tx = Arc::new(status_tx);
        let (scan_tx, scan_rx) = mpsc::channel(8);
        let (monitor_tx, monitor_rx) = mpsc::channel(8);

        tracing::info!(
            scan_interval_secs = self.config.scan_interval_secs,
            monitor_interval_secs = self.config.monitor_interval_secs,
            "Auto-trader started"
        );

        let scan_task = tokio::spawn(scan_loop(
            self.scanner,
            Duration::from_secs(self.config.scan_interval_secs.max(1)),
            shutdown_rx.clone(),
            scan_rx,
            Arc::clone(&status_tx),
        ));
        let monitor_task = tokio::spawn(monitor_loop(
            self.monitor,
            Duration::from_secs(self.config.monitor_interval_secs.max(1)),
            shutdown_rx,
            monitor_rx,
            Arc::clone(&status_tx),
        ));

        AutoTraderHandle {
            scan_tx,
            monitor_tx,
            shutdown_tx,
            status_tx,
            status_rx,
            tasks: vec![scan_task, monitor_task],
        }
    }
}

async fn scan_loop(
    scanner: Arc<Scanner>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut requests: mpsc::Receiver<Reply<ScanSummary>>,
    status: Arc<watch::Sender<ServiceStatus>>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let reply = tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => None,
            Some(reply) = requests.recv() => Some(reply),
        };

        // runs to completion even if shutdown arrives meanwhile
        let result = scanner.scan_all().await;
        status.send_modify(|s| {
            s.last_scan_at = Some(Utc::now());
            match &result {
                Ok(summary) => {
                    s.scans_completed += 1;
                    s.last_scan = Some(summary.clone());
                    s.last_error = None;
                }
                Err(e) => s.last_error = Some(format!("scan: {e}")),
            }
        });
        if let Err(e) = &result {
            tracing::error!(error = %e, "Scan pass failed");
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }
    tracing::info!("Scan loop stopped");
}

async fn monitor_loop(
    monitor: Arc<PositionMonitor>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut requests: mpsc::Receiver<Reply<MonitorReport>>,
    status: Arc<watch::Sender<ServiceStatus>>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let reply = tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => None,
            Some(reply) = requests.recv() => Some(reply),
        };

        let result = monitor.tick().await;
        status.send_modify(|s| {
            s.last_monitor_at = Some(Utc::now());
            match &result {
                Ok(report) => {
                    s.monitor_ticks += 1;
                    s.last_monitor = Some(report.clone());
                    s.last_error = None;
                }
                Err(e) => s.last_error = Some(format!("monitor: {e}")),
            }
        });
        if let Err(e) = &result {
            tracing::error!(error = %e, "Monitor tick failed");
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }
    tracing::info!("Monitor loop stopped");
}

/// Control surface of a running [`AutoTrader`].
pub struct AutoTraderHandle {
    scan_tx: mpsc::Sender<Reply<ScanSummary>>,
    monitor_tx: mpsc::Sender<Reply<MonitorReport>>,
    shutdown_tx: watch::Sender<bool>,
    status_tx: Arc<watch::Sender<ServiceStatus>>,
    status_rx: watch::Receiver<ServiceStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl AutoTraderHandle {
    /// Runs a scan pass now, queued behind any pass already running.
    ///
    /// # Errors
    /// Returns an error if the service has stopped or the pass failed.
    pub async fn scan_now(&self) -> Result<ScanSummary> {
        let (tx, rx) = oneshot::channel();
        self.scan_tx
            .send(tx)
            .await
            .map_err(|_| anyhow!("scan loop has stopped"))?;
        Ok(rx.await??)
    }

    /// Runs a monitor tick now.
    ///
    /// # Errors
    /// Returns an error if the service has stopped or the tick failed.
    pub async fn monitor_now(&self) -> Result<MonitorReport> {
        let (tx, rx) = oneshot::channel();
        self.monitor_tx
            .send(tx)
            .await
            .map_err(|_| anyhow!("monitor loop has stopped"))?;
        Ok(rx.await??)
    }

    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver that sees every status update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ServiceStatus> {
        self.status_rx.clone()
    }

    /// Stops both loops and waits for any iteration in flight to finish.
    ///
    /// # Errors
    /// Returns an error if a loop task panicked.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            task.await?;
        }
        self.status_tx.send_modify(|s| s.running = false);
        tracing::info!("Auto-trader stopped");
        Ok(())
    }
}
