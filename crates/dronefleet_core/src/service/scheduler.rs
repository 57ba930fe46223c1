//! Periodic battery scan worker.
//!
//! # Invariants
//! - The worker owns its own SQLite connection; nothing is shared with
//!   request-path connections except the database file.
//! - A scan in flight always finishes before shutdown returns.
//! - Scan failures are logged and alerted by the monitor; the worker keeps
//!   its schedule.

use crate::config::MonitorConfig;
use crate::db::open_db;
use crate::events::NotificationBus;
use crate::service::battery_monitor::{sqlite_battery_monitor, MonitorError};
use log::{error, info};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const WORKER_NAME: &str = "battery-monitor";

/// Handle to the background scan thread.
pub struct MonitorScheduler {
    stop_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
    completed_scans: Arc<AtomicU64>,
}

impl MonitorScheduler {
    /// Starts scanning `db_path` every `config.scan_interval_ms`.
    ///
    /// The first scan runs immediately.
    pub fn spawn(
        db_path: impl Into<PathBuf>,
        config: MonitorConfig,
        bus: Arc<NotificationBus>,
    ) -> Result<Self, MonitorError> {
        let db_path = db_path.into();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let completed_scans = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&completed_scans);

        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || {
                let conn = match open_db(&db_path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        error!(
                            "event=monitor_worker module=scheduler status=error stage=open path={} error={err}",
                            db_path.display()
                        );
                        return;
                    }
                };
                let interval = config.scan_interval();
                let monitor = sqlite_battery_monitor(&conn, bus, config);
                info!(
                    "event=monitor_worker module=scheduler status=start interval_ms={}",
                    interval.as_millis()
                );

                loop {
                    if let Err(err) = monitor.run_scan() {
                        error!("event=monitor_worker module=scheduler status=error stage=scan error={err}");
                    }
                    counter.fetch_add(1, Ordering::SeqCst);

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("event=monitor_worker module=scheduler status=stop");
            })
            .map_err(MonitorError::WorkerSpawn)?;

        Ok(Self {
            stop_tx,
            worker: Some(worker),
            completed_scans,
        })
    }

    /// Number of scans the worker has finished, successful or not.
    pub fn completed_scans(&self) -> u64 {
        self.completed_scans.load(Ordering::SeqCst)
    }

    /// Signals the worker and waits for it to exit.
    pub fn shutdown(mut self) -> Result<(), MonitorError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<(), MonitorError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        // The worker may already be gone; a failed send is fine.
        let _ = self.stop_tx.send(());
        worker.join().map_err(|_| MonitorError::WorkerPanicked)
    }
}

impl Drop for MonitorScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.stop_and_join() {
            error!("event=monitor_worker module=scheduler status=error stage=drop error={err}");
        }
    }
}
