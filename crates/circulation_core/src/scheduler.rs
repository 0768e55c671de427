//! Background notification scheduler.
//!
//! # Responsibility
//! - Run the notification sweep once after a startup delay and then on a
//!   fixed interval, on a dedicated thread with its own connection.
//! - Stop promptly when asked, including mid-wait.
//!
//! # Invariants
//! - A failed sweep is logged and never stops the loop.
//! - The scheduler holds no lock shared with workflow callers; overlapping
//!   sweeps are harmless because alerts are deduplicated by key.

use crate::clock::Clock;
use crate::config::CirculationConfig;
use crate::db::open_db;
use crate::service::sweep_service::NotificationSweep;
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const THREAD_NAME: &str = "circulation-sweep";

/// Entry point for starting the background sweep loop.
pub struct NotificationScheduler;

impl NotificationScheduler {
    /// Spawns the scheduler thread against the database at `db_path`.
    ///
    /// The thread opens its own connection; if that fails the thread logs
    /// the error and exits, and `SchedulerHandle::shutdown` still returns.
    pub fn spawn(
        db_path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        config: CirculationConfig,
    ) -> std::io::Result<SchedulerHandle> {
        let db_path = db_path.into();
        let (stop_tx, stop_rx) = mpsc::channel();
        let completed_runs = Arc::new(AtomicU64::new(0));
        let runs = Arc::clone(&completed_runs);

        let join = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let conn = match open_db(&db_path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        error!(
                            "event=scheduler_start module=scheduler status=error error_code=scheduler_db_open_failed error={}",
                            err
                        );
                        return;
                    }
                };
                run_loop(conn, clock.as_ref(), &config, &stop_rx, &runs);
            })?;

        info!("event=scheduler_start module=scheduler status=ok");
        Ok(SchedulerHandle {
            stop_tx,
            join: Some(join),
            completed_runs,
        })
    }
}

/// Owner handle for a running scheduler thread.
///
/// Dropping the handle also stops the thread.
pub struct SchedulerHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
    completed_runs: Arc<AtomicU64>,
}

impl SchedulerHandle {
    /// Number of sweeps finished so far, successful or not.
    pub fn completed_runs(&self) -> u64 {
        self.completed_runs.load(Ordering::SeqCst)
    }

    /// Signals the thread and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        let _ = self.stop_tx.send(());
        if join.join().is_err() {
            warn!("event=scheduler_stop module=scheduler status=error error_code=scheduler_panicked");
            return;
        }
        info!("event=scheduler_stop module=scheduler status=ok");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run_loop(
    mut conn: Connection,
    clock: &dyn Clock,
    config: &CirculationConfig,
    stop_rx: &Receiver<()>,
    completed_runs: &AtomicU64,
) {
    let mut wait = config.startup_delay();
    loop {
        if should_stop(stop_rx, wait) {
            return;
        }
        if let Err(err) = NotificationSweep::new(&mut conn, clock, config).run() {
            warn!(
                "event=scheduler_tick module=scheduler status=error error_code=sweep_failed error={}",
                err
            );
        }
        completed_runs.fetch_add(1, Ordering::SeqCst);
        wait = config.sweep_interval();
    }
}

/// Waits up to `wait`; `true` once a stop signal arrives or the handle is gone.
fn should_stop(stop_rx: &Receiver<()>, wait: Duration) -> bool {
    match stop_rx.recv_timeout(wait) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}
