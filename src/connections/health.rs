//! Background health checking for registered connections.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::connections::manager::ConnectionPoolManager;

/// Periodically runs the health check of every connection that is due.
pub struct HealthChecker {
    manager: Arc<ConnectionPoolManager>,
    tick: Duration,
}

impl HealthChecker {
    pub fn new(manager: Arc<ConnectionPoolManager>, tick: Duration) -> Self {
        Self { manager, tick }
    }

    /// Start the loop on the current runtime.
    pub fn spawn(self) -> HealthCheckHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        HealthCheckHandle {
            shutdown,
            task: Some(task),
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Health checker started (tick {:?})", self.tick);

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_due(&shutdown).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Health checker stopped");
    }

    /// Check every due connection once. Returns how many were checked.
    pub async fn run_once(&self) -> usize {
        let (_keep, rx) = watch::channel(false);
        self.check_due(&rx).await
    }

    async fn check_due(&self, shutdown: &watch::Receiver<bool>) -> usize {
        let due = self.manager.due_for_check(Utc::now()).await;
        if !due.is_empty() {
            debug!("{} connections due for a health check", due.len());
        }

        let mut checked = 0;
        for id in &due {
            if *shutdown.borrow() {
                break;
            }
            match self.manager.health_check_connection(id).await {
                Ok(status) => debug!("Connection {} is {}", id, status),
                Err(e) => error!("Health check for {} errored: {}", id, e),
            }
            checked += 1;
        }
        checked
    }
}

/// Handle to a running [`HealthChecker`]. Dropping it stops the loop.
pub struct HealthCheckHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl HealthCheckHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signal the loop and wait for it to exit. A check already in progress
    /// finishes its current connection first.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Health checker task failed: {}", e);
            }
        }
    }
}

impl Drop for HealthCheckHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
