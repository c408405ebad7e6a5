//! Lifecycle event fan-out.
//!
//! Every listener owns an unbounded channel drained by its own task, so emitting an
//! event never waits on listener code. Events reach one listener in emission order;
//! there is no ordering between listeners.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::aggregator::AggregateStatus;
use super::result::CheckResult;
use crate::error::{HealthError, Result};

#[async_trait::async_trait]
pub trait CheckListener: Send + Sync {
    async fn on_check_registered(&self, _name: &str, _result: &CheckResult) {}

    async fn on_check_started(&self, _name: &str) {}

    async fn on_check_completed(&self, _name: &str, _result: &CheckResult) {}
}

#[async_trait::async_trait]
pub trait HealthListener: Send + Sync {
    async fn on_results_updated(&self, status: &AggregateStatus);
}

#[derive(Debug, Clone)]
pub enum CheckEvent {
    Registered { name: String, result: CheckResult },
    Started { name: String },
    Completed { name: String, result: CheckResult },
}

impl CheckEvent {
    pub fn name(&self) -> &str {
        match self {
            CheckEvent::Registered { name, .. } => name,
            CheckEvent::Started { name } => name,
            CheckEvent::Completed { name, .. } => name,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CheckEvent::Registered { .. } => "registered",
            CheckEvent::Started { .. } => "started",
            CheckEvent::Completed { .. } => "completed",
        }
    }
}

pub struct NotificationHub {
    check_senders: RwLock<Vec<mpsc::UnboundedSender<CheckEvent>>>,
    health_senders: RwLock<Vec<mpsc::UnboundedSender<Arc<AggregateStatus>>>>,
    listener_timeout: Duration,
    faults: Arc<AtomicU64>,
}

impl NotificationHub {
    pub fn new(listener_timeout: Duration) -> Self {
        Self {
            check_senders: RwLock::new(Vec::new()),
            health_senders: RwLock::new(Vec::new()),
            listener_timeout,
            faults: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts a delivery task for `listener`. Needs a running tokio runtime.
    pub fn add_check_listener(&self, listener: Arc<dyn CheckListener>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| HealthError::Runtime(e.to_string()))?;
        let (tx, mut rx) = mpsc::unbounded_channel::<CheckEvent>();
        let timeout = self.listener_timeout;
        let faults = self.faults.clone();

        runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                let kind = event.kind();
                let name = event.name().to_string();
                let delivery = async {
                    match &event {
                        CheckEvent::Registered { name, result } => {
                            listener.on_check_registered(name, result).await
                        }
                        CheckEvent::Started { name } => listener.on_check_started(name).await,
                        CheckEvent::Completed { name, result } => {
                            listener.on_check_completed(name, result).await
                        }
                    }
                };
                deliver(delivery, timeout, &faults, kind, &name).await;
            }
            debug!("Check listener channel closed");
        });

        self.check_senders.write().push(tx);
        Ok(())
    }

    /// Starts a delivery task for `listener`. Needs a running tokio runtime.
    pub fn add_health_listener(&self, listener: Arc<dyn HealthListener>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| HealthError::Runtime(e.to_string()))?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<AggregateStatus>>();
        let timeout = self.listener_timeout;
        let faults = self.faults.clone();

        runtime.spawn(async move {
            while let Some(status) = rx.recv().await {
                let delivery = listener.on_results_updated(&status);
                deliver(delivery, timeout, &faults, "results-updated", "*").await;
            }
            debug!("Health listener channel closed");
        });

        self.health_senders.write().push(tx);
        Ok(())
    }

    pub fn check_registered(&self, name: &str, result: &CheckResult) {
        self.emit(CheckEvent::Registered {
            name: name.to_string(),
            result: result.clone(),
        });
    }

    pub fn check_started(&self, name: &str) {
        self.emit(CheckEvent::Started {
            name: name.to_string(),
        });
    }

    pub fn check_completed(&self, name: &str, result: &CheckResult) {
        self.emit(CheckEvent::Completed {
            name: name.to_string(),
            result: result.clone(),
        });
    }

    pub fn results_updated(&self, status: Arc<AggregateStatus>) {
        for sender in self.health_senders.read().iter() {
            if sender.send(status.clone()).is_err() {
                debug!("Dropping results-updated event: listener task has stopped");
            }
        }
    }

    fn emit(&self, event: CheckEvent) {
        for sender in self.check_senders.read().iter() {
            if sender.send(event.clone()).is_err() {
                debug!("Dropping {} event for '{}': listener task has stopped", event.kind(), event.name());
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.check_senders.read().len() + self.health_senders.read().len()
    }

    /// Listener invocations that panicked or overran the listener timeout.
    pub fn fault_count(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}

async fn deliver<F>(delivery: F, timeout: Duration, faults: &AtomicU64, kind: &str, name: &str)
where
    F: std::future::Future<Output = ()>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(delivery).catch_unwind()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            faults.fetch_add(1, Ordering::Relaxed);
            error!("Listener panicked while handling {} event for '{}'", kind, name);
        }
        Err(_) => {
            faults.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Listener exceeded {:?} while handling {} event for '{}'",
                timeout, kind, name
            );
        }
    }
}

/// Writes lifecycle events to the tracing subscriber.
#[derive(Debug, Default, Clone)]
pub struct LoggingListener;

#[async_trait::async_trait]
impl CheckListener for LoggingListener {
    async fn on_check_registered(&self, name: &str, result: &CheckResult) {
        info!("Check '{}' registered with initial status {}", name, result.status);
    }

    async fn on_check_started(&self, name: &str) {
        debug!("Check '{}' started", name);
    }

    async fn on_check_completed(&self, name: &str, result: &CheckResult) {
        if result.is_healthy() {
            debug!("Check '{}' completed in {:?}: {}", name, result.duration, result.status);
        } else {
            warn!(
                "Check '{}' completed in {:?}: {} ({}), {} failure(s) in a row",
                name,
                result.duration,
                result.status,
                result.error.as_deref().unwrap_or("no error message"),
                result.contiguous_failures
            );
        }
    }
}

#[async_trait::async_trait]
impl HealthListener for LoggingListener {
    async fn on_results_updated(&self, status: &AggregateStatus) {
        info!(
            "There are {} results, overall status is {}",
            status.checks.len(),
            status.overall
        );
    }
}
