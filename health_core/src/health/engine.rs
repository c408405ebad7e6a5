//! The health-check engine: registration, scheduling and the aggregated read path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::aggregator::{AggregateStatus, Aggregator, UnknownPolicy};
use super::entry::CheckConfig;
use super::exporter::StatusExporter;
use super::notify::{CheckListener, HealthListener, NotificationHub};
use super::registry::Registry;
use super::result::CheckResult;
use super::scheduler::{ExecutionStats, Scheduler};
use super::store::{ResultSnapshot, ResultStore};
use crate::config::EngineConfig;
use crate::error::{HealthError, Result};

/// State reachable from every scheduled execution.
pub(crate) struct EngineShared {
    pub(crate) registry: Registry,
    pub(crate) store: ResultStore,
    pub(crate) aggregator: Arc<Aggregator>,
    pub(crate) hub: NotificationHub,
}

impl EngineShared {
    /// Records a finished execution. Returns false when the generation was stale
    /// and nothing was written or announced.
    pub(crate) fn complete(&self, name: &str, generation: u64, result: CheckResult) -> bool {
        let Some(stored) = self.store.commit(name, generation, result) else {
            return false;
        };

        if stored.is_healthy() {
            debug!("Check '{}' is healthy ({:?})", name, stored.duration);
        } else {
            warn!(
                "Check '{}' is {}: {}",
                name,
                stored.status,
                stored.error.as_deref().unwrap_or("no error message")
            );
        }

        self.hub.check_completed(name, &stored);
        let status = self.aggregator.recompute(&self.registry, &self.store);
        self.hub.results_updated(status);
        true
    }
}

pub struct HealthEngineBuilder {
    unknown_policy: UnknownPolicy,
    listener_timeout: Duration,
    status_timeout: Duration,
    check_listeners: Vec<Arc<dyn CheckListener>>,
    health_listeners: Vec<Arc<dyn HealthListener>>,
}

impl Default for HealthEngineBuilder {
    fn default() -> Self {
        Self {
            unknown_policy: UnknownPolicy::default(),
            listener_timeout: Duration::from_secs(5),
            status_timeout: Duration::from_secs(1),
            check_listeners: Vec::new(),
            health_listeners: Vec::new(),
        }
    }
}

impl HealthEngineBuilder {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::default()
            .unknown_policy(config.unknown_policy)
            .listener_timeout(Duration::from_millis(config.listener_timeout_ms))
            .status_timeout(Duration::from_millis(config.status_timeout_ms))
    }

    pub fn unknown_policy(mut self, policy: UnknownPolicy) -> Self {
        self.unknown_policy = policy;
        self
    }

    pub fn listener_timeout(mut self, timeout: Duration) -> Self {
        self.listener_timeout = timeout;
        self
    }

    pub fn status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn check_listener<L: CheckListener + 'static>(mut self, listener: L) -> Self {
        self.check_listeners.push(Arc::new(listener));
        self
    }

    pub fn health_listener<L: HealthListener + 'static>(mut self, listener: L) -> Self {
        self.health_listeners.push(Arc::new(listener));
        self
    }

    /// Must be called inside a tokio runtime when listeners were added.
    pub fn build(self) -> Result<HealthEngine> {
        let aggregator = Arc::new(Aggregator::new(self.unknown_policy));
        let hub = NotificationHub::new(self.listener_timeout);
        for listener in self.check_listeners {
            hub.add_check_listener(listener)?;
        }
        for listener in self.health_listeners {
            hub.add_health_listener(listener)?;
        }

        Ok(HealthEngine {
            shared: Arc::new(EngineShared {
                registry: Registry::new(),
                store: ResultStore::new(),
                aggregator,
                hub,
            }),
            scheduler: Scheduler::new(),
            status_timeout: self.status_timeout,
        })
    }
}

pub struct HealthEngine {
    shared: Arc<EngineShared>,
    scheduler: Scheduler,
    status_timeout: Duration,
}

impl HealthEngine {
    pub fn builder() -> HealthEngineBuilder {
        HealthEngineBuilder::default()
    }

    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Validates and schedules a check. The returned placeholder is pending until
    /// the first execution completes.
    pub fn register(&self, config: CheckConfig) -> Result<CheckResult> {
        let entry = config.into_entry()?;
        let runtime = self.scheduler.runtime()?;
        let entry = self.shared.registry.insert(entry)?;

        let initial = CheckResult::pending();
        info!(
            "Registered check '{}' ({:?}, delay {:?}, period {:?}, timeout {:?})",
            entry.name, entry.severity, entry.initial_delay, entry.execution_period, entry.timeout
        );
        self.shared.hub.check_registered(&entry.name, &initial);
        self.shared
            .aggregator
            .recompute(&self.shared.registry, &self.shared.store);

        let name = entry.name.clone();
        if let Err(e) = self.scheduler.schedule(&runtime, entry, self.shared.clone()) {
            // Shutdown started after the insert; its drain has already run.
            self.shared.registry.remove(&name);
            let status = self
                .shared
                .aggregator
                .recompute(&self.shared.registry, &self.shared.store);
            self.shared.hub.results_updated(status);
            warn!("Rolled back registration of '{}': {}", name, e);
            return Err(e);
        }
        Ok(initial)
    }

    /// Stops the check and forgets its results. The name can be registered again.
    pub fn deregister(&self, name: &str) -> Result<()> {
        if self.shared.registry.remove(name).is_none() {
            return Err(HealthError::NotFound(format!("Check '{}' is not registered", name)));
        }

        self.scheduler.unschedule(name);
        self.shared.store.remove(name);
        let status = self
            .shared
            .aggregator
            .recompute(&self.shared.registry, &self.shared.store);
        self.shared.hub.results_updated(status);

        info!("Deregistered check '{}'", name);
        Ok(())
    }

    pub fn deregister_all(&self) {
        for name in self.shared.registry.names() {
            if let Err(e) = self.deregister(&name) {
                debug!("Check '{}' was already gone: {}", name, e);
            }
        }
    }

    /// Stops all tickers and drops every registration. Registering afterwards fails.
    pub async fn shutdown(&self) {
        if self.scheduler.is_shutting_down() {
            return;
        }
        info!("Shutting down health engine with {} checks", self.shared.registry.len());
        self.scheduler.shutdown().await;
        self.deregister_all();
    }

    pub fn add_check_listener<L: CheckListener + 'static>(&self, listener: L) -> Result<()> {
        self.shared.hub.add_check_listener(Arc::new(listener))
    }

    pub fn add_health_listener<L: HealthListener + 'static>(&self, listener: L) -> Result<()> {
        self.shared.hub.add_health_listener(Arc::new(listener))
    }

    /// Latest result of every check that has completed at least once.
    pub fn results(&self) -> ResultSnapshot {
        self.shared.store.snapshot()
    }

    pub fn result(&self, name: &str) -> Option<CheckResult> {
        self.shared.store.get(name)
    }

    pub fn status(&self) -> Arc<AggregateStatus> {
        self.shared.aggregator.snapshot()
    }

    pub fn is_healthy(&self) -> bool {
        self.status().is_healthy()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.shared.registry.contains(name)
    }

    pub fn check_names(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    pub fn stats(&self, name: &str) -> Option<ExecutionStats> {
        self.scheduler.stats(name)
    }

    pub fn stats_all(&self) -> BTreeMap<String, ExecutionStats> {
        self.check_names()
            .into_iter()
            .filter_map(|name| self.stats(&name).map(|stats| (name, stats)))
            .collect()
    }

    /// Listener invocations that panicked or timed out.
    pub fn listener_faults(&self) -> u64 {
        self.shared.hub.fault_count()
    }

    pub fn exporter(&self) -> StatusExporter {
        StatusExporter::new(self.shared.aggregator.clone(), self.status_timeout)
    }
}
