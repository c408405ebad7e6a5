//! Per-check tickers and bounded executions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::check::CheckOutcome;
use super::engine::EngineShared;
use super::entry::CheckEntry;
use super::result::CheckResult;
use crate::error::{HealthError, Result};

#[derive(Debug, Default)]
pub struct CheckStats {
    executions: AtomicU64,
    skipped_ticks: AtomicU64,
    stale_results: AtomicU64,
    in_flight: AtomicBool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Executions that produced a result, timeouts included.
    pub executions: u64,
    /// Ticks dropped because the previous execution was still running.
    pub skipped_ticks: u64,
    /// Late completions discarded by the generation check.
    pub stale_results: u64,
    pub in_flight: bool,
}

impl CheckStats {
    pub fn snapshot(&self) -> ExecutionStats {
        ExecutionStats {
            executions: self.executions.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            stale_results: self.stale_results.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }
}

/// Clears the in-flight flag when an execution ends, however it ends.
struct InFlight(Arc<CheckStats>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

struct ScheduledCheck {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    stats: Arc<CheckStats>,
}

pub struct Scheduler {
    root: CancellationToken,
    checks: Mutex<HashMap<String, ScheduledCheck>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            checks: Mutex::new(HashMap::new()),
        }
    }

    /// Runtime the tickers will be spawned on.
    pub fn runtime(&self) -> Result<Handle> {
        if self.root.is_cancelled() {
            return Err(HealthError::ShuttingDown);
        }
        Handle::try_current().map_err(|e| HealthError::Runtime(e.to_string()))
    }

    /// Starts the ticker for `entry`. Fails once `shutdown` has begun; the check
    /// lock makes this exclusive with the shutdown drain.
    pub(crate) fn schedule(
        &self,
        runtime: &Handle,
        entry: Arc<CheckEntry>,
        shared: Arc<EngineShared>,
    ) -> Result<()> {
        let mut checks = self.checks.lock();
        if self.root.is_cancelled() {
            return Err(HealthError::ShuttingDown);
        }

        let cancel = self.root.child_token();
        let stats = Arc::new(CheckStats::default());
        let name = entry.name.clone();

        let ticker = Ticker {
            entry,
            shared,
            cancel: cancel.clone(),
            stats: stats.clone(),
        };
        let handle = runtime.spawn(ticker.run());

        let previous = checks.insert(
            name.clone(),
            ScheduledCheck {
                cancel,
                handle,
                stats,
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        debug!("Scheduled check '{}'", name);
        Ok(())
    }

    /// Stops the ticker for `name`. An execution already running is abandoned.
    pub fn unschedule(&self, name: &str) -> bool {
        match self.checks.lock().remove(name) {
            Some(scheduled) => {
                scheduled.cancel.cancel();
                debug!("Unscheduled check '{}'", name);
                true
            }
            None => false,
        }
    }

    pub fn stats(&self, name: &str) -> Option<ExecutionStats> {
        self.checks.lock().get(name).map(|scheduled| scheduled.stats.snapshot())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancels every ticker and waits for them to exit. In-flight executions are
    /// signalled through their cancellation token and then left behind.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let drained: Vec<(String, ScheduledCheck)> = self.checks.lock().drain().collect();

        for (name, scheduled) in drained {
            if let Err(e) = scheduled.handle.await {
                if e.is_panic() {
                    warn!("Ticker for '{}' panicked during shutdown", name);
                }
            }
        }
        info!("Scheduler stopped");
    }
}

struct Ticker {
    entry: Arc<CheckEntry>,
    shared: Arc<EngineShared>,
    cancel: CancellationToken,
    stats: Arc<CheckStats>,
}

impl Ticker {
    async fn run(self) {
        if !self.entry.initial_delay.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.entry.initial_delay) => {}
            }
        }

        self.tick();

        let Some(period) = self.entry.execution_period else {
            debug!("Check '{}' runs once, ticker finished", self.entry.name);
            return;
        };

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => self.tick(),
            }
        }
        debug!("Ticker for '{}' stopped", self.entry.name);
    }

    fn tick(&self) {
        if self
            .stats
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Skipping tick for '{}': previous execution still running",
                self.entry.name
            );
            return;
        }

        let in_flight = InFlight(self.stats.clone());

        // Must be opened before spawning; a removed slot is never reopened.
        let Some(generation) = self.shared.store.begin_unless_cancelled(&self.entry.name, &self.cancel)
        else {
            debug!("Not starting '{}': check was unscheduled", self.entry.name);
            return;
        };

        let execution = Execution {
            entry: self.entry.clone(),
            shared: self.shared.clone(),
            scheduled: self.cancel.clone(),
            stats: self.stats.clone(),
            generation,
            _in_flight: in_flight,
        };
        tokio::spawn(execution.run());
    }
}

enum Finish {
    Returned(std::result::Result<CheckOutcome, JoinError>),
    TimedOut(Duration),
    Abandoned,
}

struct Execution {
    entry: Arc<CheckEntry>,
    shared: Arc<EngineShared>,
    scheduled: CancellationToken,
    stats: Arc<CheckStats>,
    generation: u64,
    _in_flight: InFlight,
}

impl Execution {
    async fn run(self) {
        let name = self.entry.name.clone();
        let execution_id = Uuid::new_v4();
        let generation = self.generation;
        self.shared.hub.check_started(&name);
        debug!(check = %name, %execution_id, generation, "Check execution started");

        let started = Instant::now();
        let token = self.scheduled.child_token();
        let check = self.entry.check.clone();
        let probe_token = token.clone();
        let mut probe = tokio::spawn(async move { check.execute(probe_token).await });

        let finish = tokio::select! {
            joined = &mut probe => Finish::Returned(joined),
            limit = expire(self.entry.timeout) => Finish::TimedOut(limit),
            _ = self.scheduled.cancelled() => Finish::Abandoned,
        };

        let (result, detached) = match finish {
            Finish::Returned(joined) => (to_result(&name, joined, started.elapsed()), None),
            Finish::TimedOut(limit) => {
                token.cancel();
                warn!(
                    check = %name, %execution_id,
                    "Check timed out after {:?}, detaching from the running probe", limit
                );
                (CheckResult::timed_out(limit, started.elapsed()), Some(probe))
            }
            Finish::Abandoned => {
                token.cancel();
                debug!(check = %name, %execution_id, "Check execution abandoned, scheduler stopped");
                return;
            }
        };

        self.stats.executions.fetch_add(1, Ordering::Relaxed);
        if !self.shared.complete(&name, generation, result) {
            self.stats.stale_results.fetch_add(1, Ordering::Relaxed);
            debug!(check = %name, %execution_id, generation, "Result discarded: generation is stale");
        }

        // The timeout result is committed first, so the late one always loses.
        if let Some(probe) = detached {
            self.detach(probe, generation, started);
        }
    }

    /// Lets a timed out probe finish in the background. Its result goes through the
    /// same generation fence and is dropped because the timeout already claimed it.
    fn detach(&self, probe: JoinHandle<CheckOutcome>, generation: u64, started: Instant) {
        let name = self.entry.name.clone();
        let shared = self.shared.clone();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            let late = to_result(&name, probe.await, started.elapsed());
            if !shared.complete(&name, generation, late) {
                stats.stale_results.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Discarded late result for '{}' after {:?}",
                    name,
                    started.elapsed()
                );
            }
        });
    }
}

async fn expire(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(limit) => {
            tokio::time::sleep(limit).await;
            limit
        }
        None => std::future::pending().await,
    }
}

fn to_result(
    name: &str,
    joined: std::result::Result<CheckOutcome, JoinError>,
    elapsed: Duration,
) -> CheckResult {
    match joined {
        Ok(Ok(details)) => CheckResult::healthy(Some(details), elapsed),
        Ok(Err(e)) => CheckResult::unhealthy(e.message, e.details, elapsed),
        Err(e) if e.is_panic() => {
            warn!("Check '{}' panicked", name);
            CheckResult::unhealthy("check panicked".to_string(), None, elapsed)
        }
        Err(_) => CheckResult::unhealthy("check execution was cancelled".to_string(), None, elapsed),
    }
}
