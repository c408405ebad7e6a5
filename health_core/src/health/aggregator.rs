//! Overall verdict derived from the latest results and each check's severity.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::entry::Severity;
use super::registry::Registry;
use super::result::{CheckResult, CheckStatus};
use super::store::ResultStore;

/// How a critical check that has not completed yet affects the verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPolicy {
    /// Left out of the verdict until its first completion.
    #[default]
    Exclude,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverallStatus {
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Healthy => write!(f, "Healthy"),
            OverallStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateStatus {
    pub overall: OverallStatus,
    /// Every registered check; never-run checks carry a pending placeholder.
    pub checks: BTreeMap<String, CheckResult>,
    pub severities: BTreeMap<String, Severity>,
    pub timestamp: DateTime<Utc>,
}

impl AggregateStatus {
    pub fn is_healthy(&self) -> bool {
        self.overall == OverallStatus::Healthy
    }

    /// Names of failing checks, critical or not.
    pub fn failing(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, result)| result.status.is_failure())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

pub struct Aggregator {
    policy: UnknownPolicy,
    latest: RwLock<Arc<AggregateStatus>>,
    recompute_lock: Mutex<()>,
}

impl Aggregator {
    pub fn new(policy: UnknownPolicy) -> Self {
        let empty = Self::compute(policy, &BTreeMap::new(), &BTreeMap::new());
        Self {
            policy,
            latest: RwLock::new(Arc::new(empty)),
            recompute_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> UnknownPolicy {
        self.policy
    }

    pub fn compute(
        policy: UnknownPolicy,
        severities: &BTreeMap<String, Severity>,
        results: &BTreeMap<String, CheckResult>,
    ) -> AggregateStatus {
        let mut overall = OverallStatus::Healthy;
        let mut checks = BTreeMap::new();

        for (name, severity) in severities {
            let result = results.get(name).cloned().unwrap_or_else(CheckResult::pending);

            if *severity == Severity::Critical {
                let fails_verdict = match result.status {
                    status if status.is_failure() => true,
                    CheckStatus::Pending => policy == UnknownPolicy::Unhealthy,
                    _ => false,
                };
                if fails_verdict {
                    overall = OverallStatus::Unhealthy;
                }
            }

            checks.insert(name.clone(), result);
        }

        AggregateStatus {
            overall,
            checks,
            severities: severities.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Rebuilds and publishes the aggregate. Serialized so a slower recompute can
    /// never publish over a newer one.
    pub fn recompute(&self, registry: &Registry, store: &ResultStore) -> Arc<AggregateStatus> {
        let _guard = self.recompute_lock.lock();
        let status = Arc::new(Self::compute(
            self.policy,
            &registry.severities(),
            &store.snapshot(),
        ));
        *self.latest.write() = status.clone();
        status
    }

    pub fn snapshot(&self) -> Arc<AggregateStatus> {
        self.latest.read().clone()
    }
}
