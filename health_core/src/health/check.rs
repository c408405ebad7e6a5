//! The probe capability that the engine schedules.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A failed probe. The diagnostic payload survives into the recorded result.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct CheckError {
    pub message: String,
    pub details: Option<Value>,
}

impl CheckError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<anyhow::Error> for CheckError {
    fn from(err: anyhow::Error) -> Self {
        CheckError::new(err.to_string())
    }
}

impl From<std::io::Error> for CheckError {
    fn from(err: std::io::Error) -> Self {
        CheckError::new(err.to_string())
    }
}

pub type CheckOutcome = std::result::Result<Value, CheckError>;

/// Anything the engine can invoke repeatedly to learn whether a dependency is usable.
///
/// Implementations should watch `cancel` and return early once it fires. A check that
/// ignores it is still bounded by the configured timeout: the engine records a timed
/// out result and stops waiting for it.
#[async_trait::async_trait]
pub trait Check: Send + Sync {
    async fn execute(&self, cancel: CancellationToken) -> CheckOutcome;
}

#[async_trait::async_trait]
impl<T: Check + ?Sized> Check for Arc<T> {
    async fn execute(&self, cancel: CancellationToken) -> CheckOutcome {
        (**self).execute(cancel).await
    }
}

pub struct FnCheck<F> {
    check_fn: F,
}

#[async_trait::async_trait]
impl<F, Fut> Check for FnCheck<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = CheckOutcome> + Send + 'static,
{
    async fn execute(&self, cancel: CancellationToken) -> CheckOutcome {
        (self.check_fn)(cancel).await
    }
}

/// Wraps an async closure as a [`Check`].
pub fn check_fn<F, Fut>(check_fn: F) -> FnCheck<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = CheckOutcome> + Send + 'static,
{
    FnCheck { check_fn }
}
