//! Sequential runner with reverse-order unwind.

use std::time::Duration;

use tracing::{error, instrument, warn};

use crate::error::{DomainError, DomainResult};
use crate::operations::ops::Operation;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Attempts per step, counting the first. Only lost optimistic writes
    /// are retried.
    pub max_attempts: u32,
    /// Base backoff between attempts, scaled linearly by attempt number.
    /// Must be non-zero so colliding writers fall out of lockstep.
    pub retry_backoff: Duration,
    /// Per-step timeout, applied to execute and undo alike.
    pub step_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            step_timeout: Duration::from_secs(10),
        }
    }
}

/// Executes operation sequences with compensation on failure.
///
/// Steps run strictly in order. When one fails, every step that committed
/// before it is undone in reverse order and the step's own error is returned.
/// A step that times out counts as failed, never as committed. Undo failures
/// are logged and skipped; an unwound sequence that could not fully unwind
/// leaves the graph for manual repair rather than masking the original error.
#[derive(Debug, Default)]
pub struct OperationRunner {
    config: RunnerConfig,
}

impl OperationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    #[instrument(skip(self, operations), fields(steps = operations.len()))]
    pub async fn run(&self, operations: Vec<Box<dyn Operation>>) -> DomainResult<()> {
        let mut committed: Vec<Box<dyn Operation>> = Vec::with_capacity(operations.len());
        for operation in operations {
            match self.execute_with_retry(operation.as_ref()).await {
                Ok(()) => committed.push(operation),
                Err(err) => {
                    warn!(
                        step = %operation.describe(),
                        error = %err,
                        committed = committed.len(),
                        "step failed, unwinding committed steps"
                    );
                    self.unwind(&committed).await;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn execute_with_retry(&self, operation: &dyn Operation) -> DomainResult<()> {
        let mut attempt: u32 = 1;
        loop {
            let result = match tokio::time::timeout(self.config.step_timeout, operation.execute())
                .await
            {
                Ok(result) => result,
                Err(_elapsed) => Err(DomainError::Timeout {
                    duration_ms: self.config.step_timeout.as_millis() as u64,
                }),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn unwind(&self, committed: &[Box<dyn Operation>]) {
        for operation in committed.iter().rev() {
            let result =
                match tokio::time::timeout(self.config.step_timeout, operation.undo()).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(DomainError::Timeout {
                        duration_ms: self.config.step_timeout.as_millis() as u64,
                    }),
                };
            if let Err(err) = result {
                error!(
                    step = %operation.describe(),
                    error = %err,
                    "undo failed, graph needs manual repair"
                );
            }
        }
    }
}
