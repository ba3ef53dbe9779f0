//! Pre-check runner
//!
//! Runs named checks against a server one after the other. A check either
//! passes, fails (tallied, the run continues) or errors (the run stops and
//! returns that error).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::core::server::ServerDetails;
use crate::error::BridgeError;

/// Progress sink: `(done, total)` for the check currently running
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// What every check receives
#[derive(Clone)]
pub struct RunArguments {
    pub cancel: CancellationToken,
    pub server: ServerDetails,
    pub progress: Option<ProgressFn>,
}

/// A check on an Artifactory server
#[async_trait]
pub trait PreCheck: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(true)` when the check passed
    async fn execute(&self, args: &RunArguments) -> Result<bool, BridgeError>;
}

pub type CheckFn = Arc<dyn Fn(RunArguments) -> BoxFuture<'static, Result<bool, BridgeError>> + Send + Sync>;

/// A check backed by a closure
pub struct FunctionCheck {
    name: String,
    check: CheckFn,
}

impl FunctionCheck {
    pub fn new(name: impl Into<String>, check: CheckFn) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

#[async_trait]
impl PreCheck for FunctionCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, args: &RunArguments) -> Result<bool, BridgeError> {
        (self.check)(args.clone()).await
    }
}

/// Tally of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatus {
    pub successes: usize,
    pub failures: usize,
    pub current_check: String,
}

#[derive(Default)]
pub struct PreCheckRunner {
    checks: Vec<Box<dyn PreCheck>>,
    status: RunStatus,
}

impl PreCheckRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_check(&mut self, check: Box<dyn PreCheck>) {
        self.checks.push(check);
    }

    pub fn add_fn(&mut self, name: impl Into<String>, check: CheckFn) {
        self.add_check(Box::new(FunctionCheck::new(name, check)));
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Run every check in registration order, stopping at the first error
    pub async fn run(&mut self, args: &RunArguments) -> Result<(), BridgeError> {
        info!("Running {} checks.", self.checks.len());
        self.status = RunStatus::default();
        let start = Instant::now();

        let result = self.run_checks(args).await;

        let done = self.status.successes + self.status.failures;
        if result.is_ok() && self.status.failures == 0 && done == self.checks.len() {
            info!("All the checks passed (elapsed time {:.1?}).", start.elapsed());
        } else {
            error!(
                "{}/{} checks passed (elapsed time {:.1?}), check the log for more information.",
                self.status.successes,
                done,
                start.elapsed()
            );
        }
        result
    }

    async fn run_checks(&mut self, args: &RunArguments) -> Result<(), BridgeError> {
        for (index, check) in self.checks.iter().enumerate() {
            if args.cancel.is_cancelled() {
                return Err(BridgeError::Canceled);
            }
            info!("== Running check ({}) '{}' ======", index + 1, check.name());
            self.status.current_check = check.name().to_string();

            let passed = match check.execute(args).await {
                Ok(passed) => passed,
                Err(e) => {
                    self.status.failures += 1;
                    info!("Check '{}' is done with status Fail", check.name());
                    return Err(e);
                }
            };
            if passed {
                self.status.successes += 1;
            } else {
                self.status.failures += 1;
            }
            info!(
                "Check '{}' is done with status {}",
                check.name(),
                if passed { "Success" } else { "Fail" }
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn args() -> RunArguments {
        RunArguments {
            cancel: CancellationToken::new(),
            server: ServerDetails::new("https://rt.example.com"),
            progress: None,
        }
    }

    fn fixed(result: bool) -> CheckFn {
        Arc::new(move |_: RunArguments| -> BoxFuture<'static, Result<bool, BridgeError>> {
            async move { Ok(result) }.boxed()
        })
    }

    // ============ Unit Tests - Tally ============

    #[tokio::test]
    async fn test_successes_and_failures_tallied() {
        let mut runner = PreCheckRunner::new();
        for i in 0..3 {
            runner.add_fn(format!("success {i}"), fixed(true));
        }
        runner.add_fn("fail 1", fixed(false));
        runner.add_fn("fail 2", fixed(false));

        runner.run(&args()).await.unwrap();
        assert_eq!(runner.status().successes, 3);
        assert_eq!(runner.status().failures, 2);
    }

    #[tokio::test]
    async fn test_error_stops_run() {
        let mut runner = PreCheckRunner::new();
        for i in 0..3 {
            runner.add_fn(format!("success {i}"), fixed(true));
        }
        runner.add_fn("fail 1", fixed(false));
        runner.add_fn("fail 2", fixed(false));
        runner.add_fn(
            "broken",
            Arc::new(|_: RunArguments| -> BoxFuture<'static, Result<bool, BridgeError>> {
                async { Err(BridgeError::RemoteUnavailable("down".to_string())) }.boxed()
            }),
        );
        runner.add_fn("never", fixed(true));

        let err = runner.run(&args()).await.unwrap_err();
        assert!(matches!(err, BridgeError::RemoteUnavailable(_)));
        assert_eq!(runner.status().successes, 3);
        // two failed checks plus the erroring one
        assert_eq!(runner.status().failures, 3);
        assert_eq!(runner.status().current_check, "broken");
    }

    #[tokio::test]
    async fn test_canceled_before_first_check() {
        let mut runner = PreCheckRunner::new();
        runner.add_fn("any", fixed(true));
        let args = args();
        args.cancel.cancel();
        assert!(matches!(runner.run(&args).await.unwrap_err(), BridgeError::Canceled));
        assert_eq!(runner.status().successes, 0);
    }
}
