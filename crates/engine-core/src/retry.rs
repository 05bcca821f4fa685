use crate::{
    classify::ErrorClassifier,
    error::OperationError,
    operation::{DataOperation, Operation},
};
use async_trait::async_trait;
use connectors::connection::Connection;
use rand::Rng;
use std::{fmt::Display, future::Future, ops::RangeInclusive, time::Duration};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    /// Uniform random extra wait added to every delay.
    pub jitter: RangeInclusive<Duration>,
    /// Upper bound for the exponential part of the delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: Duration::from_millis(100)..=Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    /// Preset tuned for database/network calls (higher delay, more attempts).
    pub fn for_database() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            ..Self::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: RangeInclusive<Duration>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn without_jitter(self) -> Self {
        self.with_jitter(Duration::ZERO..=Duration::ZERO)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Wait before attempt `attempt + 1`, where `attempt` counts from 0:
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`, plus jitter.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let backoff = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = backoff.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let low = self.jitter.start().as_millis() as u64;
        let high = self.jitter.end().as_millis() as u64;
        if high <= low {
            return Duration::from_millis(low);
        }
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    /// Decides what happens after attempt `attempt` (0-based) failed with
    /// `err`: `Some(delay)` to wait and try again, `None` to give up.
    fn next_delay<E: Display>(
        &self,
        operation: &str,
        attempt: usize,
        err: &E,
        disposition: RetryDisposition,
    ) -> Option<Duration> {
        let attempt_no = attempt + 1;
        match disposition {
            RetryDisposition::Stop => {
                warn!(operation, attempt = attempt_no, error = %err, "Non-retryable error");
                None
            }
            RetryDisposition::Retry if attempt_no >= self.max_attempts => {
                warn!(
                    operation,
                    attempts = attempt_no,
                    error = %err,
                    "Retry attempts exhausted"
                );
                None
            }
            RetryDisposition::Retry => {
                let delay = self.delay_for(attempt);
                info!(
                    operation,
                    attempt = attempt_no,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                Some(delay)
            }
        }
    }

    /// Executes the operation with the configured retry policy. The last
    /// error is returned as is once the policy gives up.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        operation: &str,
        mut op: F,
        classify: Classifier,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(operation, attempt = attempt + 1, "Succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => match self.next_delay(operation, attempt, &err, classify(&err)) {
                    Some(delay) => {
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

/// Re-runs the inner operation while its failures classify as transient.
pub struct WithRetry<Op> {
    inner: Op,
    policy: RetryPolicy,
    classifier: ErrorClassifier,
}

impl<Op> WithRetry<Op> {
    pub fn new(inner: Op, policy: RetryPolicy, classifier: ErrorClassifier) -> Self {
        Self {
            inner,
            policy,
            classifier,
        }
    }

    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }
}

#[async_trait]
impl<Op: Operation> Operation for WithRetry<Op> {
    type Args = Op::Args;
    type Output = Op::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn call(&self, args: &Self::Args) -> Result<Self::Output, OperationError> {
        self.policy
            .run(
                self.inner.name(),
                || self.inner.call(args),
                |err| self.classifier.classify(err),
            )
            .await
    }
}

#[async_trait]
impl<Op: DataOperation> DataOperation for WithRetry<Op> {
    type Args = Op::Args;
    type Output = Op::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    // Attempts share the caller's connection, so the loop is spelled out
    // instead of going through `RetryPolicy::run`.
    async fn run(
        &self,
        conn: &mut dyn Connection,
        args: &Self::Args,
    ) -> Result<Self::Output, OperationError> {
        let operation = self.inner.name();
        let mut attempt = 0;

        loop {
            match self.inner.run(&mut *conn, args).await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(operation, attempt = attempt + 1, "Succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    let disposition = self.classifier.classify(&err);
                    match self.policy.next_delay(operation, attempt, &err, disposition) {
                        Some(delay) => {
                            debug!(operation, "Reusing connection for next attempt");
                            sleep(delay).await;
                            attempt += 1;
                        }
                        None => return Err(err),
                    }
                }
            }
        }
    }
}
