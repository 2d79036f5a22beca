// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded retries with linear backoff.
//!
//! Each delivery attempt reports a [`RetryOutcome`]. Counted failures sleep
//! `attempts * backoff_unit` before the next try and give up after
//! `max_retries` attempts. Immediate retries (stale sequence token) are not
//! counted and do not sleep, but at most `max_retries` of them may happen in a
//! row; past that they are counted like any other failure.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::constants::{BACKOFF_UNIT, MAX_RETRIES};
use crate::errors::DeliveryError;

/// Classified result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Success,
    /// Try again right away without spending the retry budget. After
    /// `max_retries` of these in a row, the next one is counted like `Retry`.
    RetryImmediate(DeliveryError),
    /// Back off, then try again; counts against the budget.
    Retry(DeliveryError),
    /// Stop now.
    Fatal(DeliveryError),
}

/// One retryable operation.
#[async_trait]
pub trait Attempt: Send {
    async fn attempt(&mut self) -> RetryOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES, BACKOFF_UNIT)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            max_retries,
            backoff_unit,
        }
    }

    /// Delay after the `attempts`-th counted failure.
    pub fn backoff(&self, attempts: u32) -> Duration {
        self.backoff_unit * attempts
    }

    /// Drives `op` until it succeeds, fails fatally, or exhausts the budget.
    ///
    /// Returns the last error on failure.
    pub async fn run<A>(&self, op: &mut A) -> Result<(), DeliveryError>
    where
        A: Attempt + ?Sized,
    {
        let mut attempts: u32 = 0;
        let mut immediate: u32 = 0;

        loop {
            match op.attempt().await {
                RetryOutcome::Success => return Ok(()),
                RetryOutcome::Fatal(err) => return Err(err),
                RetryOutcome::RetryImmediate(err) if immediate < self.max_retries => {
                    immediate += 1;
                    debug!("CWLOG | Retrying immediately: {err}");
                }
                RetryOutcome::RetryImmediate(err) | RetryOutcome::Retry(err) => {
                    immediate = 0;
                    attempts += 1;
                    if attempts >= self.max_retries {
                        return Err(err);
                    }

                    let delay = self.backoff(attempts);
                    warn!(
                        "CWLOG | Attempt {attempts}/{} failed, retrying in {} ms: {err}",
                        self.max_retries,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    struct Scripted {
        outcomes: VecDeque<RetryOutcome>,
        calls: usize,
        called_at: Vec<Instant>,
    }

    impl Scripted {
        fn new(outcomes: Vec<RetryOutcome>) -> Self {
            Self {
                outcomes: outcomes.into(),
                calls: 0,
                called_at: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Attempt for Scripted {
        async fn attempt(&mut self) -> RetryOutcome {
            self.calls += 1;
            self.called_at.push(Instant::now());
            self.outcomes
                .pop_front()
                .unwrap_or_else(|| RetryOutcome::Retry(transient()))
        }
    }

    fn transient() -> DeliveryError {
        DeliveryError::Other("service unavailable".to_string())
    }

    fn stale() -> DeliveryError {
        DeliveryError::InvalidSequenceToken {
            expected_sequence_token: Some("42".to_string()),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(100))
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let mut op = Scripted::new(vec![RetryOutcome::Success]);
        assert_eq!(policy().run(&mut op).await, Ok(()));
        assert_eq!(op.calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget_with_increasing_backoff() {
        let mut op = Scripted::new(vec![]);
        let result = policy().run(&mut op).await;

        assert_eq!(result, Err(transient()));
        assert_eq!(op.calls, 5);

        let gaps: Vec<Duration> = op
            .called_at
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect();
        let expected_ms = [100, 200, 300, 400];
        for (gap, expected) in gaps.iter().zip(expected_ms) {
            assert!(*gap >= Duration::from_millis(expected));
            assert!(*gap < Duration::from_millis(expected + 50));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_retry_is_free() {
        let mut op = Scripted::new(vec![RetryOutcome::RetryImmediate(stale()), RetryOutcome::Success]);
        let start = Instant::now();

        assert_eq!(policy().run(&mut op).await, Ok(()));
        assert_eq!(op.calls, 2);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_retries_do_not_spend_budget() {
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(RetryOutcome::Retry(transient()));
            outcomes.push(RetryOutcome::RetryImmediate(stale()));
        }
        outcomes.push(RetryOutcome::Success);
        let mut op = Scripted::new(outcomes);

        assert_eq!(policy().run(&mut op).await, Ok(()));
        assert_eq!(op.calls, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endless_stale_tokens_eventually_fail() {
        let mut op = Scripted::new(vec![RetryOutcome::RetryImmediate(stale()); 100]);
        let result = policy().run(&mut op).await;

        assert_eq!(result, Err(stale()));
        // Each counted failure is preceded by a run of five free retries.
        assert_eq!(op.calls, 5 * 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_stops_immediately() {
        let rejected = DeliveryError::Rejected("bad request".to_string());
        let mut op = Scripted::new(vec![
            RetryOutcome::Retry(transient()),
            RetryOutcome::Fatal(rejected.clone()),
            RetryOutcome::Success,
        ]);

        assert_eq!(policy().run(&mut op).await, Err(rejected));
        assert_eq!(op.calls, 2);
    }
}
