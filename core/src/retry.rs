// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Retry policies.
//!
//! Two policies guard two different failure classes and keep distinct call
//! site contracts:
//!
//! - [`TransientRetry`] is asynchronous and re-issues idempotent pipeline
//!   operations when the service reports a timeout.
//! - [`OptimisticRetry`] is synchronous and blocks the calling thread between
//!   attempts of a read-modify-write sequence that lost an entity tag race.

use std::future::Future;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use crate::{Error, OperationResult, Result};

/// Default bound for [`TransientRetry`].
pub const DEFAULT_TRANSIENT_ATTEMPTS: usize = 10;

/// TransientRetry re-executes an operation while it fails with a
/// server-reported timeout.
///
/// Any other failure is returned unchanged on the spot. Attempts follow each
/// other immediately.
#[derive(Debug, Clone, Copy)]
pub struct TransientRetry {
    max_attempts: usize,
}

impl Default for TransientRetry {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_TRANSIENT_ATTEMPTS,
        }
    }
}

impl TransientRetry {
    /// Create a policy allowing at most `max_attempts` executions.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `op` until it succeeds, fails with a non transient error, or the
    /// bound is reached.
    ///
    /// Exhaustion is reported as [`crate::ErrorKind::Timeout`] with the last
    /// transient failure as its source.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> OperationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OperationResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = op().await;
            if !result.error().is_some_and(Error::is_transient) {
                return result;
            }

            if attempt >= self.max_attempts {
                warn!(
                    "transient failure persisted after {attempt} attempts: {}",
                    result.error_message()
                );
                let mut err =
                    Error::timeout(format!("operation timed out after {attempt} attempts"))
                        .with_status(result.status());
                if let Err(source) = result.into_result() {
                    err = err.with_source(source);
                }
                return OperationResult::failure(err);
            }
            debug!(
                "transient failure on attempt {attempt}, retrying: {}",
                result.error_message()
            );
        }
    }
}

/// OptimisticRetry re-executes a read-modify-write unit of work after an
/// entity tag mismatch, sleeping for a randomized exponential backoff.
///
/// It blocks the calling thread and must only be used from synchronous call
/// sites.
#[derive(Debug, Clone, Copy)]
pub struct OptimisticRetry {
    retries: u32,
    min_backoff: Duration,
    max_backoff: Duration,
    delta_backoff: Duration,
}

impl Default for OptimisticRetry {
    fn default() -> Self {
        Self {
            retries: 3,
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            delta_backoff: Duration::from_millis(100),
        }
    }
}

impl OptimisticRetry {
    /// Create a policy.
    ///
    /// `max_backoff` is raised to `min_backoff` if it is smaller.
    pub fn new(
        retries: u32,
        min_backoff: Duration,
        max_backoff: Duration,
        delta_backoff: Duration,
    ) -> Self {
        Self {
            retries,
            min_backoff,
            max_backoff: max_backoff.max(min_backoff),
            delta_backoff,
        }
    }

    /// Run `op`, retrying only on [`crate::ErrorKind::PreconditionFailed`].
    ///
    /// After `retries` extra attempts the last error is returned unchanged.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut rng = rand::thread_rng();
        let mut attempt = 0;
        loop {
            match op() {
                Err(err) if err.is_precondition_failed() && attempt < self.retries => {
                    let backoff = self.compute_backoff(attempt, &mut rng);
                    debug!(
                        "precondition failed on attempt {}, retrying in {backoff:?}: {err}",
                        attempt + 1
                    );
                    thread::sleep(backoff);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Backoff before retry `attempt` (0-indexed):
    /// `clamp(random(0, 2^attempt) * delta + min, min, max)`.
    ///
    /// Arithmetic overflow lands on the upper bound.
    pub fn compute_backoff(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let Some(span) = 1u64.checked_shl(attempt) else {
            return self.max_backoff;
        };
        let backoff = u32::try_from(rng.gen_range(0..span))
            .ok()
            .and_then(|factor| self.delta_backoff.checked_mul(factor))
            .and_then(|v| v.checked_add(self.min_backoff))
            .unwrap_or(self.max_backoff);

        backoff.clamp(self.min_backoff, self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use http::StatusCode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use test_case::test_case;

    use super::*;
    use crate::ErrorKind;

    fn timed_out() -> OperationResult<()> {
        OperationResult::failure(
            Error::protocol(StatusCode::INTERNAL_SERVER_ERROR, "Operation timed out")
                .with_code("OperationTimedOut"),
        )
    }

    #[tokio::test]
    async fn test_transient_retry_until_success() {
        let calls = Cell::new(0);
        let result = TransientRetry::default()
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        timed_out()
                    } else {
                        OperationResult::success(StatusCode::ACCEPTED, ())
                    }
                }
            })
            .await;

        assert!(result.is_success());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_transient_retry_exhausted() {
        let calls = Cell::new(0);
        let result = TransientRetry::new(4)
            .run(|| {
                calls.set(calls.get() + 1);
                async { timed_out() }
            })
            .await;

        assert_eq!(calls.get(), 4);
        let err = result.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_transient_retry_ignores_other_failures() {
        let calls = Cell::new(0);
        let result = TransientRetry::default()
            .run(|| {
                calls.set(calls.get() + 1);
                async {
                    OperationResult::<()>::failure(Error::protocol(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "disk on fire",
                    ))
                }
            })
            .await;

        assert_eq!(calls.get(), 1);
        assert_eq!(result.error().unwrap().kind(), ErrorKind::Protocol);
        assert_eq!(result.error_message(), "disk on fire");
    }

    fn policy() -> OptimisticRetry {
        OptimisticRetry::new(
            4,
            Duration::from_millis(1),
            Duration::from_millis(5),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn test_optimistic_retry_until_success() {
        let calls = Cell::new(0);
        let result = policy().run(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Error::precondition_failed("etag mismatch"))
            } else {
                Ok("updated")
            }
        });

        assert_eq!(result.unwrap(), "updated");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_optimistic_retry_reraises_original_error() {
        let calls = Cell::new(0);
        let result: Result<()> = policy().run(|| {
            calls.set(calls.get() + 1);
            Err(Error::precondition_failed(format!("etag mismatch #{}", calls.get())))
        });

        // One initial attempt plus four retries.
        assert_eq!(calls.get(), 5);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(err.status(), Some(StatusCode::PRECONDITION_FAILED));
        assert_eq!(err.message(), "etag mismatch #5");
    }

    #[test]
    fn test_optimistic_retry_never_retries_other_errors() {
        let calls = Cell::new(0);
        let result: Result<()> = policy().run(|| {
            calls.set(calls.get() + 1);
            Err(Error::protocol(StatusCode::CONFLICT, "entity already exists"))
        });

        assert_eq!(calls.get(), 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Protocol);
    }

    #[test_case(0; "first attempt")]
    #[test_case(1; "second attempt")]
    #[test_case(5; "sixth attempt")]
    #[test_case(40; "large attempt")]
    #[test_case(63; "widest shift")]
    #[test_case(64; "shift overflow")]
    #[test_case(u32::MAX; "max attempt")]
    fn test_backoff_is_bounded(attempt: u32) {
        let p = OptimisticRetry::new(
            10,
            Duration::from_millis(200),
            Duration::from_secs(10),
            Duration::from_millis(150),
        );
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..256 {
            let backoff = p.compute_backoff(attempt, &mut rng);
            assert!(backoff >= Duration::from_millis(200), "{backoff:?}");
            assert!(backoff <= Duration::from_secs(10), "{backoff:?}");
        }
    }

    #[test]
    fn test_first_backoff_is_minimum() {
        // random(0, 1) is always 0, so the first retry waits exactly min.
        let p = policy();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(p.compute_backoff(0, &mut rng), Duration::from_millis(1));
    }

    #[test]
    fn test_backoff_grows_in_expectation() {
        let p = OptimisticRetry::new(
            10,
            Duration::from_millis(10),
            Duration::from_secs(3600),
            Duration::from_millis(10),
        );
        let mut rng = StdRng::seed_from_u64(1);
        let mean = |attempt: u32, rng: &mut StdRng| -> u128 {
            (0..512)
                .map(|_| p.compute_backoff(attempt, rng).as_millis())
                .sum::<u128>()
                / 512
        };

        let mut previous = 0;
        for attempt in 0..8 {
            let m = mean(attempt, &mut rng);
            assert!(m >= previous, "attempt {attempt}: {m} < {previous}");
            previous = m;
        }
    }

    #[test]
    fn test_sub_millisecond_delta() {
        let p = OptimisticRetry::new(
            10,
            Duration::ZERO,
            Duration::from_secs(10),
            Duration::from_micros(500),
        );
        let mut rng = StdRng::seed_from_u64(9);
        let samples: Vec<Duration> = (0..256).map(|_| p.compute_backoff(8, &mut rng)).collect();

        let max = samples.iter().max().copied().unwrap_or_default();
        assert!(max > Duration::from_millis(10), "{max:?}");
        assert!(max <= Duration::from_micros(500 * 255), "{max:?}");
        assert!(samples
            .iter()
            .all(|d| d.as_nanos() % Duration::from_micros(500).as_nanos() == 0));
    }

    #[test]
    fn test_max_is_raised_to_min() {
        let p = OptimisticRetry::new(
            1,
            Duration::from_secs(2),
            Duration::from_secs(1),
            Duration::from_millis(1),
        );
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(p.compute_backoff(10, &mut rng), Duration::from_secs(2));
    }
}
