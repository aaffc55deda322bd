//! Reconciliation loop primitives.
//!
//! The controller drives the agent from its observed state toward the
//! operator's desired state. Key concepts:
//!
//! - **Observed state**: what the agent reports on `/status`.
//! - **Desired state**: what the operator asked for (installed or destroyed).
//! - **Convergence**: submitting directives until observed matches desired.
//!
//! # Invariants
//!
//! - A loop issues at most `max_attempts` steps and always terminates
//! - Backoff is a fixed delay between attempts, no jitter, no growth
//! - Only an explicit [`Step::Done`] ends the loop successfully

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Reconciliation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError<E> {
    /// Every attempt in the budget was used without converging.
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// A step reported a failure that retrying cannot fix.
    #[error(transparent)]
    Aborted(E),
}

/// Position of one attempt within a bounded loop (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub max: u32,
}

impl Attempt {
    /// Returns true if no attempts remain after this one.
    pub fn is_last(&self) -> bool {
        self.number >= self.max
    }
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.number, self.max)
    }
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Step<T, E> {
    /// Converged; stop with this value.
    Done(T),

    /// Not yet; wait the fixed delay and try again.
    Retry,

    /// Stop now with a terminal failure.
    Abort(E),
}

/// Fixed-delay bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least 1).
    pub max_attempts: u32,

    /// Delay between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a new policy. A zero attempt budget is raised to one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `step` until it returns `Done` or `Abort`, or the budget runs out.
    ///
    /// The delay is applied between attempts only, never after the last one.
    pub async fn run<T, E, F, Fut>(&self, mut step: F) -> Result<T, ReconcileError<E>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Step<T, E>>,
    {
        let max = self.max_attempts.max(1);

        for number in 1..=max {
            let attempt = Attempt { number, max };

            match step(attempt).await {
                Step::Done(value) => return Ok(value),
                Step::Abort(err) => return Err(ReconcileError::Aborted(err)),
                Step::Retry => {
                    if attempt.is_last() {
                        break;
                    }
                    debug!(
                        attempt = number,
                        max_attempts = max,
                        delay_secs = self.delay.as_secs(),
                        "Attempt did not converge, waiting before retry"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }

        Err(ReconcileError::Exhausted { attempts: max })
    }
}

/// Attempts the install flow makes against the agent.
pub const DEFAULT_INSTALL_ATTEMPTS: u32 = 10;

/// Delay between install-flow status probes.
pub const DEFAULT_INSTALL_DELAY: Duration = Duration::from_secs(10);

/// Attempts the destroy flow makes while waiting for the cluster to go away.
pub const DEFAULT_DESTROY_ATTEMPTS: u32 = 10;

/// Delay between destroy-flow status probes.
pub const DEFAULT_DESTROY_DELAY: Duration = Duration::from_secs(2 * 60);

/// Warm-up after provisioning before the registry and agent are expected up.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(5 * 60);
