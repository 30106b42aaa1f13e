use std::time::Duration;

use crate::{Error, Result};

const MAX_CANCEL_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_FETCH_TIMEOUT: Duration = Duration::from_millis(2);

/// How the poll loop spends its share of an invocation.
///
/// There is no `Default`: the right numbers depend on the host platform's
/// outbound-call and wall-clock limits. Use [`PollingConfig::check_budget`]
/// to verify a choice against an [`InvocationBudget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    interval: Duration,
    max_attempts: u32,
    fetch_timeout: Duration,
    cancel_timeout: Duration,
    rate_limit_allowance: u32,
}

impl PollingConfig {
    /// `cancel_timeout` starts at `min(fetch_timeout / 2, 5s)` and the rate-limit
    /// allowance at `max_attempts`.
    pub fn new(interval: Duration, max_attempts: u32, fetch_timeout: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts must be at least 1".into()));
        }
        if fetch_timeout < MIN_FETCH_TIMEOUT {
            return Err(Error::InvalidConfig(format!(
                "fetch_timeout must be at least {MIN_FETCH_TIMEOUT:?}, got {fetch_timeout:?}"
            )));
        }
        Ok(Self {
            interval,
            max_attempts,
            fetch_timeout,
            cancel_timeout: (fetch_timeout / 2).min(MAX_CANCEL_TIMEOUT),
            rate_limit_allowance: max_attempts,
        })
    }

    /// Convenience constructor taking milliseconds.
    pub fn from_millis(interval_ms: u64, max_attempts: u32, fetch_timeout_ms: u64) -> Result<Self> {
        Self::new(
            Duration::from_millis(interval_ms),
            max_attempts,
            Duration::from_millis(fetch_timeout_ms),
        )
    }

    /// Must be strictly shorter than `fetch_timeout`.
    pub fn with_cancel_timeout(mut self, cancel_timeout: Duration) -> Result<Self> {
        if cancel_timeout.is_zero() || cancel_timeout >= self.fetch_timeout {
            return Err(Error::InvalidConfig(format!(
                "cancel_timeout must be in (0, {:?}), got {:?}",
                self.fetch_timeout, cancel_timeout
            )));
        }
        self.cancel_timeout = cancel_timeout;
        Ok(self)
    }

    /// How many 429 answers the poll loop tolerates. They do not consume attempts,
    /// but each one is still an outbound call.
    pub fn with_rate_limit_allowance(mut self, allowance: u32) -> Self {
        self.rate_limit_allowance = allowance;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn cancel_timeout(&self) -> Duration {
        self.cancel_timeout
    }

    pub fn rate_limit_allowance(&self) -> u32 {
        self.rate_limit_allowance
    }

    pub(crate) fn rate_limit_delay(&self) -> Duration {
        self.interval.saturating_mul(2)
    }

    /// Worst-case outbound calls made by polling plus the reserved cancel call.
    pub fn worst_case_calls(&self) -> u64 {
        u64::from(self.max_attempts) + u64::from(self.rate_limit_allowance) + 1
    }

    /// Worst-case wall-clock time of polling plus the cancel call.
    ///
    /// Every call is assumed to run into its timeout and every sleep to run in full.
    pub fn worst_case_duration(&self) -> Duration {
        let attempt = self.fetch_timeout.saturating_add(self.interval);
        let rate_limited = self.fetch_timeout.saturating_add(self.rate_limit_delay());
        attempt
            .saturating_mul(self.max_attempts)
            .saturating_add(rate_limited.saturating_mul(self.rate_limit_allowance))
            .saturating_add(self.cancel_timeout)
    }

    /// Check that `already_spent + polling + cancellation` fits in `budget`.
    pub fn check_budget(&self, budget: &InvocationBudget, already_spent: &BudgetUsage) -> Result<()> {
        let calls = u64::from(already_spent.calls) + self.worst_case_calls();
        if calls > u64::from(budget.max_outbound_calls) {
            return Err(Error::BudgetExceeded(format!(
                "up to {calls} outbound calls ({} spent, {} polls, {} rate-limit retries, 1 cancel) but the limit is {}",
                already_spent.calls,
                self.max_attempts,
                self.rate_limit_allowance,
                budget.max_outbound_calls
            )));
        }

        let duration = already_spent.elapsed.saturating_add(self.worst_case_duration());
        if duration > budget.wall_clock {
            return Err(Error::BudgetExceeded(format!(
                "up to {duration:?} of wall-clock time but the limit is {:?}",
                budget.wall_clock
            )));
        }
        Ok(())
    }
}

/// Hard limits the host platform puts on one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationBudget {
    pub max_outbound_calls: u32,
    pub wall_clock: Duration,
}

impl InvocationBudget {
    pub fn new(max_outbound_calls: u32, wall_clock: Duration) -> Self {
        Self {
            max_outbound_calls,
            wall_clock,
        }
    }
}

/// Calls and time consumed before polling starts (submission, warehouse resume, caller work).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetUsage {
    pub calls: u32,
    pub elapsed: Duration,
}

impl BudgetUsage {
    pub fn new(calls: u32, elapsed: Duration) -> Self {
        Self { calls, elapsed }
    }

    /// Account for one more outbound call bounded by `timeout`.
    pub fn plus_call(self, timeout: Duration) -> Self {
        Self {
            calls: self.calls.saturating_add(1),
            elapsed: self.elapsed.saturating_add(timeout),
        }
    }
}
