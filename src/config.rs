use crate::core::{Result, StoreError};
use rand::Rng;
use std::time::Duration;

/// Bound and backoff for the `RETRY` conflict strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total compare-and-swap attempts, the first one included.
    pub max_attempts: usize,
    /// Base duration in milliseconds for backoff calculation.
    pub base_backoff_ms: u64,
    /// Maximum duration in milliseconds for backoff.
    pub max_backoff_ms: u64,
    /// Randomize each delay within `[backoff / 2, backoff]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 5,
            max_backoff_ms: 100,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Never sleeps between attempts.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter: false,
        }
    }

    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Exponential backoff before retry number `attempt` (1-based), capped.
    pub fn backoff(&self, attempt: usize) -> Duration {
        if self.base_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let base = self.base_backoff_ms;
        let cap = self.max_backoff_ms.max(base);

        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }

        if self.jitter && backoff > 1 {
            backoff = rand::thread_rng().gen_range(backoff / 2..=backoff);
        }
        Duration::from_millis(backoff)
    }
}

/// Record store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Version given to newly created records
    pub initial_version: u64,

    /// Bound for the `RETRY` strategy
    pub retry: RetryPolicy,

    /// Upper bound on any single storage round trip
    pub operation_timeout: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_version: 0,
            retry: RetryPolicy::default(),
            operation_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_version(mut self, version: u64) -> Self {
        self.initial_version = version;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.operation_timeout = None;
        self
    }

    /// Overrides defaults from `CRMSTORE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "CRMSTORE_INITIAL_VERSION")? {
            config.initial_version = v;
        }
        if let Some(v) = parse_var(&lookup, "CRMSTORE_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "CRMSTORE_RETRY_BASE_BACKOFF_MS")? {
            config.retry.base_backoff_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "CRMSTORE_RETRY_MAX_BACKOFF_MS")? {
            config.retry.max_backoff_ms = v;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CRMSTORE_OPERATION_TIMEOUT_MS")? {
            config.operation_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            StoreError::InvalidInput(format!("{}='{}' is invalid: {}", key, raw, e))
        }),
    }
}
