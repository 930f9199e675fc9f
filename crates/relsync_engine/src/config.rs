//! Configuration for the synchronization engine.

use std::time::Duration;

/// Configuration for synchronization operations.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Retry policy for identifier fetches.
    pub fetch_retry: RetryConfig,
    /// Retry policy for registry publish jobs.
    pub publish_retry: RetryConfig,
    /// Pause between a finished fetch and re-reading the identifier.
    pub identifier_settle_delay: Duration,
    /// Upper bound for every remote call.
    pub remote_timeout: Duration,
    /// Maximum number of remote calls in flight at once.
    pub max_workers: usize,
    /// How often an identifier write is repeated after losing a version race.
    pub store_conflict_retries: u32,
}

impl SyncEngineConfig {
    /// Creates a configuration with the default policies.
    pub fn new() -> Self {
        Self {
            fetch_retry: RetryConfig::fixed(4, Duration::from_millis(300)),
            publish_retry: RetryConfig::fixed(4, Duration::from_millis(2000)),
            identifier_settle_delay: Duration::from_millis(500),
            remote_timeout: Duration::from_secs(30),
            max_workers: 8,
            store_conflict_retries: 5,
        }
    }

    /// Sets the fetch retry policy.
    pub fn with_fetch_retry(mut self, retry: RetryConfig) -> Self {
        self.fetch_retry = retry;
        self
    }

    /// Sets the publish retry policy.
    pub fn with_publish_retry(mut self, retry: RetryConfig) -> Self {
        self.publish_retry = retry;
        self
    }

    /// Sets the settle delay after a fetch wait.
    pub fn with_identifier_settle_delay(mut self, delay: Duration) -> Self {
        self.identifier_settle_delay = delay;
        self
    }

    /// Sets the remote call timeout.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Sets the worker bound. Zero is raised to one.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Sets how often a conflicting identifier write is repeated.
    pub fn with_store_conflict_retries(mut self, retries: u32) -> Self {
        self.store_conflict_retries = retries;
        self
    }
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied per retry; 1.0 keeps the delay fixed.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a fixed-delay policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Creates a policy with a single attempt.
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Number of retries after the first attempt.
    pub fn retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let mut delay = self.initial_delay;
        if attempt > 1 && self.backoff_multiplier != 1.0 {
            let factor = self.backoff_multiplier.powi((attempt - 1) as i32);
            delay = Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
                .unwrap_or(Duration::MAX);
        }
        delay.min(self.max_delay.max(self.initial_delay))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(4, Duration::from_millis(300))
    }
}
