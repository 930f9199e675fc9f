//! Counters describing what the engine has done.

use serde::Serialize;

/// Statistics about fetch and publish work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Fetches started with a new remote call.
    pub fetches_started: u64,
    /// Fetch requests that joined a fetch already in flight.
    pub fetches_joined: u64,
    /// Resolver calls made, across all fetches.
    pub fetch_attempts: u64,
    /// Fetches that stored an identifier.
    pub fetches_resolved: u64,
    /// Fetches that gave up.
    pub fetches_failed: u64,
    /// Publish jobs scheduled.
    pub publish_jobs: u64,
    /// Publish attempts made, across all jobs.
    pub publish_attempts: u64,
    /// Publish jobs that succeeded.
    pub publish_succeeded: u64,
    /// Publish jobs that failed permanently.
    pub publish_failed: u64,
    /// Retries of either kind.
    pub retries: u64,
}
