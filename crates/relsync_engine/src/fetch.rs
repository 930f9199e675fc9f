//! Deduplicated identifier fetches.
//!
//! At most one fetch per relationship is in flight at any time. Callers that
//! ask while a fetch is running join it and observe the same outcome.
//!
//! Membership in the in-flight map and completion signaling are separate:
//! the map only answers "is a fetch running for this key", while every
//! [`FetchHandle`] carries its own completion channel. The fetch task leaves
//! the map before it broadcasts its outcome, and does so exactly once, even
//! if the task is dropped or panics.

use crate::config::{RetryConfig, SyncEngineConfig};
use crate::error::{SyncError, SyncResult};
use crate::pool::WorkerPool;
use crate::remote::{with_timeout, IdentifierResolver};
use crate::stats::EngineStats;
use parking_lot::{Mutex, RwLock};
use relsync_core::{is_well_formed_identifier, RelationKey, RelationStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

type Outcome = Option<SyncResult<String>>;

/// Completion handle of an identifier fetch.
#[derive(Debug, Clone)]
pub struct FetchHandle {
    key: RelationKey,
    fetch_id: u64,
    joined: bool,
    outcome: watch::Receiver<Outcome>,
}

impl FetchHandle {
    /// The relationship being resolved.
    pub fn key(&self) -> &RelationKey {
        &self.key
    }

    /// Identifies the fetch; joined handles share the id of the fetch they joined.
    pub fn fetch_id(&self) -> u64 {
        self.fetch_id
    }

    /// Returns true if this handle joined a fetch that was already running.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Returns the outcome if the fetch has finished.
    pub fn try_outcome(&self) -> Option<SyncResult<String>> {
        (*self.outcome.borrow()).clone()
    }

    /// Suspends until the fetch finishes and returns the stored identifier.
    pub async fn wait(&self) -> SyncResult<String> {
        let mut outcome = self.outcome.clone();
        let finished = match outcome.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        finished.unwrap_or_else(|| {
            Err(SyncError::FetchAborted {
                key: self.key.clone(),
            })
        })
    }
}

type InFlight = Arc<Mutex<HashMap<RelationKey, FetchHandle>>>;

/// Removes a fetch from the in-flight map when dropped.
struct InFlightGuard {
    in_flight: InFlight,
    key: RelationKey,
    fetch_id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&self.key)
            .is_some_and(|handle| handle.fetch_id == self.fetch_id)
        {
            in_flight.remove(&self.key);
        }
    }
}

struct FetchShared<S, R> {
    store: Arc<S>,
    resolver: R,
    pool: WorkerPool,
    retry: RetryConfig,
    remote_timeout: Duration,
    conflict_retries: u32,
    in_flight: InFlight,
    next_fetch_id: AtomicU64,
    stats: Arc<RwLock<EngineStats>>,
}

/// Starts identifier fetches and lets any number of callers wait for them.
pub struct FetchCoordinator<S, R> {
    shared: Arc<FetchShared<S, R>>,
}

impl<S, R> Clone for FetchCoordinator<S, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, R> FetchCoordinator<S, R>
where
    S: RelationStore + 'static,
    R: IdentifierResolver + 'static,
{
    /// Creates a coordinator.
    pub fn new(
        config: &SyncEngineConfig,
        store: Arc<S>,
        resolver: R,
        pool: WorkerPool,
        stats: Arc<RwLock<EngineStats>>,
    ) -> Self {
        Self {
            shared: Arc::new(FetchShared {
                store,
                resolver,
                pool,
                retry: config.fetch_retry.clone(),
                remote_timeout: config.remote_timeout,
                conflict_retries: config.store_conflict_retries,
                in_flight: Arc::new(Mutex::new(HashMap::new())),
                next_fetch_id: AtomicU64::new(1),
                stats,
            }),
        }
    }

    /// Returns a handle on the fetch for `key`, starting one if none is running.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the relationship does not exist.
    pub fn ensure_fetch(&self, key: &RelationKey) -> SyncResult<FetchHandle> {
        self.shared.store.find(key)?;

        let mut in_flight = self.shared.in_flight.lock();
        if let Some(running) = in_flight.get(key) {
            let mut handle = running.clone();
            handle.joined = true;
            drop(in_flight);
            self.shared.stats.write().fetches_joined += 1;
            debug!(key = %key, fetch = handle.fetch_id, "joining identifier fetch in flight");
            return Ok(handle);
        }

        let fetch_id = self.shared.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(None);
        let handle = FetchHandle {
            key: key.clone(),
            fetch_id,
            joined: false,
            outcome: receiver,
        };
        in_flight.insert(key.clone(), handle.clone());
        drop(in_flight);

        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.shared.in_flight),
            key: key.clone(),
            fetch_id,
        };
        self.shared.stats.write().fetches_started += 1;
        info!(
            material = %key.material_id,
            partner = %key.partner_id,
            fetch = fetch_id,
            "starting identifier fetch"
        );

        let shared = Arc::clone(&self.shared);
        let key = key.clone();
        self.shared.pool.spawn(async move {
            let outcome = shared.fetch_with_retry(&key).await;
            shared.record(&key, &outcome);
            drop(guard);
            sender.send_replace(Some(outcome));
        });

        Ok(handle)
    }

    /// Returns true if a fetch for `key` is running.
    pub fn is_in_flight(&self, key: &RelationKey) -> bool {
        self.shared.in_flight.lock().contains_key(key)
    }

    /// Returns the number of fetches running.
    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    /// Returns the resolver.
    pub fn resolver(&self) -> &R {
        &self.shared.resolver
    }
}

impl<S, R> FetchShared<S, R>
where
    S: RelationStore,
    R: IdentifierResolver,
{
    async fn fetch_with_retry(&self, key: &RelationKey) -> SyncResult<String> {
        let mut last_error = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                self.stats.write().retries += 1;
                tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
            }

            let relationship = self.store.find(key)?;
            if let Some(existing) = relationship.identifier() {
                debug!(key = %key, "identifier already present, skipping remote call");
                return Ok(existing.to_string());
            }

            self.stats.write().fetch_attempts += 1;
            let result = self
                .pool
                .run(with_timeout(
                    self.remote_timeout,
                    "resolve",
                    self.resolver.resolve(&relationship),
                ))
                .await
                .and_then(validate_identifier);

            match result {
                Ok(identifier) => {
                    self.store_identifier(key, &identifier)?;
                    return Ok(identifier);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        material = %key.material_id,
                        partner = %key.partner_id,
                        attempt = attempt + 1,
                        retries_left = self.retry.max_attempts - attempt - 1,
                        error = %e,
                        "identifier fetch failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(SyncError::RetryExhausted {
            attempts: self.retry.max_attempts,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Writes the identifier onto the latest stored record, repeating the
    /// read-modify-write when a concurrent writer got there first.
    fn store_identifier(&self, key: &RelationKey, identifier: &str) -> SyncResult<()> {
        let mut conflicts = 0;
        loop {
            let mut current = self.store.find(key)?;
            if current.identifier() == Some(identifier) {
                return Ok(());
            }
            current.partner_identifier = Some(identifier.to_string());

            match self.store.upsert(current) {
                Ok(stored) => {
                    info!(
                        material = %key.material_id,
                        partner = %key.partner_id,
                        identifier,
                        version = stored.version,
                        "stored partner identifier"
                    );
                    return Ok(());
                }
                Err(e) if e.is_version_conflict() && conflicts < self.conflict_retries => {
                    conflicts += 1;
                    debug!(key = %key, conflicts, "identifier write lost a version race");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn record(&self, key: &RelationKey, outcome: &SyncResult<String>) {
        let mut stats = self.stats.write();
        match outcome {
            Ok(_) => stats.fetches_resolved += 1,
            Err(e) => {
                stats.fetches_failed += 1;
                drop(stats);
                warn!(
                    material = %key.material_id,
                    partner = %key.partner_id,
                    error = %e,
                    "identifier fetch gave up"
                );
            }
        }
    }
}

fn validate_identifier(identifier: String) -> SyncResult<String> {
    let identifier = identifier.trim().to_string();
    if is_well_formed_identifier(&identifier) {
        Ok(identifier)
    } else {
        Err(SyncError::RemoteRejected(format!(
            "malformed partner identifier {identifier:?}"
        )))
    }
}
