//! Synchronization coordinator.
//!
//! Invoked whenever a relationship is created or updated. Schedules the
//! registry publication (and, when the partner identifier is missing, the
//! identifier fetch) on background tasks and returns immediately.

use crate::config::SyncEngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::fetch::{FetchCoordinator, FetchHandle};
use crate::job::{JobState, PublishReport};
use crate::pool::WorkerPool;
use crate::remote::{with_timeout, IdentifierResolver, PublishKind, RegistryPublisher};
use crate::stats::EngineStats;
use parking_lot::RwLock;
use relsync_core::{RelationKey, RelationListener, RelationStore, Relationship};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Work scheduled for one relationship mutation.
#[derive(Debug)]
pub struct ScheduledSync {
    /// Id of the publish job.
    pub job_id: u64,
    /// Create or update.
    pub kind: PublishKind,
    /// Resolves to the publish report once the job is done.
    pub publish: JoinHandle<PublishReport>,
    /// The identifier fetch started or joined for this mutation, if any.
    pub fetch: Option<FetchHandle>,
}

/// Chooses the publish kind for an update.
///
/// A partner that just became a supplier has never been registered for this
/// material, so the descriptor has to be created rather than updated.
pub fn publish_kind_for_update(previous: &Relationship, updated: &Relationship) -> PublishKind {
    if !previous.supplies_material && updated.supplies_material {
        PublishKind::Create
    } else {
        PublishKind::Update
    }
}

struct SyncShared<S, R, P> {
    config: SyncEngineConfig,
    store: Arc<S>,
    publisher: P,
    fetcher: FetchCoordinator<S, R>,
    pool: WorkerPool,
    stats: Arc<RwLock<EngineStats>>,
    next_job_id: AtomicU64,
}

/// Keeps the registry and the partner identifier of relationships in line
/// with their local state.
pub struct SyncCoordinator<S, R, P> {
    shared: Arc<SyncShared<S, R, P>>,
}

impl<S, R, P> Clone for SyncCoordinator<S, R, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, R, P> SyncCoordinator<S, R, P>
where
    S: RelationStore + 'static,
    R: IdentifierResolver + 'static,
    P: RegistryPublisher + 'static,
{
    /// Creates a coordinator on the runtime of the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PoolClosed`] if called outside a tokio runtime.
    pub fn new(config: SyncEngineConfig, store: Arc<S>, resolver: R, publisher: P) -> SyncResult<Self> {
        let pool = WorkerPool::try_current(config.max_workers)?;
        Ok(Self::with_pool(config, pool, store, resolver, publisher))
    }

    /// Creates a coordinator that runs its jobs on `pool`.
    pub fn with_pool(
        config: SyncEngineConfig,
        pool: WorkerPool,
        store: Arc<S>,
        resolver: R,
        publisher: P,
    ) -> Self {
        let stats = Arc::new(RwLock::new(EngineStats::default()));
        let fetcher = FetchCoordinator::new(
            &config,
            Arc::clone(&store),
            resolver,
            pool.clone(),
            Arc::clone(&stats),
        );
        Self {
            shared: Arc::new(SyncShared {
                config,
                store,
                publisher,
                fetcher,
                pool,
                stats,
                next_job_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the fetch coordinator.
    pub fn fetcher(&self) -> &FetchCoordinator<S, R> {
        &self.shared.fetcher
    }

    /// Returns the registry publisher.
    pub fn publisher(&self) -> &P {
        &self.shared.publisher
    }

    /// Returns the worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.shared.pool
    }

    /// Returns a snapshot of the engine statistics.
    pub fn stats(&self) -> EngineStats {
        self.shared.stats.read().clone()
    }

    /// Schedules a CREATE publication, plus an identifier fetch if the
    /// partner supplies the material and its identifier is missing.
    pub fn on_relationship_created(&self, relationship: &Relationship) -> ScheduledSync {
        self.schedule(relationship, PublishKind::Create)
    }

    /// Schedules the publication for an update; see [`publish_kind_for_update`].
    pub fn on_relationship_updated(
        &self,
        previous: &Relationship,
        updated: &Relationship,
    ) -> ScheduledSync {
        self.schedule(updated, publish_kind_for_update(previous, updated))
    }

    /// Fire-and-forget variant of [`Self::on_relationship_created`].
    pub fn notify_relationship_created(&self, relationship: &Relationship) {
        drop(self.on_relationship_created(relationship));
    }

    /// Fire-and-forget variant of [`Self::on_relationship_updated`].
    pub fn notify_relationship_updated(&self, previous: &Relationship, updated: &Relationship) {
        drop(self.on_relationship_updated(previous, updated));
    }

    fn schedule(&self, relationship: &Relationship, kind: PublishKind) -> ScheduledSync {
        let key = relationship.key();
        let job_id = self.shared.next_job_id.fetch_add(1, Ordering::Relaxed);
        self.shared.stats.write().publish_jobs += 1;
        debug!(job = job_id, key = %key, kind = %kind, "scheduling publish job");

        let shared = Arc::clone(&self.shared);
        let job_key = key.clone();
        let publish = self
            .shared
            .pool
            .spawn(async move { shared.run_publish_job(job_id, job_key, kind).await });

        let fetch = if relationship.needs_identifier() {
            info!(
                material = %key.material_id,
                partner = %key.partner_id,
                "partner identifier missing, requesting fetch"
            );
            match self.shared.fetcher.ensure_fetch(&key) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(key = %key, error = %e, "could not request identifier fetch");
                    None
                }
            }
        } else {
            None
        };

        ScheduledSync {
            job_id,
            kind,
            publish,
            fetch,
        }
    }
}

impl<S, R, P> SyncShared<S, R, P>
where
    S: RelationStore + 'static,
    R: IdentifierResolver + 'static,
    P: RegistryPublisher + 'static,
{
    async fn run_publish_job(&self, job_id: u64, key: RelationKey, kind: PublishKind) -> PublishReport {
        let retry = &self.config.publish_retry;
        let mut report = PublishReport::new(job_id, key.clone(), kind);
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                report.enter(JobState::Retrying);
                self.stats.write().retries += 1;
                tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
            }
            report.attempts += 1;
            self.stats.write().publish_attempts += 1;

            match self.attempt_publish(&key, kind, &mut report).await {
                Ok(()) => {
                    info!(job = job_id, key = %key, kind = %kind, attempts = report.attempts, "publish job succeeded");
                    self.stats.write().publish_succeeded += 1;
                    report.finish(Ok(()));
                    return report;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        job = job_id,
                        material = %key.material_id,
                        partner = %key.partner_id,
                        kind = %kind,
                        attempt = attempt + 1,
                        retries_left = retry.max_attempts - attempt - 1,
                        error = %e,
                        "publish attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    error!(job = job_id, key = %key, kind = %kind, error = %e, "publish job aborted");
                    self.stats.write().publish_failed += 1;
                    report.finish(Err(e));
                    return report;
                }
            }
        }

        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        error!(
            event = "retry_exhausted",
            job = job_id,
            material = %key.material_id,
            partner = %key.partner_id,
            kind = %kind,
            attempts = retry.max_attempts,
            last_error = %last_error,
            "publish job failed permanently"
        );
        self.stats.write().publish_failed += 1;
        report.finish(Err(SyncError::RetryExhausted {
            attempts: retry.max_attempts,
            last_error,
        }));
        report
    }

    /// One pass through the job: make sure the identifier is present when
    /// required, then publish every descriptor the relationship calls for.
    async fn attempt_publish(
        &self,
        key: &RelationKey,
        kind: PublishKind,
        report: &mut PublishReport,
    ) -> SyncResult<()> {
        let mut relationship = self.store.find(key)?;

        if relationship.needs_identifier() {
            report.enter(JobState::WaitingForIdentifier);
            let handle = self.fetcher.ensure_fetch(key)?;
            debug!(key = %key, fetch = handle.fetch_id(), joined = handle.is_joined(), "awaiting identifier fetch");
            let fetched = handle.wait().await;
            if let Err(e) = &fetched {
                warn!(
                    job = report.job_id,
                    material = %key.material_id,
                    partner = %key.partner_id,
                    fetch = handle.fetch_id(),
                    error = %e,
                    "identifier fetch did not succeed"
                );
            }
            tokio::time::sleep(self.config.identifier_settle_delay).await;

            // The identifier may also come from a fetch started elsewhere,
            // so the store is the only source of truth here.
            relationship = self.store.find(key)?;
            if relationship.needs_identifier() {
                let cause = match fetched {
                    Err(e) => e.to_string(),
                    Ok(_) => "identifier was cleared after the fetch stored it".to_string(),
                };
                return Err(SyncError::MissingIdentifier {
                    key: key.clone(),
                    cause,
                });
            }
        }

        report.enter(JobState::Publishing);
        self.publish(&relationship, kind).await
    }

    async fn publish(&self, relationship: &Relationship, kind: PublishKind) -> SyncResult<()> {
        let mut first_error = None;

        if relationship.material_flags.product {
            let result = match self.store.list_consumers_of(&relationship.material_id) {
                Ok(consumers) => {
                    self.remote_call(
                        "publish_product",
                        self.publisher
                            .publish_product(&relationship.material_id, &consumers),
                    )
                    .await
                }
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => info!(material = %relationship.material_id, "published product descriptor"),
                Err(e) => {
                    warn!(material = %relationship.material_id, error = %e, "product descriptor publication failed");
                    first_error = Some(e);
                }
            }
        }

        if relationship.supplies_material {
            let result = self
                .remote_call(
                    "publish_material",
                    self.publisher.publish_material(relationship, kind),
                )
                .await;
            match result {
                Ok(()) => info!(
                    material = %relationship.material_id,
                    partner = %relationship.partner_id,
                    kind = %kind,
                    "published material descriptor"
                ),
                Err(e) => {
                    warn!(
                        material = %relationship.material_id,
                        partner = %relationship.partner_id,
                        kind = %kind,
                        error = %e,
                        "material descriptor publication failed"
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn remote_call<F>(&self, operation: &str, call: F) -> SyncResult<()>
    where
        F: Future<Output = SyncResult<()>>,
    {
        self.pool
            .run(with_timeout(self.config.remote_timeout, operation, call))
            .await
    }
}

impl<S, R, P> RelationListener for SyncCoordinator<S, R, P>
where
    S: RelationStore + 'static,
    R: IdentifierResolver + 'static,
    P: RegistryPublisher + 'static,
{
    fn relationship_created(&self, relationship: &Relationship) {
        self.notify_relationship_created(relationship);
    }

    fn relationship_updated(&self, previous: &Relationship, updated: &Relationship) {
        self.notify_relationship_updated(previous, updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::remote::{MockPublisher, MockResolver, PublishCall};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relsync_core::{InMemoryRelationStore, MaterialFlags, PartnerId};
    use std::time::Duration;

    type TestCoordinator = SyncCoordinator<InMemoryRelationStore, MockResolver, MockPublisher>;

    fn coordinator(
        config: SyncEngineConfig,
        resolver: MockResolver,
        publisher: MockPublisher,
    ) -> (TestCoordinator, Arc<InMemoryRelationStore>) {
        let store = Arc::new(InMemoryRelationStore::new());
        let coordinator =
            SyncCoordinator::new(config, Arc::clone(&store), resolver, publisher).unwrap();
        (coordinator, store)
    }

    #[tokio::test(start_paused = true)]
    async fn present_identifier_publishes_directly() {
        let (sync, store) = coordinator(
            SyncEngineConfig::default(),
            MockResolver::new(),
            MockPublisher::new(),
        );
        let rel = store
            .upsert(
                Relationship::new("M1", PartnerId::new_random())
                    .supplier()
                    .with_partner_identifier("urn:uuid:abc"),
            )
            .unwrap();

        let scheduled = sync.on_relationship_created(&rel);
        assert!(scheduled.fetch.is_none());
        let report = scheduled.publish.await.unwrap();

        assert!(report.is_success());
        assert_eq!(
            report.transitions,
            vec![JobState::Pending, JobState::Publishing, JobState::Succeeded]
        );
        assert_eq!(sync.fetcher().resolver().call_count(), 0);
        assert_eq!(sync.stats().fetches_started, 0);
        assert_eq!(sync.publisher().material_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_for_identifier_then_publishes() {
        let resolver = MockResolver::answering("urn:uuid:abc");
        resolver.fail_times(1);
        let (sync, store) = coordinator(SyncEngineConfig::default(), resolver, MockPublisher::new());
        let rel = store
            .upsert(Relationship::new("M1", PartnerId::new_random()).supplier())
            .unwrap();

        let scheduled = sync.on_relationship_created(&rel);
        assert_eq!(scheduled.kind, PublishKind::Create);
        let fetch = scheduled.fetch.expect("fetch should be requested");
        assert!(!fetch.is_joined());

        let report = scheduled.publish.await.unwrap();
        assert!(report.is_success());
        assert_eq!(
            report.transitions,
            vec![
                JobState::Pending,
                JobState::WaitingForIdentifier,
                JobState::Publishing,
                JobState::Succeeded
            ]
        );
        assert_eq!(report.attempts, 1);
        assert_eq!(fetch.try_outcome(), Some(Ok("urn:uuid:abc".to_string())));
        assert_eq!(sync.fetcher().resolver().call_count(), 2);

        let calls = sync.publisher().material_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.partner_identifier.as_deref(), Some("urn:uuid:abc"));
        assert_eq!(calls[0].1, PublishKind::Create);
        assert_eq!(
            store.find(&rel.key()).unwrap().partner_identifier.as_deref(),
            Some("urn:uuid:abc")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_publisher_exhausts_four_attempts() {
        let publisher = MockPublisher::new();
        publisher.fail_always(SyncError::RemoteUnavailable("registry down".into()));
        let (sync, store) = coordinator(SyncEngineConfig::default(), MockResolver::new(), publisher);
        let rel = store
            .upsert(
                Relationship::new("M1", PartnerId::new_random())
                    .supplier()
                    .with_partner_identifier("urn:uuid:abc"),
            )
            .unwrap();

        let start = tokio::time::Instant::now();
        let report = sync.on_relationship_created(&rel).publish.await.unwrap();

        assert_eq!(report.attempts, 4);
        assert_eq!(sync.publisher().call_count(), 4);
        assert_eq!(report.final_state(), JobState::Failed);
        assert!(matches!(
            report.outcome,
            Err(SyncError::RetryExhausted { attempts: 4, .. })
        ));
        assert!(start.elapsed() >= Duration::from_millis(6000));

        let stats = sync.stats();
        assert_eq!(stats.publish_failed, 1);
        assert_eq!(stats.publish_attempts, 4);
        assert_eq!(stats.retries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn supplier_transition_schedules_create() {
        let (sync, store) = coordinator(
            SyncEngineConfig::default(),
            MockResolver::answering("urn:uuid:abc"),
            MockPublisher::new(),
        );
        let previous = store
            .upsert(Relationship::new("M1", PartnerId::new_random()).customer())
            .unwrap();
        let updated = store.upsert(previous.clone().supplier()).unwrap();

        let scheduled = sync.on_relationship_updated(&previous, &updated);
        assert_eq!(scheduled.kind, PublishKind::Create);
        assert!(scheduled.fetch.is_some());
        assert!(scheduled.publish.await.unwrap().is_success());

        let kinds: Vec<PublishKind> = sync
            .publisher()
            .material_calls()
            .into_iter()
            .map(|(_, kind)| kind)
            .collect();
        assert_eq!(kinds, vec![PublishKind::Create]);
    }

    #[test]
    fn update_kind_selection() {
        let partner = PartnerId::new_random();
        let plain = Relationship::new("M1", partner);
        let supplier = plain.clone().supplier();
        let customer = plain.clone().customer();

        assert_eq!(publish_kind_for_update(&plain, &supplier), PublishKind::Create);
        assert_eq!(publish_kind_for_update(&customer, &supplier), PublishKind::Create);
        assert_eq!(publish_kind_for_update(&supplier, &supplier), PublishKind::Update);
        assert_eq!(publish_kind_for_update(&supplier, &plain), PublishKind::Update);
        assert_eq!(publish_kind_for_update(&plain, &customer), PublishKind::Update);
        assert_eq!(publish_kind_for_update(&plain, &plain), PublishKind::Update);
    }

    #[tokio::test(start_paused = true)]
    async fn product_descriptor_lists_every_consumer() {
        let (sync, store) = coordinator(
            SyncEngineConfig::default(),
            MockResolver::new(),
            MockPublisher::new(),
        );
        let other = store
            .upsert(Relationship::new("M1", PartnerId::new_random()).customer())
            .unwrap();
        let rel = store
            .upsert(Relationship::new("M1", PartnerId::new_random()).customer())
            .unwrap();

        let report = sync.on_relationship_created(&rel).publish.await.unwrap();
        assert!(report.is_success());

        let calls = sync.publisher().calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            PublishCall::Product {
                material_id,
                consumers,
            } => {
                assert_eq!(material_id, "M1");
                assert_eq!(consumers.len(), 2);
                assert!(consumers.contains(&other));
                assert!(consumers.contains(&rel));
            }
            call => panic!("unexpected call: {call:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn all_descriptors_must_succeed() {
        let publisher = MockPublisher::new();
        publisher.fail_times(1);
        let (sync, store) = coordinator(SyncEngineConfig::default(), MockResolver::new(), publisher);
        let rel = store
            .upsert(
                Relationship::new("M1", PartnerId::new_random())
                    .supplier()
                    .customer()
                    .with_partner_identifier("urn:uuid:abc"),
            )
            .unwrap();

        let report = sync.on_relationship_created(&rel).publish.await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.attempts, 2);
        // Product fails, material succeeds, then both succeed
        assert_eq!(sync.publisher().call_count(), 4);
        assert_eq!(
            report.transitions,
            vec![
                JobState::Pending,
                JobState::Publishing,
                JobState::Retrying,
                JobState::Publishing,
                JobState::Succeeded
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_relationship_aborts_job() {
        let (sync, store) = coordinator(
            SyncEngineConfig::default(),
            MockResolver::new(),
            MockPublisher::new(),
        );
        let rel = store
            .upsert(
                Relationship::new("M1", PartnerId::new_random())
                    .supplier()
                    .with_partner_identifier("urn:uuid:abc"),
            )
            .unwrap();

        let scheduled = sync.on_relationship_created(&rel);
        store.remove(&rel.key()).unwrap();
        let report = scheduled.publish.await.unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(report.outcome, Err(SyncError::NotFound { key: rel.key() }));
        assert_eq!(sync.publisher().call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_identifier_never_publishes() {
        let config = SyncEngineConfig::default()
            .with_fetch_retry(RetryConfig::no_retry())
            .with_publish_retry(RetryConfig::fixed(2, Duration::from_millis(2000)));
        let (sync, store) = coordinator(config, MockResolver::new(), MockPublisher::new());
        let rel = store
            .upsert(Relationship::new("M1", PartnerId::new_random()).supplier())
            .unwrap();

        let start = tokio::time::Instant::now();
        let report = sync.on_relationship_created(&rel).publish.await.unwrap();

        // Two settle pauses around one publish retry delay
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
        assert_eq!(sync.publisher().call_count(), 0);
        assert_eq!(sync.fetcher().resolver().call_count(), 2);
        assert_eq!(
            report.transitions,
            vec![
                JobState::Pending,
                JobState::WaitingForIdentifier,
                JobState::Retrying,
                JobState::WaitingForIdentifier,
                JobState::Failed
            ]
        );
        match report.outcome {
            Err(SyncError::RetryExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("partner identifier still missing"));
                assert!(last_error.contains("no mock resolve response set"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!sync.fetcher().is_in_flight(&rel.key()));
    }

    #[tokio::test(start_paused = true)]
    async fn publish_waits_settle_delay_after_fetch() {
        for (settle_ms, expected_ms) in [(500, 800), (0, 300)] {
            let resolver = MockResolver::answering("urn:uuid:abc");
            resolver.fail_times(1);
            let config = SyncEngineConfig::default()
                .with_identifier_settle_delay(Duration::from_millis(settle_ms));
            let (sync, store) = coordinator(config, resolver, MockPublisher::new());
            let rel = store
                .upsert(Relationship::new("M1", PartnerId::new_random()).supplier())
                .unwrap();

            let start = tokio::time::Instant::now();
            let scheduled = sync.on_relationship_created(&rel);
            scheduled.fetch.unwrap().wait().await.unwrap();
            // One fetch retry delay, no settle yet
            assert!(start.elapsed() < Duration::from_millis(310));
            if settle_ms > 0 {
                assert_eq!(sync.publisher().call_count(), 0);
            }

            let report = scheduled.publish.await.unwrap();
            assert!(report.is_success());
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(expected_ms), "{elapsed:?}");
            assert!(elapsed < Duration::from_millis(expected_ms + 100), "{elapsed:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_fetch_is_joined() {
        let resolver = MockResolver::answering("urn:uuid:abc");
        resolver.set_latency(Duration::from_millis(250));
        let (sync, store) = coordinator(SyncEngineConfig::default(), resolver, MockPublisher::new());
        let rel = store
            .upsert(Relationship::new("M1", PartnerId::new_random()).supplier())
            .unwrap();

        let earlier = sync.fetcher().ensure_fetch(&rel.key()).unwrap();
        let scheduled = sync.on_relationship_created(&rel);
        assert!(scheduled.fetch.as_ref().unwrap().is_joined());

        assert!(scheduled.publish.await.unwrap().is_success());
        assert_eq!(earlier.try_outcome(), Some(Ok("urn:uuid:abc".to_string())));
        assert_eq!(sync.fetcher().resolver().call_count(), 1);
        assert_eq!(sync.stats().fetches_joined, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn material_flags_without_roles_publish_nothing() {
        let (sync, store) = coordinator(
            SyncEngineConfig::default(),
            MockResolver::new(),
            MockPublisher::new(),
        );
        let rel = store
            .upsert(
                Relationship::new("M1", PartnerId::new_random())
                    .with_material_flags(MaterialFlags::new(true, false)),
            )
            .unwrap();

        let report = sync.on_relationship_created(&rel).publish.await.unwrap();
        assert!(report.is_success());
        assert_eq!(sync.publisher().call_count(), 0);
    }

    /// Records every material publication that happened while the store
    /// still lacked the identifier.
    struct StoreCheckingPublisher {
        store: Arc<InMemoryRelationStore>,
        published: Mutex<u32>,
        violations: Mutex<u32>,
    }

    #[async_trait]
    impl RegistryPublisher for StoreCheckingPublisher {
        async fn publish_material(
            &self,
            relationship: &Relationship,
            _kind: PublishKind,
        ) -> SyncResult<()> {
            let stored = self.store.find(&relationship.key())?;
            if stored.identifier().is_none() || relationship.identifier().is_none() {
                *self.violations.lock() += 1;
            }
            *self.published.lock() += 1;
            Ok(())
        }

        async fn publish_product(&self, _material_id: &str, _consumers: &[Relationship]) -> SyncResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publish_never_precedes_identifier() {
        for (latency_ms, failures) in [(0, 0), (5, 1), (400, 0), (1500, 2), (2600, 3)] {
            let store = Arc::new(InMemoryRelationStore::new());
            let resolver = MockResolver::answering("urn:uuid:abc");
            resolver.set_latency(Duration::from_millis(latency_ms));
            resolver.fail_times(failures);
            let publisher = StoreCheckingPublisher {
                store: Arc::clone(&store),
                published: Mutex::new(0),
                violations: Mutex::new(0),
            };
            let sync = SyncCoordinator::new(
                SyncEngineConfig::default(),
                Arc::clone(&store),
                resolver,
                publisher,
            )
            .unwrap();

            let created = store
                .upsert(Relationship::new("M1", PartnerId::new_random()).supplier())
                .unwrap();
            let first = sync.on_relationship_created(&created);
            tokio::time::sleep(Duration::from_millis(latency_ms / 2)).await;
            let mut changed = store.find(&created.key()).unwrap();
            changed.partner_material_number = Some("P-1".into());
            let changed = store.upsert(changed).unwrap();
            let second = sync.on_relationship_updated(&created, &changed);

            assert!(first.publish.await.unwrap().is_success());
            assert!(second.publish.await.unwrap().is_success());
            assert_eq!(*sync.publisher().violations.lock(), 0);
            assert_eq!(*sync.publisher().published.lock(), 2);
        }
    }
}
