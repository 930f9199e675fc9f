//! Remote collaborators: the identifier resolver and the registry publisher.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use relsync_core::Relationship;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Whether the registry has seen the descriptor before.
///
/// `Create` descriptors are registered anew, `Update` descriptors replace an
/// existing registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PublishKind {
    /// Register a new descriptor.
    Create,
    /// Replace an existing descriptor.
    Update,
}

impl fmt::Display for PublishKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishKind::Create => write!(f, "CREATE"),
            PublishKind::Update => write!(f, "UPDATE"),
        }
    }
}

/// Asks a partner for its canonical identifier of a material.
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    /// Resolves the identifier for the relationship.
    ///
    /// The returned value is validated by the caller.
    async fn resolve(&self, relationship: &Relationship) -> SyncResult<String>;
}

/// Creates or updates discoverable descriptors in the shared registry.
///
/// Implementations must be idempotent: publishing the same data twice
/// must be harmless.
#[async_trait]
pub trait RegistryPublisher: Send + Sync {
    /// Publishes the material descriptor scoped to one supplier relationship.
    async fn publish_material(
        &self,
        relationship: &Relationship,
        kind: PublishKind,
    ) -> SyncResult<()>;

    /// Publishes the aggregated product descriptor listing every consumer.
    async fn publish_product(&self, material_id: &str, consumers: &[Relationship])
        -> SyncResult<()>;
}

/// Bounds a remote call by `limit`; expiry counts as the remote being unavailable.
pub async fn with_timeout<F, T>(limit: Duration, operation: &str, call: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::RemoteUnavailable(format!(
            "{operation} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// A scripted resolver for testing.
///
/// Queued responses are consumed one per call; once the queue is empty the
/// fallback response is returned.
#[derive(Debug)]
pub struct MockResolver {
    responses: Mutex<VecDeque<SyncResult<String>>>,
    fallback: Mutex<SyncResult<String>>,
    latency: Mutex<Duration>,
    calls: Mutex<Vec<Relationship>>,
}

impl MockResolver {
    /// Creates a resolver that fails every call until told otherwise.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Err(SyncError::RemoteUnavailable(
                "no mock resolve response set".into(),
            ))),
            latency: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a resolver that always answers with `identifier`.
    pub fn answering(identifier: impl Into<String>) -> Self {
        let resolver = Self::new();
        resolver.set_fallback(Ok(identifier.into()));
        resolver
    }

    /// Queues a response for the next unanswered call.
    pub fn push_response(&self, response: SyncResult<String>) {
        self.responses.lock().push_back(response);
    }

    /// Queues `count` unavailable failures.
    pub fn fail_times(&self, count: usize) {
        for _ in 0..count {
            self.push_response(Err(SyncError::RemoteUnavailable("partner offline".into())));
        }
    }

    /// Sets the response used once the queue is empty.
    pub fn set_fallback(&self, response: SyncResult<String>) {
        *self.fallback.lock() = response;
    }

    /// Sets how long every call takes.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The relationships passed to each call.
    pub fn calls(&self) -> Vec<Relationship> {
        self.calls.lock().clone()
    }
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentifierResolver for MockResolver {
    async fn resolve(&self, relationship: &Relationship) -> SyncResult<String> {
        self.calls.lock().push(relationship.clone());
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let queued = self.responses.lock().pop_front();
        queued.unwrap_or_else(|| self.fallback.lock().clone())
    }
}

/// One call received by [`MockPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishCall {
    /// A material descriptor publication.
    Material {
        /// The relationship as passed in.
        relationship: Relationship,
        /// Create or update.
        kind: PublishKind,
    },
    /// A product descriptor publication.
    Product {
        /// The material.
        material_id: String,
        /// The consumers as passed in.
        consumers: Vec<Relationship>,
    },
}

/// A scripted registry publisher for testing.
///
/// Succeeds by default. Queued failures are consumed one per call, shared
/// between both descriptor kinds.
#[derive(Debug, Default)]
pub struct MockPublisher {
    failures: Mutex<VecDeque<SyncError>>,
    always_fail: Mutex<Option<SyncError>>,
    latency: Mutex<Duration>,
    calls: Mutex<Vec<PublishCall>>,
}

impl MockPublisher {
    /// Creates a publisher that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `count` unavailable failures.
    pub fn fail_times(&self, count: usize) {
        let mut failures = self.failures.lock();
        for _ in 0..count {
            failures.push_back(SyncError::RemoteUnavailable("registry offline".into()));
        }
    }

    /// Makes every call fail with `error`.
    pub fn fail_always(&self, error: SyncError) {
        *self.always_fail.lock() = Some(error);
    }

    /// Sets how long every call takes.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<PublishCall> {
        self.calls.lock().clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The material publications received so far.
    pub fn material_calls(&self) -> Vec<(Relationship, PublishKind)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PublishCall::Material { relationship, kind } => {
                    Some((relationship.clone(), *kind))
                }
                PublishCall::Product { .. } => None,
            })
            .collect()
    }

    async fn answer(&self, call: PublishCall) -> SyncResult<()> {
        self.calls.lock().push(call);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = self.always_fail.lock().clone() {
            return Err(error);
        }
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RegistryPublisher for MockPublisher {
    async fn publish_material(
        &self,
        relationship: &Relationship,
        kind: PublishKind,
    ) -> SyncResult<()> {
        self.answer(PublishCall::Material {
            relationship: relationship.clone(),
            kind,
        })
        .await
    }

    async fn publish_product(
        &self,
        material_id: &str,
        consumers: &[Relationship],
    ) -> SyncResult<()> {
        self.answer(PublishCall::Product {
            material_id: material_id.to_string(),
            consumers: consumers.to_vec(),
        })
        .await
    }
}
