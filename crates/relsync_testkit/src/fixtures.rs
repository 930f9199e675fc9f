//! Test fixtures and engine helpers.
//!
//! Provides relationship builders and a harness wiring an in-memory store,
//! scripted collaborators and a coordinator together.

use relsync_core::{
    InMemoryRelationStore, PartnerId, RelationKey, RelationService, RelationStore, Relationship,
    StaticPartnerDirectory,
};
use relsync_engine::{MockPublisher, MockResolver, SyncCoordinator, SyncEngineConfig};
use std::sync::Arc;

/// Business partner number used for our own company in tests.
pub const OWN_BPNL: &str = "BPNL00000000OWN1";

/// Identifier most scripted resolvers answer with.
pub const SAMPLE_IDENTIFIER: &str = "urn:uuid:abc";

/// Coordinator type used by the harness.
pub type MockCoordinator = SyncCoordinator<InMemoryRelationStore, MockResolver, MockPublisher>;

/// A supplier relationship whose identifier still has to be resolved.
pub fn unresolved_supplier(material_id: &str) -> Relationship {
    Relationship::new(material_id, PartnerId::new_random()).supplier()
}

/// A supplier relationship with its identifier already known.
pub fn resolved_supplier(material_id: &str, identifier: &str) -> Relationship {
    unresolved_supplier(material_id).with_partner_identifier(identifier)
}

/// A customer relationship.
pub fn customer(material_id: &str) -> Relationship {
    Relationship::new(material_id, PartnerId::new_random()).customer()
}

/// A directory knowing only our own company.
pub fn own_directory() -> StaticPartnerDirectory {
    StaticPartnerDirectory::new(OWN_BPNL)
}

/// Store, service and coordinator wired the way an application would.
///
/// Must be created inside a tokio runtime.
pub struct TestHarness {
    /// The shared store.
    pub store: Arc<InMemoryRelationStore>,
    /// The coordinator, also registered as the service listener.
    pub coordinator: MockCoordinator,
    /// The service mutations go through.
    pub service: RelationService<InMemoryRelationStore>,
}

impl TestHarness {
    /// Creates a harness with the default engine configuration.
    pub fn new(resolver: MockResolver, publisher: MockPublisher) -> Self {
        Self::with_config(SyncEngineConfig::default(), resolver, publisher)
    }

    /// Creates a harness with `config`.
    pub fn with_config(
        config: SyncEngineConfig,
        resolver: MockResolver,
        publisher: MockPublisher,
    ) -> Self {
        let store = Arc::new(InMemoryRelationStore::new());
        let coordinator = SyncCoordinator::new(config, Arc::clone(&store), resolver, publisher)
            .expect("harness must be created inside a tokio runtime");
        let service = RelationService::new(Arc::clone(&store), Arc::new(own_directory()))
            .with_listener(Arc::new(coordinator.clone()));
        Self {
            store,
            coordinator,
            service,
        }
    }

    /// The scripted resolver.
    pub fn resolver(&self) -> &MockResolver {
        self.coordinator.fetcher().resolver()
    }

    /// The scripted publisher.
    pub fn publisher(&self) -> &MockPublisher {
        self.coordinator.publisher()
    }

    /// Stores `relationship` without notifying the coordinator.
    pub fn seed(&self, relationship: Relationship) -> Relationship {
        self.store
            .upsert(relationship)
            .expect("seeding the store should succeed")
    }

    /// Returns the stored copy of `key`.
    pub fn stored(&self, key: &RelationKey) -> Relationship {
        self.store.find(key).expect("relationship should be stored")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_roles() {
        let supplier = unresolved_supplier("M1");
        assert!(supplier.needs_identifier());
        assert!(supplier.flag_inconsistencies().is_empty());

        let resolved = resolved_supplier("M1", SAMPLE_IDENTIFIER);
        assert!(!resolved.needs_identifier());

        let buyer = customer("M1");
        assert!(buyer.buys_material);
        assert!(!buyer.supplies_material);
    }

    #[tokio::test]
    async fn harness_routes_mutations_to_coordinator() {
        let harness = TestHarness::new(MockResolver::new(), MockPublisher::new());
        harness
            .service
            .create(resolved_supplier("M1", SAMPLE_IDENTIFIER))
            .unwrap();
        assert_eq!(harness.coordinator.stats().publish_jobs, 1);
        assert_eq!(harness.store.len(), 1);
    }
}
