//! Relationship storage.

use crate::error::{CoreError, CoreResult};
use crate::types::{PartnerId, RelationKey, Relationship};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Durable key-value store of relationships.
///
/// # Invariants
///
/// - `upsert` on an existing key succeeds only if the written version equals
///   the stored version; the stored copy then carries `version + 1`
/// - `upsert` on an absent key stores the record with version 1
/// - List operations return records ordered by key
///
/// # Implementors
///
/// - [`InMemoryRelationStore`] - For testing and local simulation
pub trait RelationStore: Send + Sync {
    /// Looks up a relationship.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no record exists for the key.
    fn find(&self, key: &RelationKey) -> CoreResult<Relationship>;

    /// Inserts or updates a relationship and returns the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionConflict`] if the record was changed since
    /// the caller read it.
    fn upsert(&self, relationship: Relationship) -> CoreResult<Relationship>;

    /// Deletes a relationship and returns the last stored copy.
    fn remove(&self, key: &RelationKey) -> CoreResult<Relationship>;

    /// Returns every relationship of the material.
    fn list_for_material(&self, material_id: &str) -> CoreResult<Vec<Relationship>>;

    /// Returns every relationship of the partner.
    fn list_for_partner(&self, partner_id: &PartnerId) -> CoreResult<Vec<Relationship>>;

    /// Returns every stored relationship.
    fn list_all(&self) -> CoreResult<Vec<Relationship>>;

    /// Returns the relationships whose partner buys the material.
    fn list_consumers_of(&self, material_id: &str) -> CoreResult<Vec<Relationship>> {
        Ok(self
            .list_for_material(material_id)?
            .into_iter()
            .filter(|rel| rel.buys_material)
            .collect())
    }

    /// Returns the relationships whose partner supplies the material.
    fn list_suppliers_of(&self, material_id: &str) -> CoreResult<Vec<Relationship>> {
        Ok(self
            .list_for_material(material_id)?
            .into_iter()
            .filter(|rel| rel.supplies_material)
            .collect())
    }
}

/// An in-memory relationship store.
#[derive(Debug, Default)]
pub struct InMemoryRelationStore {
    records: RwLock<HashMap<RelationKey, Relationship>>,
}

impl InMemoryRelationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with relationships.
    ///
    /// Versions of the given records are reset; each is stored as new.
    pub fn with_records(records: impl IntoIterator<Item = Relationship>) -> Self {
        let map = records
            .into_iter()
            .map(|mut rel| {
                rel.version = 1;
                (rel.key(), rel)
            })
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    /// Returns the number of stored relationships.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn collect_sorted<F>(&self, predicate: F) -> Vec<Relationship>
    where
        F: Fn(&Relationship) -> bool,
    {
        let records = self.records.read();
        let mut found: Vec<Relationship> =
            records.values().filter(|rel| predicate(rel)).cloned().collect();
        found.sort_by(|a, b| {
            (&a.material_id, a.partner_id).cmp(&(&b.material_id, b.partner_id))
        });
        found
    }
}

impl RelationStore for InMemoryRelationStore {
    fn find(&self, key: &RelationKey) -> CoreResult<Relationship> {
        self.records
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::NotFound { key: key.clone() })
    }

    fn upsert(&self, mut relationship: Relationship) -> CoreResult<Relationship> {
        if relationship.material_id.is_empty() {
            return Err(CoreError::InvalidRelationship(
                "material id must not be empty".into(),
            ));
        }

        let key = relationship.key();
        let mut records = self.records.write();
        match records.get(&key) {
            Some(stored) if stored.version != relationship.version => {
                return Err(CoreError::VersionConflict {
                    key,
                    expected: stored.version,
                    actual: relationship.version,
                });
            }
            Some(stored) => relationship.version = stored.version + 1,
            None => relationship.version = 1,
        }
        records.insert(key, relationship.clone());
        Ok(relationship)
    }

    fn remove(&self, key: &RelationKey) -> CoreResult<Relationship> {
        self.records
            .write()
            .remove(key)
            .ok_or_else(|| CoreError::NotFound { key: key.clone() })
    }

    fn list_for_material(&self, material_id: &str) -> CoreResult<Vec<Relationship>> {
        Ok(self.collect_sorted(|rel| rel.material_id == material_id))
    }

    fn list_for_partner(&self, partner_id: &PartnerId) -> CoreResult<Vec<Relationship>> {
        Ok(self.collect_sorted(|rel| rel.partner_id == *partner_id))
    }

    fn list_all(&self) -> CoreResult<Vec<Relationship>> {
        Ok(self.collect_sorted(|_| true))
    }
}
