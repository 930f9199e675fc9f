//! Relationship service.
//!
//! The service is the only place where relationships are created or
//! updated on behalf of the application. Every successful mutation is
//! reported to the registered [`RelationListener`] so that externally
//! visible state can be brought in line asynchronously.

use crate::directory::PartnerDirectory;
use crate::error::{CoreError, CoreResult};
use crate::store::RelationStore;
use crate::types::{FlagInconsistency, PartnerId, RelationKey, Relationship};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Receives relationship mutations after they were stored.
///
/// Implementations must return promptly; any remote work belongs on
/// background tasks.
pub trait RelationListener: Send + Sync {
    /// A new relationship was stored.
    fn relationship_created(&self, relationship: &Relationship);

    /// An existing relationship was replaced.
    fn relationship_updated(&self, previous: &Relationship, updated: &Relationship);
}

/// Application-facing access to relationships.
pub struct RelationService<S: RelationStore> {
    store: Arc<S>,
    directory: Arc<dyn PartnerDirectory>,
    listener: Option<Arc<dyn RelationListener>>,
}

impl<S: RelationStore> RelationService<S> {
    /// Creates a service without a listener.
    pub fn new(store: Arc<S>, directory: Arc<dyn PartnerDirectory>) -> Self {
        Self {
            store,
            directory,
            listener: None,
        }
    }

    /// Registers the listener that is told about every mutation.
    pub fn with_listener(mut self, listener: Arc<dyn RelationListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Stores a new relationship.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyExists`] if the key is taken.
    pub fn create(&self, relationship: Relationship) -> CoreResult<Relationship> {
        self.check_flags(&relationship);
        let key = relationship.key();
        match self.store.find(&key) {
            Ok(_) => {
                error!(key = %key, "could not create relationship, it already exists");
                return Err(CoreError::AlreadyExists { key });
            }
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let mut relationship = relationship;
        relationship.version = 0;
        let stored = self.store.upsert(relationship)?;
        if let Some(listener) = &self.listener {
            listener.relationship_created(&stored);
        }
        Ok(stored)
    }

    /// Replaces an existing relationship with the given fields.
    ///
    /// The incoming record must carry the version it was read at, so a
    /// stale copy can never overwrite fields written since.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the key does not exist, and
    /// [`CoreError::VersionConflict`] if the record changed after the caller
    /// read it.
    pub fn update(&self, relationship: Relationship) -> CoreResult<Relationship> {
        self.check_flags(&relationship);
        let key = relationship.key();
        let previous = self.store.find(&key).inspect_err(|_| {
            error!(key = %key, "could not update relationship, it did not exist before");
        })?;

        let stored = self.store.upsert(relationship).inspect_err(|e| {
            if e.is_version_conflict() {
                warn!(key = %key, error = %e, "rejected update of a stale relationship copy");
            }
        })?;
        if let Some(listener) = &self.listener {
            listener.relationship_updated(&previous, &stored);
        }
        Ok(stored)
    }

    /// Looks up a relationship.
    pub fn find(&self, material_id: &str, partner_id: PartnerId) -> CoreResult<Relationship> {
        self.store.find(&RelationKey::new(material_id, partner_id))
    }

    /// Returns every relationship.
    pub fn find_all(&self) -> CoreResult<Vec<Relationship>> {
        self.store.list_all()
    }

    /// Returns the partners that supply the material.
    pub fn suppliers_of(&self, material_id: &str) -> CoreResult<Vec<PartnerId>> {
        Ok(partners(self.store.list_suppliers_of(material_id)?))
    }

    /// Returns the partners that buy the material.
    pub fn customers_of(&self, material_id: &str) -> CoreResult<Vec<PartnerId>> {
        Ok(partners(self.store.list_consumers_of(material_id)?))
    }

    /// Returns the materials the partner supplies to us.
    pub fn materials_supplied_by(&self, partner_id: &PartnerId) -> CoreResult<Vec<String>> {
        Ok(self
            .store
            .list_for_partner(partner_id)?
            .into_iter()
            .filter(|rel| rel.supplies_material)
            .map(|rel| rel.material_id)
            .collect())
    }

    /// Returns the materials the partner buys from us.
    pub fn products_bought_by(&self, partner_id: &PartnerId) -> CoreResult<Vec<String>> {
        Ok(self
            .store
            .list_for_partner(partner_id)?
            .into_iter()
            .filter(|rel| rel.buys_material)
            .map(|rel| rel.material_id)
            .collect())
    }

    /// Returns every relationship in which the partner uses the given
    /// material number.
    pub fn find_by_partner_material_number(
        &self,
        partner_material_number: &str,
    ) -> CoreResult<Vec<Relationship>> {
        Ok(self
            .store
            .list_all()?
            .into_iter()
            .filter(|rel| rel.partner_material_number.as_deref() == Some(partner_material_number))
            .collect())
    }

    /// Finds the relationship of a partner by the partner's identifier.
    ///
    /// If more than one relationship matches, the first one is returned.
    pub fn find_by_partner_identifier(
        &self,
        partner_id: &PartnerId,
        identifier: &str,
    ) -> CoreResult<Option<Relationship>> {
        let mut matches: Vec<Relationship> = self
            .store
            .list_for_partner(partner_id)?
            .into_iter()
            .filter(|rel| rel.identifier() == Some(identifier))
            .collect();
        if matches.len() > 1 {
            warn!(
                partner = %partner_id,
                identifier,
                count = matches.len(),
                "ambiguous partner identifier"
            );
        }
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        })
    }

    /// Returns true if the partner is registered as supplier of the material.
    pub fn partner_supplies(&self, material_id: &str, partner_id: PartnerId) -> CoreResult<bool> {
        self.role(material_id, partner_id, |rel| {
            rel.material_flags.material && rel.supplies_material
        })
    }

    /// Returns true if the partner is registered as customer of the material.
    pub fn partner_buys(&self, material_id: &str, partner_id: PartnerId) -> CoreResult<bool> {
        self.role(material_id, partner_id, |rel| {
            rel.material_flags.product && rel.buys_material
        })
    }

    /// Maps each BPNL (ours and every partner's) to the material number its
    /// owner uses for the material.
    ///
    /// Returns an empty map if the material has no relationships.
    pub fn partner_material_numbers(&self, material_id: &str) -> CoreResult<BTreeMap<String, String>> {
        let relationships = self.store.list_for_material(material_id)?;
        let mut numbers = BTreeMap::new();
        if relationships.is_empty() {
            return Ok(numbers);
        }

        numbers.insert(self.directory.own_bpnl().to_string(), material_id.to_string());
        for rel in relationships {
            let Some(bpnl) = self.directory.bpnl_of(&rel.partner_id) else {
                warn!(partner = %rel.partner_id, "partner missing from directory");
                continue;
            };
            if let Some(number) = rel.partner_material_number {
                numbers.insert(bpnl, number);
            }
        }
        Ok(numbers)
    }

    fn role<F>(&self, material_id: &str, partner_id: PartnerId, check: F) -> CoreResult<bool>
    where
        F: Fn(&Relationship) -> bool,
    {
        match self.find(material_id, partner_id) {
            Ok(rel) => Ok(check(&rel)),
            Err(CoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn check_flags(&self, relationship: &Relationship) {
        for finding in relationship.flag_inconsistencies() {
            match finding {
                FlagInconsistency::SupplierWithoutMaterialFlag => warn!(
                    material = %relationship.material_id,
                    partner = %relationship.partner_id,
                    "material flag not set, but partner is marked as supplier"
                ),
                FlagInconsistency::CustomerWithoutProductFlag => warn!(
                    material = %relationship.material_id,
                    partner = %relationship.partner_id,
                    "product flag not set, but partner is marked as customer"
                ),
            }
        }
    }
}

fn partners(relationships: Vec<Relationship>) -> Vec<PartnerId> {
    relationships.into_iter().map(|rel| rel.partner_id).collect()
}
