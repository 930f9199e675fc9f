//! Relationship data model.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque handle for a trading partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartnerId(Uuid);

impl PartnerId {
    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generates a random partner ID.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero partner ID.
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store key of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    /// Our own material number.
    pub material_id: String,
    /// The partner on the other side.
    pub partner_id: PartnerId,
}

impl RelationKey {
    /// Creates a new key.
    pub fn new(material_id: impl Into<String>, partner_id: PartnerId) -> Self {
        Self {
            material_id: material_id.into(),
            partner_id,
        }
    }
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.material_id, self.partner_id)
    }
}

/// Roles the material itself plays at our site.
///
/// `material` means we buy it from suppliers, `product` means we sell it
/// to customers. Both may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaterialFlags {
    /// We purchase this material.
    pub material: bool,
    /// We sell this material as a product.
    pub product: bool,
}

impl MaterialFlags {
    /// Creates flags from both roles.
    #[must_use]
    pub const fn new(material: bool, product: bool) -> Self {
        Self { material, product }
    }
}

/// A role flag on the relationship that the material flags do not back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagInconsistency {
    /// Partner is marked as supplier, but the material flag is not set.
    SupplierWithoutMaterialFlag,
    /// Partner is marked as customer, but the product flag is not set.
    CustomerWithoutProductFlag,
}

/// A material-partner relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Our own material number.
    pub material_id: String,
    /// The partner.
    pub partner_id: PartnerId,
    /// Roles of the material at our site.
    #[serde(default)]
    pub material_flags: MaterialFlags,
    /// The partner supplies this material to us.
    #[serde(default)]
    pub supplies_material: bool,
    /// The partner buys this material from us.
    #[serde(default)]
    pub buys_material: bool,
    /// The partner's canonical identifier for the material.
    #[serde(default)]
    pub partner_identifier: Option<String>,
    /// The partner's own material number.
    #[serde(default)]
    pub partner_material_number: Option<String>,
    /// Store-managed version, 0 until first stored.
    #[serde(default)]
    pub version: u64,
}

impl Relationship {
    /// Creates a relationship with no roles set.
    pub fn new(material_id: impl Into<String>, partner_id: PartnerId) -> Self {
        Self {
            material_id: material_id.into(),
            partner_id,
            material_flags: MaterialFlags::default(),
            supplies_material: false,
            buys_material: false,
            partner_identifier: None,
            partner_material_number: None,
            version: 0,
        }
    }

    /// Marks the partner as supplier of the material.
    ///
    /// Also sets the material flag, since we buy what a supplier delivers.
    pub fn supplier(mut self) -> Self {
        self.supplies_material = true;
        self.material_flags.material = true;
        self
    }

    /// Marks the partner as customer of the material.
    ///
    /// Also sets the product flag.
    pub fn customer(mut self) -> Self {
        self.buys_material = true;
        self.material_flags.product = true;
        self
    }

    /// Overrides the material flags.
    pub fn with_material_flags(mut self, flags: MaterialFlags) -> Self {
        self.material_flags = flags;
        self
    }

    /// Sets the partner identifier.
    pub fn with_partner_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.partner_identifier = Some(identifier.into());
        self
    }

    /// Sets the partner's own material number.
    pub fn with_partner_material_number(mut self, number: impl Into<String>) -> Self {
        self.partner_material_number = Some(number.into());
        self
    }

    /// Returns the store key.
    pub fn key(&self) -> RelationKey {
        RelationKey::new(self.material_id.clone(), self.partner_id)
    }

    /// Returns the partner identifier if it is present and non-empty.
    pub fn identifier(&self) -> Option<&str> {
        self.partner_identifier
            .as_deref()
            .filter(|identifier| !identifier.is_empty())
    }

    /// Returns true if the partner supplies the material but its identifier
    /// has not been resolved yet.
    pub fn needs_identifier(&self) -> bool {
        self.supplies_material && self.identifier().is_none()
    }

    /// Checks the relationship roles against the material flags.
    pub fn flag_inconsistencies(&self) -> Vec<FlagInconsistency> {
        let mut found = Vec::new();
        if self.supplies_material && !self.material_flags.material {
            found.push(FlagInconsistency::SupplierWithoutMaterialFlag);
        }
        if self.buys_material && !self.material_flags.product {
            found.push(FlagInconsistency::CustomerWithoutProductFlag);
        }
        found
    }
}
