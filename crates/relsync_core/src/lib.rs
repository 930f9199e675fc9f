//! # relsync core
//!
//! Master-data layer for material-partner relationships.
//!
//! This crate provides:
//! - The relationship data model (keys, role flags, partner identifiers)
//! - The [`RelationStore`] trait with optimistic versioning and an in-memory store
//! - Validation of partner identifiers returned by remote resolvers
//! - The [`RelationService`] that persists mutations and notifies listeners
//!
//! ## Key Invariants
//!
//! - A relationship is keyed by `(material_id, partner_id)`
//! - The partner identifier is only meaningful when the partner supplies the material
//! - Every stored update bumps the relationship version; stale writes are rejected
//! - Listeners are notified after the mutation is stored, never before

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod error;
mod identifier;
mod service;
mod store;
mod types;

pub use directory::{PartnerDirectory, StaticPartnerDirectory};
pub use error::{CoreError, CoreResult};
pub use identifier::{is_uuid, is_well_formed_identifier};
pub use service::{RelationListener, RelationService};
pub use store::{InMemoryRelationStore, RelationStore};
pub use types::{FlagInconsistency, MaterialFlags, PartnerId, RelationKey, Relationship};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
