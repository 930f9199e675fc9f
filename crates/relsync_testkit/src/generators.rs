//! Property-based test generators using proptest.
//!
//! Provides strategies for relationships, identifiers and the timing of
//! remote collaborators.

use proptest::prelude::*;
use relsync_core::{MaterialFlags, PartnerId, Relationship};
use uuid::Uuid;

/// Strategy for generating partner ids.
pub fn partner_id_strategy() -> impl Strategy<Value = PartnerId> {
    prop::array::uniform16(any::<u8>()).prop_map(|bytes| PartnerId::from_uuid(Uuid::from_bytes(bytes)))
}

/// Strategy for generating material ids.
pub fn material_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("M[0-9A-Z]{1,11}").expect("Invalid regex")
}

/// Strategy for generating well-formed partner identifiers.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::array::uniform16(any::<u8>())
            .prop_map(|bytes| format!("urn:uuid:{}", Uuid::from_bytes(bytes).hyphenated())),
        prop::array::uniform16(any::<u8>())
            .prop_map(|bytes| Uuid::from_bytes(bytes).hyphenated().to_string()),
        prop::string::string_regex("[a-z0-9]{1,16}")
            .expect("Invalid regex")
            .prop_map(|nss| format!("urn:uuid:{nss}")),
    ]
}

/// Strategy for generating relationships with arbitrary roles and flags.
///
/// The version is always zero, so generated values can be inserted directly.
pub fn relationship_strategy() -> impl Strategy<Value = Relationship> {
    (
        material_id_strategy(),
        partner_id_strategy(),
        any::<(bool, bool, bool, bool)>(),
        prop::option::of(identifier_strategy()),
        prop::option::of(prop::string::string_regex("P-[0-9]{1,6}").expect("Invalid regex")),
    )
        .prop_map(
            |(material_id, partner_id, (material, product, supplies, buys), identifier, number)| {
                let mut rel = Relationship::new(material_id, partner_id)
                    .with_material_flags(MaterialFlags::new(material, product));
                rel.supplies_material = supplies;
                rel.buys_material = buys;
                rel.partner_identifier = identifier;
                rel.partner_material_number = number;
                rel
            },
        )
}

/// Strategy for generating an update: the previous state and the new one
/// for the same key.
pub fn update_strategy() -> impl Strategy<Value = (Relationship, Relationship)> {
    (relationship_strategy(), any::<(bool, bool)>()).prop_map(|(previous, (supplies, buys))| {
        let mut updated = previous.clone();
        updated.supplies_material = supplies;
        updated.buys_material = buys;
        (previous, updated)
    })
}

/// Timing of scripted collaborators in one scenario.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Latency of every resolver call in milliseconds.
    pub resolver_latency_ms: u64,
    /// Resolver failures before the first success.
    pub resolver_failures: usize,
    /// Latency of every publisher call in milliseconds.
    pub publisher_latency_ms: u64,
    /// Delay before a second mutation is reported, in milliseconds.
    pub second_mutation_after_ms: u64,
}

/// Strategy for generating collaborator timings that still let the default
/// fetch budget succeed.
pub fn timing_strategy() -> impl Strategy<Value = Timing> {
    (0u64..3_000, 0usize..4, 0u64..500, 0u64..12_000).prop_map(
        |(resolver_latency_ms, resolver_failures, publisher_latency_ms, second_mutation_after_ms)| {
            Timing {
                resolver_latency_ms,
                resolver_failures,
                publisher_latency_ms,
                second_mutation_after_ms,
            }
        },
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
