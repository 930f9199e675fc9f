//! Partner identity lookup.

use crate::types::PartnerId;
use std::collections::HashMap;

/// Resolves business partner numbers (BPNL) for our own site and for partners.
///
/// Injected at construction time; implementations must be fully initialized
/// before they are handed out.
pub trait PartnerDirectory: Send + Sync {
    /// Returns our own BPNL.
    fn own_bpnl(&self) -> &str;

    /// Returns the BPNL of a partner, if known.
    fn bpnl_of(&self, partner: &PartnerId) -> Option<String>;
}

/// A directory backed by a fixed map.
#[derive(Debug, Clone)]
pub struct StaticPartnerDirectory {
    own_bpnl: String,
    partners: HashMap<PartnerId, String>,
}

impl StaticPartnerDirectory {
    /// Creates a directory that knows only our own BPNL.
    pub fn new(own_bpnl: impl Into<String>) -> Self {
        Self {
            own_bpnl: own_bpnl.into(),
            partners: HashMap::new(),
        }
    }

    /// Registers a partner.
    pub fn with_partner(mut self, partner: PartnerId, bpnl: impl Into<String>) -> Self {
        self.partners.insert(partner, bpnl.into());
        self
    }
}

impl PartnerDirectory for StaticPartnerDirectory {
    fn own_bpnl(&self) -> &str {
        &self.own_bpnl
    }

    fn bpnl_of(&self, partner: &PartnerId) -> Option<String> {
        self.partners.get(partner).cloned()
    }
}
