//! Validation of partner identifiers.
//!
//! Resolvers hand back whatever the partner answered. Only bare UUIDs and
//! URNs are accepted as identifiers; anything else is treated as a rejected
//! response by the caller.

use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

static URN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:urn):[a-zA-Z0-9][a-zA-Z0-9-]{1,31}:(?:[a-zA-Z0-9()+,.:=@;$_!*'/?#-]|%[0-9a-fA-F]{2})+$")
        .expect("URN pattern must compile")
});

/// Returns true if `value` is a bare hyphenated UUID.
pub fn is_uuid(value: &str) -> bool {
    value.len() == 36 && Uuid::try_parse(value).is_ok()
}

/// Returns true if `value` is a well-formed partner identifier: a UUID or a
/// URN of the form `urn:<nid>:<nss>`.
pub fn is_well_formed_identifier(value: &str) -> bool {
    is_uuid(value) || URN_PATTERN.is_match(value)
}
