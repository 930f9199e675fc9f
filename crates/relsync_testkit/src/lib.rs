//! # relsync testkit
//!
//! Test utilities for relsync.
//!
//! This crate provides:
//! - Relationship builders and a wired-up engine harness
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relsync_testkit::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn publishes_after_resolution() {
//!     let harness = TestHarness::new(MockResolver::answering(SAMPLE_IDENTIFIER), MockPublisher::new());
//!     let rel = harness.seed(unresolved_supplier("M1"));
//!     let report = harness.coordinator.on_relationship_created(&rel).publish.await.unwrap();
//!     assert!(report.is_success());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use relsync_engine::{MockPublisher, MockResolver};
}

pub use fixtures::*;
pub use generators::*;
