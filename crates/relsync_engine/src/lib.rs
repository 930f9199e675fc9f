//! # relsync engine
//!
//! Background synchronization of material-partner relationships with remote
//! partners and the shared registry.
//!
//! This crate provides:
//! - Deduplicated identifier fetches with bounded retry ([`FetchCoordinator`])
//! - Publish jobs for material and product descriptors ([`SyncCoordinator`])
//! - A bounded worker pool shared by both
//! - Resolver and publisher abstractions with scripted mocks
//!
//! ## Architecture
//!
//! Mutations are reported to the [`SyncCoordinator`], which returns at once
//! and schedules the work on the runtime:
//! 1. If the partner supplies the material and its identifier is missing,
//!    an identifier fetch is started (or joined if one is already running)
//! 2. The publish job waits for that fetch, reads the stored relationship
//!    again and only then calls the registry
//! 3. Failed attempts are retried after a fixed delay, then reported
//!
//! ## Key Invariants
//!
//! - At most one fetch per relationship is in flight
//! - A material descriptor is never published while the stored
//!   relationship lacks its identifier
//! - Every job ends in a terminal state and every failure is logged
//! - Remote calls are bounded by a timeout

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod fetch;
mod job;
mod pool;
mod remote;
mod stats;

pub use config::{RetryConfig, SyncEngineConfig};
pub use coordinator::{publish_kind_for_update, ScheduledSync, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use fetch::{FetchCoordinator, FetchHandle};
pub use job::{JobState, PublishReport};
pub use pool::WorkerPool;
pub use remote::{
    with_timeout, IdentifierResolver, MockPublisher, MockResolver, PublishCall, PublishKind,
    RegistryPublisher,
};
pub use stats::EngineStats;
