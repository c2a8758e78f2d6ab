//! Error Grouping Engine.
//!
//! Ingests raw error events, folds each into a persistent error group keyed by
//! `service:error_type`, tracks the group's OPEN/RESOLVED lifecycle, and lets an
//! external text generator attach a title and summary.
//!
//! The fold (event append + group upsert) is one atomic store operation; group
//! state is never cached in process.

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod normalize;
pub mod providers;
pub mod resolution;
pub mod sample;
pub mod state;
pub mod store;
pub mod summary;
pub mod types;

pub use config::Config;
pub use engine::ClusteringEngine;
pub use error::{EngineError, StoreError};
pub use handlers::router;
pub use resolution::ResolutionManager;
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Store};
pub use summary::SummaryAttacher;
pub use types::{ErrorEvent, ErrorGroup, GroupStatus, InboundError, Ingested};
