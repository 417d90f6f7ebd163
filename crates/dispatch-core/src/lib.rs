//! Task assignment engine: per-region candidate caches, distance-bucketed
//! search, memoized validity, permission caching, and a priority-ordered
//! provider registry, orchestrated into a single `assign_task` entry point.

pub mod bucket;
pub mod cache;
pub mod candidates;
pub mod engine;
pub mod memo;
pub mod permission;
pub mod provider;
pub mod registry;
pub mod world;

pub use engine::{AssignmentEngine, EngineConfig, ProbeReport, WorldServices};
pub use provider::{FnProvider, ProviderError, WorkProvider};
pub use registry::{ProviderRegistry, RegistrationError};
pub use world::ColonyWorld;
