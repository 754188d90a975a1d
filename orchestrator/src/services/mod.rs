//! Service implementations
//!
//! Concrete implementations of the collaborator traits. These handle the
//! actual I/O: environment inspection, provider HTTP calls, and checkpoint
//! persistence.

pub mod caller;
pub mod checkpoint;
pub mod drift_source;
pub mod registry;

mod tests;

pub use caller::{HttpProviderCaller, SyntheticCaller};
pub use checkpoint::{FileCheckpointStore, InMemoryCheckpointStore};
pub use drift_source::StaticDriftSource;
pub use registry::{EnvProviderRegistry, StaticProviderRegistry};
