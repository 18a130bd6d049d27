//! In-process collaborators, for tests and for running the pipeline without external infrastructure.
mod broker;
mod store;

pub use broker::MemoryBroker;
pub use store::MemoryStore;
