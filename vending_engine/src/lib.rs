//! Vending Engine
//!
//! The vending engine coordinates vending machines that talk over a publish/subscribe message broker with a
//! transactional order and inventory backend. It consumes raw broker messages (device heartbeats, state reports and
//! client order intents), turns them into consistent state, and republishes order outcomes.
//!
//! The library is divided into these main sections:
//! 1. The pipeline ([`mod@pipeline`]). The topic router, message log store, device registry, order reconciliation engine
//!    and command dispatcher, wired together by [`VendingPipeline`].
//! 2. Collaborator contracts ([`mod@traits`]). The pipeline never talks to the relational store or to the broker
//!    directly. Backends implement these traits and are handed to the pipeline when it is constructed.
//! 3. Backends. [`SqliteStore`] is the durable backend. The [`mod@memory`] module holds an in-process store and broker
//!    for tests and local development.
//!
//! The engine also emits events when an order intent is resolved. See [`mod@events`] for how to hook into them.
pub mod events;
pub mod memory;
pub mod pipeline;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
pub mod vm_types;

pub use pipeline::{
    CommandError,
    IngestError,
    PipelineConfig,
    RejectReason,
    Resolution,
    TokenStatus,
    VendingPipeline,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteStore, SqliteStoreError};
pub use traits::{
    AccountManagement,
    CatalogManagement,
    MessagePublisher,
    OrderManagement,
    PublishError,
    SettleOrderResult,
    StoreError,
    VendingBackend,
};
