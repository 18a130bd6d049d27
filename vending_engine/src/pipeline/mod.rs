//! The message-driven core.
//!
//! Raw broker messages enter through the [`TopicRouter`], which classifies them by topic. Every message is appended
//! to the [`LogStore`] before it is handed on: device heartbeats and state reports update the [`DeviceRegistry`],
//! order intents go to the [`Reconciler`]. Operator commands leave through the [`CommandDispatcher`].
//!
//! [`VendingPipeline`] wires these together and is the only type most callers need.
pub mod config;
mod device_registry;
mod dispatcher;
mod errors;
mod log_store;
pub mod payloads;
mod reconciler;
mod topic_router;
pub mod topics;
mod vending_pipeline;

pub use config::PipelineConfig;
pub use device_registry::DeviceRegistry;
pub use dispatcher::{CommandDispatcher, DeviceCommand, CHANGE_TEMPERATURE, DISPENSE_PRODUCT, SET_STATUS};
pub use errors::{CommandError, IngestError, RejectReason};
pub use log_store::LogStore;
pub use reconciler::{Reconciler, Resolution, TokenStatus};
pub use topic_router::{Route, TopicRouter};
pub use vending_pipeline::{report_ingest_error, Accepted, DeviceUpdate, VendingPipeline, INGEST_ERRORS_TARGET};
