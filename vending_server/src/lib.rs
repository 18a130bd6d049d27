//! # Vending pipeline server
//! This crate hosts the service that sits between the vending machines on the MQTT broker and the order database.
//! It is responsible for:
//! * Subscribing to device heartbeats, state reports, order intents and order outcomes, and feeding them into a
//!   [`VendingPipeline`](vending_engine::VendingPipeline).
//! * Publishing order outcomes and operator commands back to the broker.
//! * Serving the polling API that dashboards and operators use.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `GET /api/devices`: The device snapshot, with liveness evaluated at request time.
//! * `DELETE /api/devices/{code}`: Evicts a device from the registry.
//! * `GET /api/logs/{category}?since=&limit=`: Log entries received after `since`.
//! * `POST /api/orders/intent`: Publishes an order intent. Returns 202 with the correlation token.
//! * `GET /api/orders/intent/{token}`: The outcome of an order intent, if known.
//! * `POST /api/machines/{code}/command`: Sends an operator command to a machine.
//! * `GET /api/stats`: Outcome counters and pipeline gauges.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod maintenance_worker;
pub mod mqtt;
pub mod routes;
pub mod server;
pub mod stats;

#[cfg(test)]
mod endpoint_tests;
