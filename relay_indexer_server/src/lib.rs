//! # Relay indexer server
//! This crate hosts the relay indexer as a standalone service. It is responsible for:
//! * Starting the fill, spend and order consumers that apply queued messages to the order index.
//! * Accepting those messages over HTTP and queuing them.
//! * Serving the indexed state of individual orders.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/metrics`: Indexer counters and channel statistics.
//! * `/orders/{hash}`: The indexed record for an order.
//! * `/fills`, `/spends`, `/orders` (POST): Queue a message for the corresponding consumer.

pub mod cli;
pub mod config;
pub mod errors;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
