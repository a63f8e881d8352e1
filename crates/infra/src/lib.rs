//! Infrastructure layer: event store, command pipeline, projections and the
//! `PosService` that ties the catalog and order aggregates together.

pub mod bootstrap;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod services;

pub use config::{ConfigError, EngineConfig};
pub use services::{PosService, ServiceError};

#[cfg(test)]
mod integration_tests;
