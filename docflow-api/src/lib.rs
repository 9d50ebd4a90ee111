//! # docflow-api
//!
//! Transport-agnostic request surface for docflow.
//!
//! This crate provides:
//! - Command dispatch from protocol requests to the workflow engine
//! - Service configuration (YAML file + environment overrides)
//! - Mapping of engine and storage failures to protocol error codes

pub mod config;
pub mod error;
pub mod handler;

pub use config::{Config, ConfigError, StorageBackend};
pub use error::ApiError;
pub use handler::{CommandHandler, ServiceInfo};
