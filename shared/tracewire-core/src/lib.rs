//! Tracewire Core - Shared error types and configuration
//!
//! This crate provides:
//! - The `ServiceError` taxonomy used by services wrapped with tracewire
//! - Environment-driven alerting configuration

pub mod config;
pub mod error;

pub use config::{AlertingConfig, ProviderEndpoint};
pub use error::{Result, ServiceError};
