//! ldfleet Core - Shared types, configuration and errors
//!
//! This crate holds what every other ldfleet crate agrees on: the error
//! taxonomy, the configuration file, and the instance data model.

pub mod config;
pub mod creation;
pub mod error;
pub mod instance;

pub use config::{AppConfig, ConsoleConfig, CreationConfig, PollingConfig, ServerConfig};
pub use creation::{CreationRequest, ProxySettings, RawCreation};
pub use error::{LdError, Result};
pub use instance::{Instance, InstanceState, InstanceStatus};

/// ldfleet version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "ldfleet";
