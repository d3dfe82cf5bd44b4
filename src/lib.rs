//! ldfleet - REST control plane for LDPlayer instances
//!
//! Creates, boots, provisions and stops LDPlayer emulator instances by driving
//! `ldconsole`. The work is split across crates:
//!
//! - `ldfleet-core`: errors, configuration and the instance model
//! - `ldfleet-console-bridge`: process runner, ldconsole adapter, `list2` parser
//! - `ldfleet-lifecycle`: creation pipeline, boot/quit waits, per-index locks
//!
//! This crate adds the HTTP surface and process bootstrap.

pub mod api;

pub use ldfleet_console_bridge as console;
pub use ldfleet_core as core;
pub use ldfleet_lifecycle as lifecycle;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ldfleet_core::AppConfig;
use ldfleet_lifecycle::Orchestrator;

/// Orchestrator over the configured ldconsole; `cancel` stops in-flight
/// commands and waits
pub fn build_orchestrator(config: &AppConfig, cancel: CancellationToken) -> Arc<Orchestrator> {
    let console = ldfleet_console_bridge::console_from_config(&config.console, cancel.clone());
    Arc::new(Orchestrator::new(console, config).with_cancellation(cancel))
}
