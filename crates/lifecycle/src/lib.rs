//! Instance Lifecycle
//!
//! Creation, boot and shutdown workflows for LDPlayer instances, built on the
//! ldconsole bridge.

pub mod locks;
pub mod orchestrator;
pub mod wait;

pub use locks::{IndexGuard, IndexLocks};
pub use orchestrator::{remote_cert_path, Orchestrator, CACERTS_DIR};
pub use wait::{FirstCheck, PollSpec, Poller};
