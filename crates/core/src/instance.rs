//! Instance Types
//!
//! What ldconsole reports about an LDPlayer instance, and what ldfleet hands
//! back to its callers.

use serde::{Deserialize, Serialize};

/// One row of `ldconsole list2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStatus {
    /// Index assigned by ldconsole, unique among live instances
    pub index: i32,
    /// Window title
    pub title: String,
    /// Android finished booting
    pub android_ready: bool,
}

/// An LDPlayer instance as seen by API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    pub index: i32,
    pub running: bool,
    pub android_ready: bool,
}

impl Instance {
    /// Combine a listing row with a fresh running check
    pub fn from_status(status: InstanceStatus, running: bool) -> Self {
        Self {
            name: status.title,
            index: status.index,
            running,
            android_ready: status.android_ready,
        }
    }

    /// Observed lifecycle state
    pub fn state(&self) -> InstanceState {
        match (self.running, self.android_ready) {
            (false, _) => InstanceState::Created,
            (true, false) => InstanceState::Booting,
            (true, true) => InstanceState::Ready,
        }
    }
}

/// Lifecycle state derived from a running check and the ready flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    /// Exists but not running
    Created,
    /// Running, Android still booting
    Booting,
    /// Running and Android ready
    Ready,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Created => "created",
            InstanceState::Booting => "booting",
            InstanceState::Ready => "ready",
        }
    }
}
