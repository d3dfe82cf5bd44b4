//! ldconsole Bridge
//!
//! Runs ldconsole commands and turns their exit codes and output into typed
//! results.

pub mod console;
pub mod list;
pub mod process;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use console::{Action, LdConsole, Modify, SuccessPolicy, GLOBAL_NAMESPACE};
pub use list::{parse_list2, LIST2_COLUMNS};
pub use process::{CommandLine, CommandResult, CommandRunner, ProcessRunner};

use std::sync::Arc;

use ldfleet_core::ConsoleConfig;
use tokio_util::sync::CancellationToken;

/// Console backed by real child processes, cancelled with `cancel`
pub fn console_from_config(config: &ConsoleConfig, cancel: CancellationToken) -> LdConsole {
    let runner = ProcessRunner::new()
        .with_timeout(config.command_timeout())
        .with_cancellation(cancel);
    LdConsole::new(config.program.clone(), Arc::new(runner))
}
