//! ldconsole Client
//!
//! Encodes ldconsole subcommands and decides, per subcommand, whether a
//! finished command succeeded. ldconsole is not consistent about this:
//!
//! | Action        | Success when                                   |
//! |---------------|------------------------------------------------|
//! | `copy`        | exit >= 0 (the new index) and no output        |
//! | `installapp`  | exit 0 and no output                           |
//! | `isrunning`   | exit 0 and exactly one line                    |
//! | `launch`      | no output if exit is 0; non-zero exit is fine  |
//! | `list2`       | exit 0                                         |
//! | `modify`      | exit 0 and no output                           |
//! | `push`        | exit 0 and no output                           |
//! | put setting   | exit 0 and no output                           |
//! | `reboot`      | exit 0 and no output                           |
//! | `quit`        | exit 0 and no output                           |
//! | `adb`         | always; ldconsole swallows adb's exit code     |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error};

use ldfleet_core::{InstanceStatus, LdError, Result};

use crate::list::parse_list2;
use crate::process::{CommandLine, CommandResult, CommandRunner};

/// ldconsole actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Copy,
    InstallApp,
    IsRunning,
    Launch,
    List,
    Modify,
    Push,
    PutSetting,
    Reboot,
    Quit,
    Adb,
}

/// How a finished command is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessPolicy {
    /// Exit code carries a value and must not be negative; no output
    NonNegativeExitNoOutput,
    /// Exit 0 and no output
    ZeroExitNoOutput,
    /// Exit 0 and exactly one output line
    ZeroExitSingleLine,
    /// Output must be empty when exit is 0; other exit codes pass
    NoOutputOnZeroExit,
    /// Exit 0, any output
    ZeroExit,
    /// Exit code and output are not trusted
    Unchecked,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::Copy,
        Action::InstallApp,
        Action::IsRunning,
        Action::Launch,
        Action::List,
        Action::Modify,
        Action::Push,
        Action::PutSetting,
        Action::Reboot,
        Action::Quit,
        Action::Adb,
    ];

    /// ldconsole subcommand carrying this action
    pub fn subcommand(self) -> &'static str {
        match self {
            Action::Copy => "copy",
            Action::InstallApp => "installapp",
            Action::IsRunning => "isrunning",
            Action::Launch => "launch",
            Action::List => "list2",
            Action::Modify => "modify",
            Action::Push => "push",
            Action::PutSetting | Action::Adb => "adb",
            Action::Reboot => "reboot",
            Action::Quit => "quit",
        }
    }

    pub fn policy(self) -> SuccessPolicy {
        match self {
            Action::Copy => SuccessPolicy::NonNegativeExitNoOutput,
            Action::InstallApp => SuccessPolicy::ZeroExitNoOutput,
            Action::IsRunning => SuccessPolicy::ZeroExitSingleLine,
            Action::Launch => SuccessPolicy::NoOutputOnZeroExit,
            Action::List => SuccessPolicy::ZeroExit,
            Action::Modify => SuccessPolicy::ZeroExitNoOutput,
            Action::Push => SuccessPolicy::ZeroExitNoOutput,
            Action::PutSetting => SuccessPolicy::ZeroExitNoOutput,
            Action::Reboot => SuccessPolicy::ZeroExitNoOutput,
            Action::Quit => SuccessPolicy::ZeroExitNoOutput,
            Action::Adb => SuccessPolicy::Unchecked,
        }
    }
}

impl SuccessPolicy {
    pub fn accepts(self, result: &CommandResult) -> bool {
        let exit = result.exit_code;
        let lines = result.output_lines.len();
        match self {
            SuccessPolicy::NonNegativeExitNoOutput => exit >= 0 && lines == 0,
            SuccessPolicy::ZeroExitNoOutput => exit == 0 && lines == 0,
            SuccessPolicy::ZeroExitSingleLine => exit == 0 && lines == 1,
            SuccessPolicy::NoOutputOnZeroExit => exit != 0 || lines == 0,
            SuccessPolicy::ZeroExit => exit == 0,
            SuccessPolicy::Unchecked => true,
        }
    }
}

/// Android settings namespace used for the global HTTP proxy
pub const GLOBAL_NAMESPACE: &str = "global";

/// ldconsole client
#[derive(Clone)]
pub struct LdConsole {
    program: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl LdConsole {
    /// Create a client for the ldconsole at `program`
    pub fn new(program: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, action: Action) -> CommandLine {
        CommandLine::new(&self.program).arg(action.subcommand())
    }

    /// Run `command` and hold the result against `action`'s policy
    async fn run(
        &self,
        action: Action,
        command: CommandLine,
        failure: impl FnOnce() -> String,
    ) -> Result<CommandResult> {
        let result = self.runner.execute(&command).await?;
        if action.policy().accepts(&result) {
            return Ok(result);
        }

        let message = failure();
        error!(
            "{} (exit {}): {}",
            message,
            result.exit_code,
            result.output()
        );
        Err(LdError::domain_for(message, command.to_string(), &result.output_lines))
    }

    /// Copy instance `from_index` under `name`; returns the new index
    pub async fn copy(&self, name: &str, from_index: i32) -> Result<i32> {
        let command = self
            .command(Action::Copy)
            .arg("--name")
            .arg(name)
            .arg("--from")
            .arg(from_index);
        let result = self
            .run(Action::Copy, command, || {
                format!("Fail to copy from index {}", from_index)
            })
            .await?;
        Ok(result.exit_code)
    }

    /// Install an apk from the host
    pub async fn install_app(&self, index: i32, apk_path: &Path) -> Result<()> {
        let command = self
            .command(Action::InstallApp)
            .arg("--index")
            .arg(index)
            .arg("--filename")
            .quoted_arg(apk_path.display());
        self.run(Action::InstallApp, command, || {
            format!("Fail to install {} to index {}", apk_path.display(), index)
        })
        .await?;
        Ok(())
    }

    /// Whether the emulator process is up (not whether Android booted)
    pub async fn is_running(&self, index: i32) -> Result<bool> {
        let command = self
            .command(Action::IsRunning)
            .arg("--index")
            .arg(index);
        let result = self
            .run(Action::IsRunning, command, || {
                format!("Fail to check run status for index {}", index)
            })
            .await?;
        Ok(result.output_lines.first().is_some_and(|line| line == "running"))
    }

    /// Start the emulator; returns before Android boots
    pub async fn launch(&self, index: i32) -> Result<()> {
        let command = self.command(Action::Launch).arg("--index").arg(index);
        let result = self
            .run(Action::Launch, command, || {
                format!("Fail to launch index {}", index)
            })
            .await?;
        if result.exit_code != 0 {
            debug!("launch --index {} exited with {}", index, result.exit_code);
        }
        Ok(())
    }

    /// Status of every instance ldconsole knows about
    pub async fn list_all(&self) -> Result<Vec<InstanceStatus>> {
        parse_list2(&self.list_lines().await?)
    }

    /// Unparsed `list2` output, one entry per line
    pub async fn list_lines(&self) -> Result<Vec<String>> {
        let command = self.command(Action::List);
        let result = self
            .run(Action::List, command, || "list failed".to_string())
            .await?;
        Ok(result.output_lines)
    }

    /// Start a `modify` for `index`
    pub fn modify(&self, index: i32) -> Modify<'_> {
        Modify {
            console: self,
            index,
            manufacturer: None,
            model: None,
        }
    }

    /// Copy a host file into the instance
    pub async fn push(&self, index: i32, local_path: &Path, remote_path: &str) -> Result<()> {
        let command = self
            .command(Action::Push)
            .arg("--index")
            .arg(index)
            .arg("--remote")
            .quoted_arg(remote_path)
            .arg("--local")
            .quoted_arg(local_path.display());
        self.run(Action::Push, command, || {
            format!(
                "Fail to push index {} from local {} to remote {}",
                index,
                local_path.display(),
                remote_path
            )
        })
        .await?;
        Ok(())
    }

    /// `settings put <namespace> <key> <value>` through the adb bridge
    pub async fn put_setting(&self, index: i32, namespace: &str, key: &str, value: &str) -> Result<()> {
        let command = self
            .command(Action::PutSetting)
            .arg("--index")
            .arg(index)
            .arg("--command")
            .quoted_arg(format!("shell settings put {} {} {}", namespace, key, value));
        self.run(Action::PutSetting, command, || {
            format!(
                "Fail to put setting for index={}, namespace={}, key={}, value={}",
                index, namespace, key, value
            )
        })
        .await?;
        Ok(())
    }

    /// Raw adb bridge command; the output is returned unjudged
    pub async fn adb(&self, index: i32, adb_command: &str) -> Result<Vec<String>> {
        let command = self
            .command(Action::Adb)
            .arg("--index")
            .arg(index)
            .arg("--command")
            .quoted_arg(adb_command);
        let result = self
            .run(Action::Adb, command, || {
                format!("Fail to run adb command on index {}", index)
            })
            .await?;
        Ok(result.output_lines)
    }

    pub async fn reboot(&self, index: i32) -> Result<()> {
        let command = self.command(Action::Reboot).arg("--index").arg(index);
        self.run(Action::Reboot, command, || {
            format!("Fail to reboot index {}", index)
        })
        .await?;
        Ok(())
    }

    pub async fn quit(&self, index: i32) -> Result<()> {
        let command = self.command(Action::Quit).arg("--index").arg(index);
        self.run(Action::Quit, command, || format!("Fail to quit index {}", index))
            .await?;
        Ok(())
    }
}

/// Builder for `ldconsole modify`; blank values are left out
pub struct Modify<'a> {
    console: &'a LdConsole,
    index: i32,
    manufacturer: Option<String>,
    model: Option<String>,
}

impl<'a> Modify<'a> {
    pub fn manufacturer(mut self, manufacturer: Option<&str>) -> Self {
        self.manufacturer = manufacturer
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string);
        self
    }

    pub fn model(mut self, model: Option<&str>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty()).map(str::to_string);
        self
    }

    pub async fn run(self) -> Result<()> {
        let index = self.index;
        let mut command = self
            .console
            .command(Action::Modify)
            .arg("--index")
            .arg(index);
        if let Some(ref manufacturer) = self.manufacturer {
            command = command.arg("--manufacturer").arg(manufacturer);
        }
        if let Some(ref model) = self.model {
            command = command.arg("--model").arg(model);
        }

        self.console
            .run(Action::Modify, command, || format!("Fail to modify index {}", index))
            .await?;
        Ok(())
    }
}
