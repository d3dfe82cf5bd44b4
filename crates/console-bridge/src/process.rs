//! Console Process Runner
//!
//! Runs one console command per call and turns it into a `CommandResult`.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ldfleet_core::{LdError, Result};

/// A program plus its arguments.
///
/// Arguments are passed to the child verbatim. Quoting only affects how the
/// command is rendered for logs and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Arg {
    value: String,
    quoted: bool,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(Arg {
            value: arg.to_string(),
            quoted: false,
        });
        self
    }

    /// Argument that may contain spaces (paths, bridge commands)
    pub fn quoted_arg(mut self, arg: impl ToString) -> Self {
        self.args.push(Arg {
            value: arg.to_string(),
            quoted: true,
        });
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.value.as_str())
    }

    /// First argument, i.e. the console subcommand
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(|a| a.value.as_str())
    }

    /// Arguments rendered without the program, e.g. `quit --index 3`
    pub fn subcommand_line(&self) -> String {
        self.args
            .iter()
            .map(|a| {
                if a.quoted {
                    format!("\"{}\"", a.value)
                } else {
                    a.value.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.program.display())
        } else {
            write!(f, "{} {}", self.program.display(), self.subcommand_line())
        }
    }
}

/// Exit code and stdout lines of one finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub output_lines: Vec<String>,
}

impl CommandResult {
    pub fn new(exit_code: i32, output_lines: Vec<String>) -> Self {
        Self {
            exit_code,
            output_lines,
        }
    }

    /// Exit 0, no output
    pub fn ok() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn lines(exit_code: i32, lines: &[&str]) -> Self {
        Self::new(exit_code, lines.iter().map(|l| l.to_string()).collect())
    }

    pub fn has_output(&self) -> bool {
        !self.output_lines.is_empty()
    }

    pub fn output(&self) -> String {
        self.output_lines.join("\n")
    }
}

/// Something that can execute a console command
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, command: &CommandLine) -> Result<CommandResult>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

enum Failure {
    Io(io::Error),
    TimedOut(Duration),
    Cancelled,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Kill running commands when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(&self, command: &CommandLine) -> Result<CommandResult> {
        let rendered = command.to_string();
        info!("Execute command '{}'", rendered);

        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("Fail to start command '{}': {}", rendered, e);
                LdError::execution(&rendered, e)
            })?;

        let outcome = {
            let capture = capture(&mut child);
            tokio::select! {
                _ = self.cancel.cancelled() => Err(Failure::Cancelled),
                result = with_timeout(self.timeout, capture) => result,
            }
        };

        match outcome {
            Ok(result) => {
                debug!("Output: {}", result.output());
                debug!("Exit value: {}", result.exit_code);
                Ok(result)
            }
            Err(failure) => {
                terminate(&mut child, &rendered).await;
                Err(match failure {
                    Failure::Io(e) => {
                        error!("Fail to execute command '{}': {}", rendered, e);
                        LdError::execution(&rendered, e)
                    }
                    Failure::TimedOut(limit) => {
                        error!("Command '{}' timed out after {:?}", rendered, limit);
                        LdError::execution(&rendered, format!("timed out after {:?}", limit))
                    }
                    Failure::Cancelled => {
                        warn!("Command '{}' interrupted", rendered);
                        LdError::Interrupted(format!("command '{}' was interrupted", rendered))
                    }
                })
            }
        }
    }
}

async fn with_timeout<F>(timeout: Option<Duration>, capture: F) -> std::result::Result<CommandResult, Failure>
where
    F: std::future::Future<Output = io::Result<CommandResult>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, capture).await {
            Ok(result) => result.map_err(Failure::Io),
            Err(_) => Err(Failure::TimedOut(limit)),
        },
        None => capture.await.map_err(Failure::Io),
    }
}

/// Read stdout to the end, then reap the child.
async fn capture(child: &mut Child) -> io::Result<CommandResult> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdout was not captured"))?;
    let stderr = child.stderr.take();

    let (lines, ()) = tokio::join!(read_lines(stdout), drain_stderr(stderr));
    let lines = lines?;

    let status = child.wait().await?;
    Ok(CommandResult::new(status.code().unwrap_or(-1), lines))
}

async fn read_lines<R: AsyncRead + Unpin>(reader: R) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        lines.push(decode_line(&buf));
    }

    Ok(lines)
}

// ldconsole prints in the system code page; keep what decodes, drop the rest
fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

async fn drain_stderr(stderr: Option<ChildStderr>) {
    let Some(stderr) = stderr else {
        return;
    };
    let mut lines = BufReader::new(stderr).split(b'\n');
    while let Ok(Some(line)) = lines.next_segment().await {
        let line = decode_line(&line);
        if !line.is_empty() {
            debug!("stderr: {}", line);
        }
    }
}

async fn terminate(child: &mut Child, rendered: &str) {
    if let Err(e) = child.kill().await {
        warn!("Fail to kill command '{}': {}", rendered, e);
    }
}
