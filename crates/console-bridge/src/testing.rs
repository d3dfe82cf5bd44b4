//! Scripted Console
//!
//! In-memory `CommandRunner` that answers per subcommand from a queue and
//! records every command it was given.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ldfleet_core::{LdError, Result};

use crate::process::{CommandLine, CommandResult, CommandRunner};

#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<Result<CommandResult>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response for `subcommand`. Responses are used in order and the
    /// last one keeps answering.
    pub fn respond(&self, subcommand: &str, result: CommandResult) -> &Self {
        self.push(subcommand, Ok(result))
    }

    /// Queue a runner-level failure for `subcommand`
    pub fn fail(&self, subcommand: &str, error: LdError) -> &Self {
        self.push(subcommand, Err(error))
    }

    fn push(&self, subcommand: &str, response: Result<CommandResult>) -> &Self {
        self.scripts
            .lock()
            .entry(subcommand.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Every command seen so far, rendered without the program
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Commands seen for one subcommand
    pub fn calls_to(&self, subcommand: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.split(' ').next() == Some(subcommand))
            .cloned()
            .collect()
    }

    pub fn count(&self, subcommand: &str) -> usize {
        self.calls_to(subcommand).len()
    }
}

fn replay(response: &Result<CommandResult>, command: &CommandLine) -> Result<CommandResult> {
    match response {
        Ok(result) => Ok(result.clone()),
        Err(LdError::Interrupted(msg)) => Err(LdError::Interrupted(msg.clone())),
        Err(other) => Err(LdError::execution(command.to_string(), other)),
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(&self, command: &CommandLine) -> Result<CommandResult> {
        self.calls.lock().push(command.subcommand_line());

        let subcommand = command.subcommand().unwrap_or_default().to_string();
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(&subcommand);
        match queue {
            Some(queue) if queue.len() > 1 => match queue.pop_front() {
                Some(response) => response,
                None => Err(LdError::execution(command.to_string(), "script exhausted")),
            },
            Some(queue) => match queue.front() {
                Some(response) => replay(response, command),
                None => Err(LdError::execution(command.to_string(), "script exhausted")),
            },
            None => Err(LdError::execution(
                command.to_string(),
                format!("no scripted response for '{}'", subcommand),
            )),
        }
    }
}
