//! Error types for ldfleet
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for ldfleet
#[derive(Error, Debug)]
pub enum LdError {
    /// The console process could not be started or its output could not be read.
    #[error("Fail to execute command '{command}': {reason}")]
    Execution { command: String, reason: String },

    /// A wait was cancelled before the awaited condition held.
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// The console ran, but its exit code or output broke the action's contract.
    #[error("{message}")]
    Domain {
        message: String,
        command: Option<String>,
        output: Vec<String>,
    },

    #[error("Instance not found: index {0}")]
    NotFound(i32),

    #[error("Timeout: {0}")]
    WaitTimeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Result type alias for ldfleet operations
pub type Result<T> = std::result::Result<T, LdError>;

impl LdError {
    /// Domain failure that is not tied to a single command invocation
    pub fn domain(message: impl Into<String>) -> Self {
        LdError::Domain {
            message: message.into(),
            command: None,
            output: Vec::new(),
        }
    }

    /// Domain failure carrying the offending command line and its captured output
    pub fn domain_for(message: impl Into<String>, command: impl Into<String>, output: &[String]) -> Self {
        LdError::Domain {
            message: message.into(),
            command: Some(command.into()),
            output: output.to_vec(),
        }
    }

    pub fn execution(command: impl Into<String>, reason: impl ToString) -> Self {
        LdError::Execution {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the three lifecycle failure kinds surfaced by the console layer
    pub fn is_lifecycle_failure(&self) -> bool {
        matches!(
            self,
            LdError::Execution { .. } | LdError::Interrupted(_) | LdError::Domain { .. }
        )
    }

    /// Message with the command and its output appended, for logs and API bodies
    pub fn detailed_message(&self) -> String {
        match self {
            LdError::Domain {
                message,
                command: Some(command),
                output,
            } => {
                if output.is_empty() {
                    format!("{} (command '{}')", message, command)
                } else {
                    format!("{} (command '{}'): {}", message, command, output.join("\n"))
                }
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_detailed_message() {
        let err = LdError::domain_for(
            "Fail to quit index 2",
            "ldconsole quit --index 2",
            &["player not found".to_string()],
        );
        assert_eq!(err.to_string(), "Fail to quit index 2");
        assert_eq!(
            err.detailed_message(),
            "Fail to quit index 2 (command 'ldconsole quit --index 2'): player not found"
        );
        assert!(err.is_lifecycle_failure());
    }

    #[test]
    fn test_not_found_is_not_lifecycle_failure() {
        assert!(!LdError::NotFound(4).is_lifecycle_failure());
        assert_eq!(LdError::NotFound(4).to_string(), "Instance not found: index 4");
    }
}
