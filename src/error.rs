use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias for config tree operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for service orchestration
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised by the config tree edit API
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Directive, entry or section not present in the tree
    #[error("configuration key '{key}' not found")]
    KeyNotFound { key: String },

    /// Operation does not apply to the node's kind of value
    #[error("type error for '{key}': expected {expected}, found {found}")]
    TypeError {
        key: String,
        expected: String,
        found: String,
    },

    /// Custom error with message
    #[error("{message}")]
    Custom { message: String },
}

impl ConfigError {
    /// Create a key not found error
    pub fn key_not_found(key: impl Into<String>) -> Self {
        ConfigError::KeyNotFound { key: key.into() }
    }

    /// Create a type error
    pub fn type_error(
        key: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        ConfigError::TypeError {
            key: key.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a custom error
    pub fn custom(message: impl Into<String>) -> Self {
        ConfigError::Custom {
            message: message.into(),
        }
    }
}

/// Errors raised by a [`TextSource`](crate::TextSource)
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// A file could not be read or written
    #[error("I/O error for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A command locator could not produce its output
    #[error("command '{command}' failed: {message}")]
    Command { command: String, message: String },
}

impl SourceError {
    /// Create an I/O error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Create a command error
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the file simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SourceError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Errors raised while running an external command
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// The child process could not be started
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Communication with the child failed
    #[error("I/O error communicating with '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl ProcessError {
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        ProcessError::Spawn {
            program: program.into(),
            source: Arc::new(source),
        }
    }

    pub fn io(program: impl Into<String>, source: std::io::Error) -> Self {
        ProcessError::Io {
            program: program.into(),
            source: Arc::new(source),
        }
    }
}

/// Errors raised by the service config manager
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A profile pattern (stderr denylist, stamp rule) failed to compile
    #[error("invalid profile pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A control action (start, stop, ...) reported failure
    #[error("service '{service}' {action} failed: {output}")]
    ControlFailed {
        service: String,
        action: String,
        output: String,
    },

    /// The dry-run apply rejected the candidate configuration
    #[error("validation failed for '{service}' (exit code {exit_code:?}): {stderr}")]
    ValidationFailed {
        service: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Restoring the pre-validation state did not succeed
    #[error("service '{service}' could not be restored after validation: {message}")]
    HealFailed { service: String, message: String },
}

impl ServiceError {
    pub fn control_failed(
        service: impl Into<String>,
        action: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        ServiceError::ControlFailed {
            service: service.into(),
            action: action.into(),
            output: output.into(),
        }
    }
}
