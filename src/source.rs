//! Line-sequence source and sink.
//!
//! Everything above this module only sees lines: the parser reads them from a
//! [`Locator`] and the serializer hands back a full text blob to write.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SourceError;
use crate::process::{CommandRunner, CommandSpec, SystemRunner};

/// Tracing target for text source operations.
const SOURCE_TARGET: &str = "svcconf::source";

/// Where a sequence of lines comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Contents of a file
    File(PathBuf),
    /// Captured standard output of a command
    Command(CommandSpec),
}

impl Locator {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Locator::File(path.into())
    }

    pub fn command(command: CommandSpec) -> Self {
        Locator::Command(command)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::File(path) => write!(f, "{}", path.display()),
            Locator::Command(command) => write!(f, "cmd:{}", command),
        }
    }
}

/// Reads and writes raw configuration text
pub trait TextSource {
    /// Ordered raw lines, terminators removed
    fn read_lines(&self, locator: &Locator) -> Result<Vec<String>, SourceError>;

    /// Overwrite a file's full contents
    fn write_all(&self, path: &Path, text: &str) -> Result<(), SourceError>;
}

impl<T: TextSource + ?Sized> TextSource for &T {
    fn read_lines(&self, locator: &Locator) -> Result<Vec<String>, SourceError> {
        (**self).read_lines(locator)
    }

    fn write_all(&self, path: &Path, text: &str) -> Result<(), SourceError> {
        (**self).write_all(path, text)
    }
}

/// [`TextSource`] over the local filesystem and real commands
#[derive(Debug, Clone, Default)]
pub struct SystemSource<R = SystemRunner> {
    runner: R,
}

impl SystemSource {
    pub fn new() -> Self {
        Self {
            runner: SystemRunner::new(),
        }
    }
}

impl<R: CommandRunner> SystemSource<R> {
    /// Use a specific runner for command locators
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> TextSource for SystemSource<R> {
    fn read_lines(&self, locator: &Locator) -> Result<Vec<String>, SourceError> {
        match locator {
            Locator::File(path) => {
                let content =
                    fs::read_to_string(path).map_err(|err| SourceError::io(path.clone(), err))?;
                debug!(
                    target: SOURCE_TARGET,
                    path = %path.display(),
                    bytes = content.len(),
                    "read file"
                );
                Ok(content.lines().map(str::to_string).collect())
            }
            Locator::Command(command) => {
                let output = self
                    .runner
                    .run(command, None, None)
                    .map_err(|err| SourceError::command(command.to_string(), err.to_string()))?;
                if !output.success() {
                    return Err(SourceError::command(
                        command.to_string(),
                        format!(
                            "exit status {:?}: {}",
                            output.status,
                            output.stderr.trim()
                        ),
                    ));
                }
                Ok(output.stdout_lines())
            }
        }
    }

    fn write_all(&self, path: &Path, text: &str) -> Result<(), SourceError> {
        fs::write(path, text).map_err(|err| SourceError::io(path, err))?;
        debug!(target: SOURCE_TARGET, path = %path.display(), bytes = text.len(), "wrote file");
        Ok(())
    }
}
