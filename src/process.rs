//! External command execution.
//!
//! [`SystemRunner`] spawns a child with piped streams, feeds the optional
//! input on a helper thread, drains stdout and stderr on helper threads so a
//! full pipe cannot stall the child, and polls for exit. When a timeout is
//! given and elapses, the child is killed and the outcome is reported with
//! [`CommandOutput::timed_out`] set rather than as an error. The same deadline
//! bounds the wait for the helper threads, so a background grandchild holding
//! a pipe open cannot block the caller past the timeout.

use std::fmt;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ProcessError;

/// Tracing target for command execution.
const PROCESS_TARGET: &str = "svcconf::process";

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of one command invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal or timed out
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// The command exceeded its timeout and was killed
    pub timed_out: bool,
}

impl CommandOutput {
    /// Output of a command that exited normally
    pub fn exited(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// Output of a command killed after its timeout elapsed
    pub fn killed_after_timeout() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }

    pub fn stdout_lines(&self) -> Vec<String> {
        self.stdout.lines().map(str::to_string).collect()
    }
}

/// Runs external commands
pub trait CommandRunner {
    /// Run `command`, writing `input` to its stdin when given. With a
    /// `timeout`, a child still running when it elapses is killed.
    fn run(
        &self,
        command: &CommandSpec,
        input: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ProcessError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(
        &self,
        command: &CommandSpec,
        input: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ProcessError> {
        (**self).run(command, input, timeout)
    }
}

/// [`CommandRunner`] backed by `std::process`
#[derive(Debug, Clone)]
pub struct SystemRunner {
    poll_interval: Duration,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Set how often a running child is polled for exit
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        command: &CommandSpec,
        input: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ProcessError> {
        let program = command.program();

        debug!(
            target: PROCESS_TARGET,
            command = %command,
            input_bytes = input.map_or(0, str::len),
            timeout_ms = timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            "spawning command"
        );

        let mut child = Command::new(program)
            .args(command.arguments())
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ProcessError::spawn(program, err))?;

        let deadline = timeout.map(|limit| Instant::now() + limit);
        let writer = match (child.stdin.take(), input) {
            (Some(stdin), Some(text)) => Some(spawn_writer(stdin, text.to_owned())),
            _ => None,
        };
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = match timeout {
            Some(limit) => wait_with_timeout(program, &mut child, limit, self.poll_interval)?,
            None => Some(child.wait().map_err(|err| ProcessError::io(program, err))?),
        };

        let Some(status) = status else {
            warn!(
                target: PROCESS_TARGET,
                command = %command,
                "command timed out, process killed"
            );
            return Ok(CommandOutput::killed_after_timeout());
        };

        if let Some(writer) = writer {
            // A child may exit without reading all of its input.
            if let Err(err) = join_until(program, writer, deadline, self.poll_interval) {
                debug!(
                    target: PROCESS_TARGET,
                    command = %command,
                    error = %err,
                    "stdin not fully written"
                );
            }
        }

        let stdout = collect(program, stdout, deadline, self.poll_interval)?;
        let stderr = collect(program, stderr, deadline, self.poll_interval)?;
        let timed_out = stdout.is_none() || stderr.is_none();
        if timed_out {
            warn!(
                target: PROCESS_TARGET,
                command = %command,
                "output still open after exit, readers detached"
            );
        }

        let output = CommandOutput {
            status: status.code(),
            stdout: stdout.unwrap_or_default(),
            stderr: stderr.unwrap_or_default(),
            timed_out,
        };

        debug!(
            target: PROCESS_TARGET,
            command = %command,
            status = ?output.status,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "command exited"
        );

        Ok(output)
    }
}

fn spawn_writer(
    mut stdin: impl Write + Send + 'static,
    text: String,
) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        stdin.write_all(text.as_bytes())?;
        stdin.flush()
        // stdin is dropped here, closing the pipe
    })
}

fn spawn_reader(mut stream: impl Read + Send + 'static) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    })
}

fn join<T>(program: &str, handle: JoinHandle<io::Result<T>>) -> Result<T, ProcessError> {
    handle
        .join()
        .map_err(|_| ProcessError::io(program, io::Error::other("pipe thread panicked")))?
        .map_err(|err| ProcessError::io(program, err))
}

/// Join a helper thread, giving up at `deadline`. A thread still running by
/// then is detached and `None` is returned.
fn join_until<T>(
    program: &str,
    handle: JoinHandle<io::Result<T>>,
    deadline: Option<Instant>,
    poll_interval: Duration,
) -> Result<Option<T>, ProcessError> {
    if let Some(deadline) = deadline {
        while !handle.is_finished() {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(poll_interval.min(deadline - now));
        }
    }
    join(program, handle).map(Some)
}

/// Output of a reader thread; `None` when it overran `deadline`
fn collect(
    program: &str,
    reader: Option<JoinHandle<io::Result<String>>>,
    deadline: Option<Instant>,
    poll_interval: Duration,
) -> Result<Option<String>, ProcessError> {
    match reader {
        Some(handle) => join_until(program, handle, deadline, poll_interval),
        None => Ok(Some(String::new())),
    }
}

/// Poll the child until it exits or `timeout` elapses. Returns `None` after
/// killing a child that overran.
fn wait_with_timeout(
    program: &str,
    child: &mut Child,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Option<ExitStatus>, ProcessError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    drop(child.kill());
                    drop(child.wait());
                    return Ok(None);
                }
                thread::sleep(poll_interval.min(timeout.saturating_sub(start.elapsed())));
            }
            Err(err) => return Err(ProcessError::io(program, err)),
        }
    }
}
