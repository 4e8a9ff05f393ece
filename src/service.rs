//! Service config manager.
//!
//! [`ServiceManager`] keeps three things in step for one service: the config
//! file on disk, an editable [`ConfigTree`], and the live state reported by the
//! service's dump command. All external effects go through a [`TextSource`]
//! and a [`CommandRunner`], so the whole protocol can be driven against a fake
//! service in tests.
//!
//! The one mandatory recovery step is in [`ServiceManager::validate`]: a
//! dry-run apply is always followed by healing, either replaying the live state
//! captured before the test or stopping a service that was stopped on entry.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use regex::{NoExpand, Regex};
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult, SourceError};
use crate::options::{DirectiveSet, FormatOptions, ParserOptions};
use crate::parser::ConfigParser;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::serializer::{Rendered, Serializer};
use crate::source::{Locator, TextSource};
use crate::tree::ConfigTree;

/// Tracing target for service orchestration.
const SERVICE_TARGET: &str = "svcconf::service";

/// Wall-clock limit for a dry-run apply
pub const DEFAULT_VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Verbs accepted by a service control command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Condrestart,
    Status,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Restart => "restart",
            ControlAction::Condrestart => "condrestart",
            ControlAction::Status => "status",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one control action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    pub success: bool,
    /// Raw output lines, stdout first
    pub output: Vec<String>,
}

impl ControlOutcome {
    fn from_output(output: &CommandOutput) -> Self {
        let mut lines = output.stdout_lines();
        lines.extend(output.stderr.lines().map(str::to_string));
        Self {
            success: output.success(),
            output: lines,
        }
    }
}

/// Rewrites a generated stamp line (`# Generated by ... on <date>`) on write.
#[derive(Debug, Clone)]
pub struct StampRule {
    pattern: Regex,
    stamp: String,
}

impl StampRule {
    /// Lines matching `pattern` are replaced by `stamp` followed by the
    /// current timestamp
    pub fn new(pattern: &str, stamp: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            stamp: stamp.into(),
        })
    }

    pub fn apply(&self, line: &str, now: &str) -> Option<String> {
        if !self.pattern.is_match(line) {
            return None;
        }
        let replacement = format!("{}{}", self.stamp, now);
        Some(
            self.pattern
                .replace_all(line, NoExpand(&replacement))
                .into_owned(),
        )
    }
}

/// Everything the manager needs to know about one service.
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    /// Service name, used in logs and errors
    pub name: String,

    /// Persisted configuration file
    pub config_path: PathBuf,

    /// Prints the live state in config grammar on stdout
    pub dump: CommandSpec,

    /// Reads config text on stdin and applies it
    pub apply: CommandSpec,

    /// Argument that turns `apply` into a dry run
    pub test_flag: String,

    /// Control command; the action verb is appended as its last argument
    pub control: CommandSpec,

    pub validate_timeout: Duration,

    /// Fragments removed from dry-run stderr
    pub stderr_denylist: Vec<Regex>,

    pub stamp_rules: Vec<StampRule>,

    pub directives: DirectiveSet,
    /// Parser options; the footer marker always follows `format`
    pub parser: ParserOptions,
    pub format: FormatOptions,
}

impl ServiceProfile {
    pub fn new(
        name: impl Into<String>,
        config_path: impl Into<PathBuf>,
        dump: CommandSpec,
        apply: CommandSpec,
        control: CommandSpec,
    ) -> Self {
        let name = name.into();
        Self {
            format: FormatOptions::default().with_module(name.clone()),
            name,
            config_path: config_path.into(),
            dump,
            apply,
            test_flag: "--test".to_string(),
            control,
            validate_timeout: DEFAULT_VALIDATE_TIMEOUT,
            stderr_denylist: Vec::new(),
            stamp_rules: Vec::new(),
            directives: DirectiveSet::default(),
            parser: ParserOptions::default(),
        }
    }

    pub fn with_test_flag(mut self, flag: impl Into<String>) -> Self {
        self.test_flag = flag.into();
        self
    }

    pub fn with_validate_timeout(mut self, timeout: Duration) -> Self {
        self.validate_timeout = timeout;
        self
    }

    /// Add stderr fragments to strip, as regular expressions
    pub fn with_stderr_denylist<I, S>(mut self, patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.stderr_denylist.push(Regex::new(pattern.as_ref())?);
        }
        Ok(self)
    }

    pub fn with_stamp_rule(mut self, rule: StampRule) -> Self {
        self.stamp_rules.push(rule);
        self
    }

    pub fn with_directives(mut self, directives: DirectiveSet) -> Self {
        self.directives = directives;
        self
    }

    pub fn with_parser_options(mut self, options: ParserOptions) -> Self {
        self.parser = options;
        self
    }

    pub fn with_format(mut self, format: FormatOptions) -> Self {
        self.format = format;
        self
    }

    /// Parser for this service; it drops the footer `format` writes
    pub fn config_parser(&self) -> ConfigParser {
        ConfigParser::with_options(
            self.directives.clone(),
            self.parser.clone().with_footer_of(&self.format),
        )
    }

    pub fn serializer(&self) -> Serializer {
        Serializer::new(self.directives.clone(), self.format.clone())
    }

    fn test_command(&self) -> CommandSpec {
        self.apply.clone().arg(self.test_flag.clone())
    }

    fn control_command(&self, action: ControlAction) -> CommandSpec {
        self.control.clone().arg(action.as_str())
    }

    /// Strip denylisted fragments; lines left blank are dropped
    pub fn filter_stderr(&self, stderr: &str) -> String {
        stderr
            .split(['\r', '\n'])
            .map(|line| {
                self.stderr_denylist
                    .iter()
                    .fold(line.to_string(), |acc, pattern| {
                        pattern.replace_all(&acc, "").into_owned()
                    })
            })
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Refresh stamp lines with `now`
    pub fn apply_stamps(&self, lines: Vec<String>, now: &str) -> Vec<String> {
        if self.stamp_rules.is_empty() {
            return lines;
        }
        lines
            .into_iter()
            .map(|line| {
                self.stamp_rules
                    .iter()
                    .find_map(|rule| rule.apply(&line, now))
                    .unwrap_or(line)
            })
            .collect()
    }
}

/// How validation left the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealOutcome {
    /// The live state captured before the dry run was applied again
    Restored,
    /// The service was stopped on entry and has been stopped again
    Stopped,
    /// Healing did not complete
    Failed(String),
}

/// Outcome of a dry-run apply. Never an error: failures are data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    /// Stderr with denylisted fragments removed
    pub stderr: String,
    pub timed_out: bool,
    pub heal: HealOutcome,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn is_healed(&self) -> bool {
        !matches!(self.heal, HealOutcome::Failed(_))
    }
}

/// Config file and live state, parsed with the same grammar
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceSnapshot {
    pub config: ConfigTree,
    pub live: ConfigTree,
}

/// Result of [`ServiceManager::inspect`]
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    pub config: ConfigTree,
    pub live: ConfigTree,
    /// Dry-run result for the on-disk file; `None` when it could not be read
    pub lint: Option<ValidationReport>,
}

/// Direction of [`ServiceManager::sync`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Restart the service from the config file
    ConfigToLive,
    /// Capture live state and write it to the config file
    LiveToConfig,
}

/// Steps of one reconciliation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Reading,
    Validating,
    Healed,
    LeftStopped,
    Writing,
    Restarting,
}

/// Drives the read, validate, apply and sync protocol for one service.
///
/// Callers must not run two cycles against the same service at once.
#[derive(Debug)]
pub struct ServiceManager<S, R> {
    profile: ServiceProfile,
    source: S,
    runner: R,
    parser: ConfigParser,
    serializer: Serializer,
    tree: ConfigTree,
    /// The tree was loaded or edited by the caller
    loaded: bool,
    state: CycleState,
    trail: Vec<CycleState>,
    timestamp: Option<String>,
}

impl<S: TextSource, R: CommandRunner> ServiceManager<S, R> {
    pub fn new(profile: ServiceProfile, source: S, runner: R) -> Self {
        Self {
            parser: profile.config_parser(),
            serializer: profile.serializer(),
            profile,
            source,
            runner,
            tree: ConfigTree::new(),
            loaded: false,
            state: CycleState::Idle,
            trail: Vec::new(),
            timestamp: None,
        }
    }

    /// Use a fixed timestamp for footers and stamp lines
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        let timestamp = timestamp.into();
        self.serializer = self.serializer.with_timestamp(timestamp.clone());
        self.timestamp = Some(timestamp);
        self
    }

    pub fn profile(&self) -> &ServiceProfile {
        &self.profile
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ConfigTree {
        self.loaded = true;
        &mut self.tree
    }

    pub fn set_tree(&mut self, tree: ConfigTree) {
        self.tree = tree;
        self.loaded = true;
    }

    /// Current step of the reconciliation cycle
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Steps visited by the last [`reconcile`](Self::reconcile), ending in `Idle`
    pub fn last_cycle(&self) -> &[CycleState] {
        &self.trail
    }

    /// Parse the config file and the live state.
    ///
    /// Either side failing yields an empty tree for that side.
    pub fn read(&self) -> ServiceSnapshot {
        let config = self
            .read_config_lines()
            .map(|lines| self.parser.parse_lines(&lines))
            .unwrap_or_default();
        let live = self
            .read_live_lines()
            .map(|lines| self.parser.parse_lines(&lines))
            .unwrap_or_default();
        ServiceSnapshot { config, live }
    }

    /// [`read`](Self::read) and make the config tree the editable tree
    pub fn reload(&mut self) -> ServiceSnapshot {
        let snapshot = self.read();
        self.tree = snapshot.config.clone();
        self.loaded = true;
        snapshot
    }

    /// [`read`](Self::read) plus a dry run of the on-disk file
    pub fn inspect(&self) -> Inspection {
        let lint = self
            .read_config_lines()
            .ok()
            .map(|lines| self.validate(&join_lines(&lines)));
        let snapshot = self.read();
        Inspection {
            config: snapshot.config,
            live: snapshot.live,
            lint,
        }
    }

    /// Dry-run `candidate` through the apply command, then heal.
    ///
    /// A service running on entry has its previously dumped live state
    /// applied again; a service stopped on entry is stopped again. The
    /// report always carries the heal outcome.
    pub fn validate(&self, candidate: &str) -> ValidationReport {
        let was_running = self.is_running();
        let prior = if was_running {
            self.read_live_lines()
        } else {
            Ok(Vec::new())
        };

        let test = self.profile.test_command();
        let mut report = match self.runner.run(
            &test,
            Some(candidate),
            Some(self.profile.validate_timeout),
        ) {
            Ok(output) => ValidationReport {
                exit_code: output.status,
                stdout: output.stdout,
                stderr: self.profile.filter_stderr(&output.stderr),
                timed_out: output.timed_out,
                heal: HealOutcome::Restored,
            },
            Err(err) => ValidationReport {
                exit_code: None,
                stdout: String::new(),
                stderr: err.to_string(),
                timed_out: false,
                heal: HealOutcome::Restored,
            },
        };

        if report.timed_out {
            warn!(
                target: SERVICE_TARGET,
                service = %self.profile.name,
                timeout = ?self.profile.validate_timeout,
                "dry run timed out"
            );
        }

        report.heal = if was_running {
            self.restore(prior)
        } else {
            match self.control(ControlAction::Stop) {
                Ok(outcome) if outcome.success => HealOutcome::Stopped,
                Ok(outcome) => HealOutcome::Failed(outcome.output.join("\n")),
                Err(err) => HealOutcome::Failed(err.to_string()),
            }
        };

        match &report.heal {
            HealOutcome::Failed(message) => warn!(
                target: SERVICE_TARGET,
                service = %self.profile.name,
                message = %message,
                "service not healed after dry run"
            ),
            heal => info!(
                target: SERVICE_TARGET,
                service = %self.profile.name,
                heal = ?heal,
                valid = report.is_valid(),
                "dry run finished"
            ),
        }

        report
    }

    /// Serialize the editable tree to the config file, then condrestart
    pub fn apply(&self) -> ServiceResult<()> {
        self.write_config()?;
        self.expect_success(ControlAction::Condrestart)?;
        Ok(())
    }

    /// Bring config file and live state together; `false` on any failure
    pub fn sync(&mut self, direction: SyncDirection) -> bool {
        let result = match direction {
            SyncDirection::ConfigToLive => {
                self.reload();
                self.expect_success(ControlAction::Restart).map(|_| ())
            }
            SyncDirection::LiveToConfig => self.capture_live().and_then(|()| self.apply()),
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    target: SERVICE_TARGET,
                    service = %self.profile.name,
                    direction = ?direction,
                    error = %err,
                    "sync failed"
                );
                false
            }
        }
    }

    /// Validate the editable tree, write it, and condrestart.
    ///
    /// A tree never loaded nor edited is first read from the config file; an
    /// unreadable file ends the cycle before anything runs. Any error returns
    /// the cycle to `Idle` without undoing earlier steps.
    pub fn reconcile(&mut self) -> ServiceResult<ValidationReport> {
        self.trail.clear();
        let result = self.run_cycle();
        self.transition(CycleState::Idle);
        result
    }

    fn run_cycle(&mut self) -> ServiceResult<ValidationReport> {
        self.transition(CycleState::Reading);
        if !self.loaded {
            let lines = self.read_config_lines()?;
            self.tree = self.parser.parse_lines(&lines);
            self.loaded = true;
            debug!(
                target: SERVICE_TARGET,
                service = %self.profile.name,
                nodes = self.tree.len(),
                "loaded config for cycle"
            );
        }
        let candidate = self.render_config().text();

        self.transition(CycleState::Validating);
        let report = self.validate(&candidate);
        match &report.heal {
            HealOutcome::Restored => self.transition(CycleState::Healed),
            HealOutcome::Stopped => self.transition(CycleState::LeftStopped),
            HealOutcome::Failed(message) => {
                return Err(ServiceError::HealFailed {
                    service: self.profile.name.clone(),
                    message: message.clone(),
                });
            }
        }
        if !report.is_valid() {
            return Err(ServiceError::ValidationFailed {
                service: self.profile.name.clone(),
                exit_code: report.exit_code,
                stderr: report.stderr,
            });
        }

        self.transition(CycleState::Writing);
        self.write_config()?;

        self.transition(CycleState::Restarting);
        self.expect_success(ControlAction::Condrestart)?;

        Ok(report)
    }

    /// Run a control action
    pub fn control(&self, action: ControlAction) -> ServiceResult<ControlOutcome> {
        let command = self.profile.control_command(action);
        let output = self.runner.run(&command, None, None)?;
        let outcome = ControlOutcome::from_output(&output);
        debug!(
            target: SERVICE_TARGET,
            service = %self.profile.name,
            action = %action,
            success = outcome.success,
            "control action"
        );
        Ok(outcome)
    }

    pub fn start(&self) -> ServiceResult<ControlOutcome> {
        self.control(ControlAction::Start)
    }

    pub fn stop(&self) -> ServiceResult<ControlOutcome> {
        self.control(ControlAction::Stop)
    }

    pub fn restart(&self) -> ServiceResult<ControlOutcome> {
        self.control(ControlAction::Restart)
    }

    pub fn condrestart(&self) -> ServiceResult<ControlOutcome> {
        self.control(ControlAction::Condrestart)
    }

    pub fn status(&self) -> ServiceResult<ControlOutcome> {
        self.control(ControlAction::Status)
    }

    /// Whether the status action reports success
    pub fn is_running(&self) -> bool {
        self.status().is_ok_and(|outcome| outcome.success)
    }

    /// Text the config file would receive, stamps refreshed
    pub fn render_config(&self) -> Rendered {
        let mut rendered = self.serializer.render(&self.tree);
        rendered.lines = self.profile.apply_stamps(rendered.lines, &self.now());
        rendered
    }

    fn write_config(&self) -> ServiceResult<()> {
        let rendered = self.render_config();
        for reason in &rendered.skipped {
            debug!(
                target: SERVICE_TARGET,
                service = %self.profile.name,
                reason = ?reason,
                "node not written"
            );
        }
        self.source
            .write_all(&self.profile.config_path, &rendered.text())?;
        Ok(())
    }

    fn capture_live(&mut self) -> ServiceResult<()> {
        let lines = self.read_live_lines()?;
        self.tree = self.parser.parse_lines(&lines);
        self.loaded = true;
        Ok(())
    }

    fn restore(&self, prior: Result<Vec<String>, SourceError>) -> HealOutcome {
        let lines = match prior {
            Ok(lines) => lines,
            Err(err) => return HealOutcome::Failed(format!("live state not captured: {}", err)),
        };

        let text = join_lines(&lines);

        match self.runner.run(
            &self.profile.apply,
            Some(&text),
            Some(self.profile.validate_timeout),
        ) {
            Ok(output) if output.success() => HealOutcome::Restored,
            Ok(output) if output.timed_out => HealOutcome::Failed("replay timed out".to_string()),
            Ok(output) => HealOutcome::Failed(format!(
                "replay exited with {:?}: {}",
                output.status,
                output.stderr.trim()
            )),
            Err(err) => HealOutcome::Failed(err.to_string()),
        }
    }

    fn expect_success(&self, action: ControlAction) -> ServiceResult<ControlOutcome> {
        let outcome = self.control(action)?;
        if !outcome.success {
            return Err(ServiceError::control_failed(
                self.profile.name.clone(),
                action.as_str(),
                outcome.output.join("\n"),
            ));
        }
        Ok(outcome)
    }

    fn read_config_lines(&self) -> Result<Vec<String>, SourceError> {
        self.read_tolerant(&Locator::file(self.config_path()))
    }

    fn read_live_lines(&self) -> Result<Vec<String>, SourceError> {
        self.read_tolerant(&Locator::command(self.profile.dump.clone()))
    }

    fn read_tolerant(&self, locator: &Locator) -> Result<Vec<String>, SourceError> {
        self.source.read_lines(locator).inspect_err(|err| {
            debug!(
                target: SERVICE_TARGET,
                service = %self.profile.name,
                locator = %locator,
                error = %err,
                "read failed"
            );
        })
    }

    fn config_path(&self) -> &Path {
        &self.profile.config_path
    }

    fn now(&self) -> String {
        self.timestamp
            .clone()
            .unwrap_or_else(|| Local::now().format("%c").to_string())
    }

    fn transition(&mut self, next: CycleState) {
        debug!(
            target: SERVICE_TARGET,
            service = %self.profile.name,
            from = ?self.state,
            to = ?next,
            "cycle transition"
        );
        self.state = next;
        self.trail.push(next);
    }
}

/// Lines back to text, newline terminated unless empty
fn join_lines(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::options::UnknownLinePolicy;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory service: files, a live state, and scripted dry-run results
    #[derive(Default)]
    struct FakeService {
        files: RefCell<HashMap<PathBuf, String>>,
        live: RefCell<String>,
        running: RefCell<bool>,
        reject: bool,
        dump_fails: bool,
        replay_fails: bool,
        stop_fails: bool,
        calls: RefCell<Vec<String>>,
    }

    impl TextSource for FakeService {
        fn read_lines(&self, locator: &Locator) -> Result<Vec<String>, SourceError> {
            match locator {
                Locator::File(path) => self
                    .files
                    .borrow()
                    .get(path)
                    .map(|text| text.lines().map(str::to_string).collect())
                    .ok_or_else(|| {
                        SourceError::io(path, std::io::Error::from(std::io::ErrorKind::NotFound))
                    }),
                Locator::Command(command) if self.dump_fails => {
                    Err(SourceError::command(command.to_string(), "exit status 1"))
                }
                Locator::Command(_) => Ok(self.live.borrow().lines().map(str::to_string).collect()),
            }
        }

        fn write_all(&self, path: &Path, text: &str) -> Result<(), SourceError> {
            self.files.borrow_mut().insert(path.to_path_buf(), text.to_string());
            Ok(())
        }
    }

    impl CommandRunner for FakeService {
        fn run(
            &self,
            command: &CommandSpec,
            input: Option<&str>,
            _timeout: Option<Duration>,
        ) -> Result<CommandOutput, ProcessError> {
            self.calls.borrow_mut().push(command.to_string());
            let args = command.arguments();
            let output = match command.program() {
                "ctl" => {
                    let running = *self.running.borrow();
                    match args.last().map(String::as_str) {
                        Some("status") => {
                            CommandOutput::exited(if running { 0 } else { 3 }, "", "")
                        }
                        Some("stop") if self.stop_fails => CommandOutput::exited(1, "busy", ""),
                        Some("stop") => {
                            *self.running.borrow_mut() = false;
                            CommandOutput::exited(0, "stopped", "")
                        }
                        Some(_) => {
                            *self.running.borrow_mut() = true;
                            CommandOutput::exited(0, "ok", "")
                        }
                        None => CommandOutput::exited(2, "", "usage"),
                    }
                }
                "restore" if args.iter().any(|a| a == "--test") => {
                    // A dry run that clobbers live state, as a buggy tool might
                    *self.live.borrow_mut() = "Clobbered yes\n".to_string();
                    if self.reject {
                        CommandOutput::exited(1, "", "restore v1.8: line 2 failed\n")
                    } else {
                        CommandOutput::exited(0, "", "")
                    }
                }
                "restore" if self.replay_fails => {
                    CommandOutput::exited(1, "", "restore v1.8: replay rejected\n")
                }
                "restore" => {
                    *self.live.borrow_mut() = input.unwrap_or_default().to_string();
                    CommandOutput::exited(0, "", "")
                }
                _ => CommandOutput::exited(127, "", "not found"),
            };
            Ok(output)
        }
    }

    fn profile() -> ServiceProfile {
        ServiceProfile::new(
            "demo",
            "/etc/demo.conf",
            CommandSpec::new("dump"),
            CommandSpec::new("restore"),
            CommandSpec::new("ctl"),
        )
        .with_format(FormatOptions::compact())
        .with_stderr_denylist(["restore v[0-9.]+: "])
        .unwrap()
    }

    fn running_service(live: &str) -> FakeService {
        let fake = FakeService::default();
        *fake.live.borrow_mut() = live.to_string();
        *fake.running.borrow_mut() = true;
        fake
    }

    #[test]
    fn test_read_tolerates_missing_file() {
        let fake = running_service("Foo 1\n");
        let manager = ServiceManager::new(profile(), &fake, &fake);

        let snapshot = manager.read();
        assert!(snapshot.config.is_empty());
        assert_eq!(snapshot.live.value("Foo"), Some("1"));
    }

    #[test]
    fn test_validate_restores_live_state() {
        let fake = running_service("Foo 1\n");
        let manager = ServiceManager::new(profile(), &fake, &fake);

        let report = manager.validate("Foo 2\n");
        assert!(report.is_valid());
        assert_eq!(report.heal, HealOutcome::Restored);
        assert_eq!(*fake.live.borrow(), "Foo 1\n");
    }

    #[test]
    fn test_validate_failure_is_reported_and_healed() {
        let fake = FakeService {
            reject: true,
            ..running_service("Foo 1\n")
        };
        let manager = ServiceManager::new(profile(), &fake, &fake);

        let report = manager.validate("garbage\n");
        assert!(!report.is_valid());
        assert_eq!(report.exit_code, Some(1));
        assert_eq!(report.stderr, "line 2 failed");
        assert!(report.is_healed());
        assert_eq!(*fake.live.borrow(), "Foo 1\n");
    }

    #[test]
    fn test_validate_stops_inactive_service() {
        let fake = FakeService::default();
        let manager = ServiceManager::new(profile(), &fake, &fake);

        let report = manager.validate("Foo 1\n");
        assert_eq!(report.heal, HealOutcome::Stopped);
        assert!(fake.calls.borrow().contains(&"ctl stop".to_string()));
        assert!(!*fake.running.borrow());
    }

    #[test]
    fn test_apply_writes_and_condrestarts() {
        let fake = running_service("");
        let mut manager = ServiceManager::new(profile(), &fake, &fake);
        manager.tree_mut().set("Foo", "1").unwrap();

        manager.apply().unwrap();
        assert_eq!(
            fake.files.borrow().get(Path::new("/etc/demo.conf")).unwrap(),
            "Foo 1\n"
        );
        assert_eq!(fake.calls.borrow().last().unwrap(), "ctl condrestart");
    }

    #[test]
    fn test_sync_live_to_config() {
        let fake = running_service("# live\nFoo 7\n");
        let mut manager = ServiceManager::new(profile(), &fake, &fake);

        assert!(manager.sync(SyncDirection::LiveToConfig));
        assert_eq!(
            fake.files.borrow().get(Path::new("/etc/demo.conf")).unwrap(),
            "# live\nFoo 7\n"
        );
        assert_eq!(manager.tree().value("Foo"), Some("7"));
    }

    #[test]
    fn test_sync_config_to_live_restarts() {
        let fake = FakeService::default();
        fake.write_all(Path::new("/etc/demo.conf"), "Foo 3\n").unwrap();
        let mut manager = ServiceManager::new(profile(), &fake, &fake);

        assert!(manager.sync(SyncDirection::ConfigToLive));
        assert_eq!(manager.tree().value("Foo"), Some("3"));
        assert!(*fake.running.borrow());
    }

    #[test]
    fn test_reconcile_state_trail() {
        let fake = running_service("Foo 1\n");
        let mut manager = ServiceManager::new(profile(), &fake, &fake);
        manager.tree_mut().set("Foo", "2").unwrap();

        manager.reconcile().unwrap();
        assert_eq!(
            manager.last_cycle(),
            &[
                CycleState::Reading,
                CycleState::Validating,
                CycleState::Healed,
                CycleState::Writing,
                CycleState::Restarting,
                CycleState::Idle,
            ]
        );
        assert_eq!(manager.state(), CycleState::Idle);
    }

    #[test]
    fn test_reconcile_rejected_candidate_is_not_written() {
        let fake = FakeService {
            reject: true,
            ..running_service("Foo 1\n")
        };
        let mut manager = ServiceManager::new(profile(), &fake, &fake);
        manager.tree_mut().set("Foo", "2").unwrap();

        let err = manager.reconcile().unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed { exit_code: Some(1), .. }));
        assert!(fake.files.borrow().is_empty());
        assert_eq!(manager.last_cycle().last(), Some(&CycleState::Idle));
        assert!(!manager.last_cycle().contains(&CycleState::Writing));
    }

    #[test]
    fn test_stamp_rules() {
        let profile = profile()
            .with_stamp_rule(StampRule::new("(# Completed on ).*", "# Completed on ").unwrap());
        let lines = profile.apply_stamps(
            vec!["# Completed on Mon".to_string(), "COMMIT".to_string()],
            "Tue $1",
        );
        assert_eq!(lines, vec!["# Completed on Tue $1", "COMMIT"]);
    }

    #[test]
    fn test_inspect_lints_config() {
        let fake = running_service("Foo 1\n");
        fake.write_all(Path::new("/etc/demo.conf"), "Foo 2\n").unwrap();
        let profile = profile().with_parser_options(
            ParserOptions::default().with_unknown_lines(UnknownLinePolicy::Passthrough),
        );
        let manager = ServiceManager::new(profile, &fake, &fake);

        let inspection = manager.inspect();
        assert_eq!(inspection.config.value("Foo"), Some("2"));
        assert_eq!(inspection.live.value("Foo"), Some("1"));
        assert!(inspection.lint.unwrap().is_valid());
    }

    #[test]
    fn test_reconcile_loads_untouched_tree_from_config() {
        let fake = running_service("Foo 1\n");
        fake.write_all(Path::new("/etc/demo.conf"), "Foo 1\nBar 2\n").unwrap();
        let mut manager = ServiceManager::new(profile(), &fake, &fake);

        manager.reconcile().unwrap();
        assert_eq!(
            fake.files.borrow().get(Path::new("/etc/demo.conf")).unwrap(),
            "Foo 1\nBar 2\n"
        );
        assert_eq!(manager.tree().value("Bar"), Some("2"));
    }

    #[test]
    fn test_reconcile_without_config_file_does_nothing() {
        let fake = running_service("Foo 1\n");
        let mut manager = ServiceManager::new(profile(), &fake, &fake);

        let err = manager.reconcile().unwrap_err();
        assert!(matches!(err, ServiceError::Source(_)));
        assert_eq!(manager.last_cycle(), &[CycleState::Reading, CycleState::Idle]);
        assert!(fake.files.borrow().is_empty());
        assert!(fake.calls.borrow().is_empty());
    }

    #[test]
    fn test_heal_fails_when_live_state_not_captured() {
        let fake = FakeService {
            dump_fails: true,
            ..running_service("Foo 1\n")
        };
        let manager = ServiceManager::new(profile(), &fake, &fake);

        let report = manager.validate("Foo 2\n");
        assert!(matches!(
            &report.heal,
            HealOutcome::Failed(message) if message.starts_with("live state not captured")
        ));
        assert!(!report.is_healed());
        assert!(!fake.calls.borrow().contains(&"restore".to_string()));
    }

    #[test]
    fn test_heal_fails_when_replay_rejected() {
        let fake = FakeService {
            replay_fails: true,
            ..running_service("Foo 1\n")
        };
        let manager = ServiceManager::new(profile(), &fake, &fake);

        let report = manager.validate("Foo 2\n");
        assert!(matches!(
            &report.heal,
            HealOutcome::Failed(message) if message.starts_with("replay exited with Some(1)")
        ));
        assert!(fake.calls.borrow().contains(&"restore".to_string()));
    }

    #[test]
    fn test_heal_fails_when_stop_fails() {
        let fake = FakeService {
            stop_fails: true,
            ..FakeService::default()
        };
        let manager = ServiceManager::new(profile(), &fake, &fake);

        let report = manager.validate("Foo 2\n");
        assert_eq!(report.heal, HealOutcome::Failed("busy".to_string()));
        assert!(!report.is_healed());
    }

    #[test]
    fn test_reconcile_stops_when_heal_fails() {
        let fake = FakeService {
            replay_fails: true,
            ..running_service("Foo 1\n")
        };
        let mut manager = ServiceManager::new(profile(), &fake, &fake);
        manager.tree_mut().set("Foo", "2").unwrap();

        let err = manager.reconcile().unwrap_err();
        assert!(matches!(err, ServiceError::HealFailed { .. }));
        assert_eq!(
            manager.last_cycle(),
            &[CycleState::Reading, CycleState::Validating, CycleState::Idle]
        );
        assert!(fake.files.borrow().is_empty());
        assert!(!fake.calls.borrow().contains(&"ctl condrestart".to_string()));
    }

    #[test]
    fn test_custom_footer_is_not_stacked() {
        let fake = running_service("");
        fake.write_all(Path::new("/etc/demo.conf"), "Foo 1\n").unwrap();
        let profile =
            profile().with_format(FormatOptions::default().with_footer("-- Managed by ops"));
        let mut manager = ServiceManager::new(profile, &fake, &fake)
            .with_timestamp("Thu Jan  1 00:00:00 1970");

        for _ in 0..3 {
            manager.reload();
            manager.apply().unwrap();
        }

        let files = fake.files.borrow();
        let written = files.get(Path::new("/etc/demo.conf")).unwrap();
        assert_eq!(written.matches("Managed by ops").count(), 1);
    }

    #[test]
    fn test_control_helpers() {
        let fake = FakeService::default();
        let manager = ServiceManager::new(profile(), &fake, &fake);

        assert!(!manager.is_running());
        assert!(manager.start().unwrap().success);
        assert!(manager.is_running());
        assert_eq!(manager.stop().unwrap().output, vec!["stopped".to_string()]);
        assert!(!manager.is_running());
    }
}
