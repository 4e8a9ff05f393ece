#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use svcconf::{
    CommandSpec, CycleState, FormatOptions, HealOutcome, ServiceError, ServiceManager,
    ServiceProfile, SyncDirection, SystemRunner, SystemSource,
};
use tempfile::TempDir;

/// A throwaway service driven by shell scripts: `live` holds the running
/// state and the `running` file marks the service as active.
struct ScriptedService {
    dir: TempDir,
}

impl ScriptedService {
    fn new(live: &str, running: bool) -> Self {
        Self::with_test_body(live, running, TEST_APPLY)
    }

    fn with_test_body(live: &str, running: bool, test_body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();

        fs::write(dir.path().join("live"), live).unwrap();
        if running {
            fs::write(dir.path().join("running"), "").unwrap();
        }

        fs::write(
            dir.path().join("dump.sh"),
            format!("cat \"{root}/live\"\n"),
        )
        .unwrap();
        fs::write(
            dir.path().join("apply.sh"),
            format!(
                "if [ \"$1\" = \"--test\" ]; then\n{}\nfi\ncat > \"{root}/live\"\n",
                test_body.replace("{root}", &root)
            ),
        )
        .unwrap();
        fs::write(
            dir.path().join("ctl.sh"),
            format!(
                "case \"$1\" in\n\
                 status) [ -f \"{root}/running\" ] ;;\n\
                 stop) rm -f \"{root}/running\"; echo stopped ;;\n\
                 *) touch \"{root}/running\"; echo \"$1\" ;;\n\
                 esac\n"
            ),
        )
        .unwrap();

        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn script(&self, name: &str) -> CommandSpec {
        CommandSpec::new("sh").arg(self.path(name).display().to_string())
    }

    fn profile(&self) -> ServiceProfile {
        ServiceProfile::new(
            "scripted",
            self.path("service.conf"),
            self.script("dump.sh"),
            self.script("apply.sh"),
            self.script("ctl.sh"),
        )
        .with_format(FormatOptions::compact())
        .with_validate_timeout(Duration::from_secs(5))
        .with_stderr_denylist(["restore v[0-9.]+: "])
        .unwrap()
    }

    fn manager(&self) -> ServiceManager<SystemSource, SystemRunner> {
        ServiceManager::new(self.profile(), SystemSource::new(), SystemRunner::new())
            .with_timestamp("Thu Jan  1 00:00:00 1970")
    }

    fn live(&self) -> String {
        fs::read_to_string(self.path("live")).unwrap()
    }

    fn is_running(&self) -> bool {
        self.path("running").exists()
    }
}

/// Dry run that clobbers live state and rejects anything mentioning `Broken`
const TEST_APPLY: &str = "  input=$(cat)
  echo 'Clobbered yes' > \"{root}/live\"
  case \"$input\" in *Broken*) echo 'restore v1.0: line 1 failed' >&2; exit 1 ;; esac
  exit 0";

#[test]
fn test_validate_leaves_live_state_identical() {
    let service = ScriptedService::new("# live\nFoo 1\nLoadPlugin cpu\n", true);
    let manager = service.manager();

    let report = manager.validate("Foo 2\n");

    assert!(report.is_valid());
    assert_eq!(report.heal, HealOutcome::Restored);
    assert_eq!(service.live(), "# live\nFoo 1\nLoadPlugin cpu\n");
    assert!(service.is_running());
}

#[test]
fn test_invalid_candidate_reported_and_healed() {
    let service = ScriptedService::new("Foo 1\n", true);
    let manager = service.manager();

    let report = manager.validate("Broken yes\n");

    assert!(!report.is_valid());
    assert_eq!(report.exit_code, Some(1));
    assert_eq!(report.stderr, "line 1 failed");
    assert_eq!(report.heal, HealOutcome::Restored);
    assert_eq!(service.live(), "Foo 1\n");
}

#[test]
fn test_inactive_service_is_stopped_again() {
    let service = ScriptedService::new("Foo 1\n", false);
    let manager = service.manager();

    let report = manager.validate("Foo 2\n");

    assert_eq!(report.heal, HealOutcome::Stopped);
    assert!(!service.is_running());
}

#[test]
fn test_hanging_dry_run_times_out() {
    let service = ScriptedService::with_test_body("Foo 1\n", true, "  exec sleep 30");
    let profile = service
        .profile()
        .with_validate_timeout(Duration::from_millis(300));
    let manager = ServiceManager::new(profile, SystemSource::new(), SystemRunner::new());

    let start = Instant::now();
    let report = manager.validate("Foo 2\n");

    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(report.timed_out);
    assert!(!report.is_valid());
    assert_eq!(report.heal, HealOutcome::Restored);
    assert_eq!(service.live(), "Foo 1\n");
}

#[test]
fn test_read_snapshot() {
    let service = ScriptedService::new("Foo 1\n", true);
    fs::write(service.path("service.conf"), "Foo 2\n").unwrap();
    let manager = service.manager();

    let snapshot = manager.read();
    assert_eq!(snapshot.config.value("Foo"), Some("2"));
    assert_eq!(snapshot.live.value("Foo"), Some("1"));
}

#[test]
fn test_reconcile_writes_valid_candidate() {
    let service = ScriptedService::new("Foo 1\n", true);
    let mut manager = service.manager();
    manager.tree_mut().set("Foo", "2").unwrap();

    let report = manager.reconcile().unwrap();

    assert!(report.is_valid());
    assert_eq!(
        fs::read_to_string(service.path("service.conf")).unwrap(),
        "Foo 2\n"
    );
    assert_eq!(manager.last_cycle().last(), Some(&CycleState::Idle));
    assert!(manager.last_cycle().contains(&CycleState::Restarting));
}

#[test]
fn test_reconcile_rejects_invalid_candidate() {
    let service = ScriptedService::new("Foo 1\n", true);
    let mut manager = service.manager();
    manager.tree_mut().set("Broken", "yes").unwrap();

    let err = manager.reconcile().unwrap_err();

    assert!(matches!(err, ServiceError::ValidationFailed { .. }));
    assert!(!service.path("service.conf").exists());
    assert_eq!(service.live(), "Foo 1\n");
}

#[test]
fn test_sync_live_to_config() {
    let service = ScriptedService::new("# captured\nFoo 5\n", true);
    let mut manager = service.manager();

    assert!(manager.sync(SyncDirection::LiveToConfig));
    assert_eq!(
        fs::read_to_string(service.path("service.conf")).unwrap(),
        "# captured\nFoo 5\n"
    );
}

#[test]
fn test_sync_config_to_live_starts_service() {
    let service = ScriptedService::new("", false);
    fs::write(service.path("service.conf"), "Foo 3\n").unwrap();
    let mut manager = service.manager();

    assert!(manager.sync(SyncDirection::ConfigToLive));
    assert!(service.is_running());
}

#[test]
fn test_sync_failure_is_false() {
    let service = ScriptedService::new("Foo 1\n", true);
    let mut profile = service.profile();
    profile.dump = CommandSpec::new("sh").args(["-c", "exit 1"]);
    let mut manager = ServiceManager::new(profile, SystemSource::new(), SystemRunner::new());

    assert!(!manager.sync(SyncDirection::LiveToConfig));
    assert!(!service.path("service.conf").exists());
}

#[test]
fn test_control_helpers() {
    let service = ScriptedService::new("", false);
    let manager = service.manager();

    assert!(!manager.is_running());
    let outcome = manager.start().unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.output, vec!["start".to_string()]);
    assert!(manager.is_running());

    assert!(manager.stop().unwrap().success);
    assert!(!manager.is_running());
}
