//! Firewall profile for the SysV `iptables` service.
//!
//! Rule files are not in the directive grammar, so every rule line is kept as
//! an opaque passthrough line and written back verbatim. The file carries its
//! own `# Generated by` / `# Completed on` stamps, which are refreshed on each
//! write in place of the generic footer.

use std::path::Path;

use crate::error::ServiceResult;
use crate::options::{DirectiveSet, FormatOptions, ParserOptions, UnknownLinePolicy};
use crate::process::CommandSpec;
use crate::service::{ServiceProfile, StampRule};

/// Persisted rule set
pub const IPTABLES_CONF: &str = "/etc/sysconfig/iptables";

pub const IPTABLES_SAVE: &str = "/sbin/iptables-save";
pub const IPTABLES_RESTORE: &str = "/sbin/iptables-restore";
pub const IPTABLES_INITRD: &str = "/etc/init.d/iptables";

/// Usage noise `iptables-restore --test` prints around real diagnostics
pub const STDERR_DENYLIST: &[&str] = &[
    r"Try `iptables-restore -h' or 'iptables-restore --help' for more information\.",
    r"iptables-restore v[0-9.]+: iptables-restore:",
    r"iptables-restore v[0-9.]+: ",
];

const HEADER_PATTERN: &str = r"(# Generated by .* on ).*";
const FOOTER_PATTERN: &str = r"(# Completed on ).*";

impl ServiceProfile {
    /// Profile for the stock `iptables` service
    pub fn iptables() -> ServiceResult<Self> {
        Self::iptables_at(IPTABLES_CONF)
    }

    /// Same as [`iptables`](Self::iptables) with a different rule file
    pub fn iptables_at(config_path: impl AsRef<Path>) -> ServiceResult<Self> {
        let parser = ParserOptions::default()
            .with_unknown_lines(UnknownLinePolicy::Passthrough)
            .with_footer_marker(None);
        let format = FormatOptions::compact().with_module("iptables");

        let profile = ServiceProfile::new(
            "iptables",
            config_path.as_ref(),
            CommandSpec::new(IPTABLES_SAVE),
            CommandSpec::new(IPTABLES_RESTORE),
            CommandSpec::new(IPTABLES_INITRD),
        )
        .with_test_flag("--test")
        .with_directives(DirectiveSet::empty())
        .with_parser_options(parser)
        .with_format(format)
        .with_stderr_denylist(STDERR_DENYLIST)?
        .with_stamp_rule(StampRule::new(HEADER_PATTERN, "# Generated by svcconf on ")?)
        .with_stamp_rule(StampRule::new(FOOTER_PATTERN, "# Completed on ")?);

        Ok(profile)
    }
}
