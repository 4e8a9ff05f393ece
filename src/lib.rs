//! # svcconf
//!
//! Lossless parsing and serialization of line-oriented service configuration
//! files, plus a read / validate / apply / rollback protocol that keeps those
//! files in step with the running service.
//!
//! The grammar is the daemon style shared by many Unix services: flat
//! `Key value` directives, repeatable directives, and bracketed sections such as
//! `<Directory "/var/www"> ... </Directory>`. Comments, blank lines, ordering and
//! nesting survive a parse and serialize cycle.
//!
//! ## Features
//!
//! - **Declared grammar**: uni-valued, multi-valued and section names per file
//!   type, with a capitalized-identifier fallback for undeclared directives
//! - **Comment fidelity**: comment blocks travel with the directive they precede,
//!   inline comments stay on their line, trailing comments are kept at end of file
//! - **Disabled directives**: commented-out directives keep their parsed shape
//! - **Typed edits**: [`ConfigTree::set`], [`ConfigTree::add`], [`ConfigTree::delete`],
//!   [`ConfigTree::set_comment`], [`ConfigTree::set_disabled`]
//! - **Multi-file sessions**: [`Document`] loads, renders and writes several files
//! - **Service sync**: [`ServiceManager`] validates candidates with a dry-run apply
//!   and always heals the live state afterwards
//!
//! ## Optional Features
//!
//! ### `iptables` Feature (default)
//!
//! Provides [`ServiceProfile::iptables`], a preset for the SysV `iptables`
//! service: rule lines are kept verbatim, the `# Generated by` / `# Completed on`
//! stamps are refreshed on write, and `iptables-restore` usage noise is stripped
//! from validation output.
//!
//! ## Example
//!
//! ```rust
//! use svcconf::{ConfigParser, DirectiveSet, FormatOptions, Serializer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let parser = ConfigParser::new(DirectiveSet::default());
//! let mut tree = parser.parse_str(r#"LoadPlugin cpu
//! <Directory "/var/www">
//!   Options None
//! </Directory>
//! "#);
//!
//! assert_eq!(tree.entries("LoadPlugin"), vec!["cpu"]);
//!
//! tree.add("LoadPlugin", "memory");
//! if let Some(directory) = tree.section_mut("Directory", "/var/www") {
//!     directory.set("Options", "Indexes")?;
//! }
//!
//! let serializer = Serializer::new(DirectiveSet::default(), FormatOptions::compact());
//! assert_eq!(
//!     serializer.to_text(&tree),
//!     "LoadPlugin cpu\n<Directory \"/var/www\">\n  Options Indexes\n</Directory>\nLoadPlugin memory\n"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Service Sync
//!
//! ```rust,no_run
//! use svcconf::{ServiceManager, ServiceProfile, SyncDirection, SystemRunner, SystemSource};
//!
//! # fn main() -> Result<(), svcconf::ServiceError> {
//! let profile = ServiceProfile::iptables()?;
//! let mut manager = ServiceManager::new(profile, SystemSource::new(), SystemRunner::new());
//!
//! // Load the rule file, lint it against the running firewall
//! manager.reload();
//! let report = manager.validate(&manager.render_config().text());
//! if !report.is_valid() {
//!     eprintln!("rejected: {}", report.stderr);
//! }
//!
//! // Persist whatever is live right now
//! manager.sync(SyncDirection::LiveToConfig);
//! # Ok(())
//! # }
//! ```

// Module declarations
mod document;
mod error;
mod grammar;
mod options;
mod parser;
mod process;
mod serializer;
mod service;
mod source;
mod tree;

// Feature-gated modules
#[cfg(feature = "iptables")]
mod iptables;

// Public exports
pub use document::Document;
pub use error::{
    ConfigError, ConfigResult, ProcessError, ServiceError, ServiceResult, SourceError,
};
pub use grammar::{Directive, Grammar, Token, is_fallback_name, split_postcomment};
pub use options::{
    COMMENT_MARKER, DEFAULT_FOOTER, DirectiveSet, FormatOptions, ParserOptions, UnknownLinePolicy,
};
pub use parser::ConfigParser;
pub use process::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use serializer::{Emit, Rendered, Serializer, SkipReason};
pub use service::{
    ControlAction, ControlOutcome, CycleState, DEFAULT_VALIDATE_TIMEOUT, HealOutcome, Inspection,
    ServiceManager, ServiceProfile, ServiceSnapshot, StampRule, SyncDirection, ValidationReport,
};
pub use source::{Locator, SystemSource, TextSource};
pub use tree::{ConfigTree, Node, NodeKey, NodeValue, PendingAction};

#[cfg(feature = "iptables")]
pub use iptables::{
    IPTABLES_CONF, IPTABLES_INITRD, IPTABLES_RESTORE, IPTABLES_SAVE, STDERR_DENYLIST,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
