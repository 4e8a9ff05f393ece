//! Parser and serializer options.

use std::collections::HashSet;

/// Comment marker recognised by the grammar
pub const COMMENT_MARKER: char = '#';

/// Default footer text written at the end of every generated file
pub const DEFAULT_FOOTER: &str = "-- Generated by svcconf";

/// Caller-declared directive names, split by kind.
///
/// Names are matched exactly and case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveSet {
    uni: HashSet<String>,
    multi: HashSet<String>,
    sections: HashSet<String>,
}

impl DirectiveSet {
    /// An empty set: only the capitalized-identifier fallback applies
    pub fn empty() -> Self {
        Self {
            uni: HashSet::new(),
            multi: HashSet::new(),
            sections: HashSet::new(),
        }
    }

    /// Replace the uni-valued directive names
    pub fn with_uni<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uni = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the multi-valued directive names
    pub fn with_multi<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.multi = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the section directive names
    pub fn with_sections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_uni(&self, name: &str) -> bool {
        self.uni.contains(name)
    }

    pub fn is_multi(&self, name: &str) -> bool {
        self.multi.contains(name)
    }

    pub fn is_section(&self, name: &str) -> bool {
        self.sections.contains(name)
    }
}

impl Default for DirectiveSet {
    fn default() -> Self {
        Self::empty()
            .with_uni(["PIDFile"])
            .with_multi(["LoadPlugin", "Include"])
            .with_sections(["Directory", "VirtualHost", "View"])
    }
}

/// What the parser does with lines that are neither comments nor directives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownLinePolicy {
    /// Discard the line
    #[default]
    Drop,
    /// Keep the line verbatim as an opaque passthrough node
    Passthrough,
}

/// Parser options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    /// Handling of unclassifiable non-comment lines
    pub unknown_lines: UnknownLinePolicy,

    /// Comment lines containing this text are generated footers and are not
    /// kept as comments, so rewriting never duplicates them
    pub footer_marker: Option<String>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            unknown_lines: UnknownLinePolicy::Drop,
            footer_marker: Some(DEFAULT_FOOTER.to_string()),
        }
    }
}

impl ParserOptions {
    pub fn with_unknown_lines(mut self, policy: UnknownLinePolicy) -> Self {
        self.unknown_lines = policy;
        self
    }

    pub fn with_footer_marker(mut self, marker: Option<String>) -> Self {
        self.footer_marker = marker;
        self
    }

    /// Recognise the footer that `format` writes
    pub fn with_footer_of(mut self, format: &FormatOptions) -> Self {
        self.footer_marker = format.footer.clone();
        self
    }
}

/// Serializer options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    /// Indentation added per nesting level
    pub indent: String,

    /// Column width the directive name is padded to
    pub key_width: usize,

    /// Separator between the padded name and the value
    pub delimiter: String,

    /// Footer text; `None` suppresses the footer line
    pub footer: Option<String>,

    /// Label reported in the footer line
    pub module: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            key_width: 18,
            delimiter: " ".to_string(),
            footer: Some(DEFAULT_FOOTER.to_string()),
            module: "svcconf".to_string(),
        }
    }
}

impl FormatOptions {
    /// Compact layout: no column padding and no footer
    pub fn compact() -> Self {
        Self::default().with_key_width(0).without_footer()
    }

    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    pub fn with_key_width(mut self, width: usize) -> Self {
        self.key_width = width;
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn without_footer(mut self) -> Self {
        self.footer = None;
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }
}
