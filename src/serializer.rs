//! Config tree serialization.
//!
//! The serializer mirrors the parser: it only writes leaf directives the
//! parser would read back, re-indents section bodies per level, and emits
//! comments verbatim. Nodes that cannot be written are reported as
//! [`SkipReason`]s instead of aborting the whole render.

use chrono::Local;
use tracing::debug;

use crate::grammar::Grammar;
use crate::options::{COMMENT_MARKER, DirectiveSet, FormatOptions};
use crate::tree::{ConfigTree, Node, NodeKey, NodeValue};

/// Tracing target for serializer diagnostics.
const SERIALIZER_TARGET: &str = "svcconf::serializer";

/// Why a node produced no output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The order list names a key the tree does not hold
    MissingNode(NodeKey),
    /// The directive name would not be accepted back by the parser
    NotEmittable(NodeKey),
    /// The node's value does not fit its key, e.g. a section key holding a scalar
    ShapeMismatch { key: NodeKey, expected: &'static str },
}

/// Result of emitting one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit {
    Lines(Vec<String>),
    Skip(SkipReason),
}

/// Serialized output plus every skipped node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rendered {
    pub lines: Vec<String>,
    pub skipped: Vec<SkipReason>,
}

impl Rendered {
    /// Full text with a trailing newline, or empty when there are no lines
    pub fn text(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// Writes a [`ConfigTree`] back to lines
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    grammar: Grammar,
    format: FormatOptions,
    timestamp: Option<String>,
}

impl Serializer {
    pub fn new(directives: DirectiveSet, format: FormatOptions) -> Self {
        Self {
            grammar: Grammar::new(directives),
            format,
            timestamp: None,
        }
    }

    /// Use a fixed footer timestamp instead of the current local time
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn format(&self) -> &FormatOptions {
        &self.format
    }

    /// Render a whole file, footer included
    pub fn render(&self, tree: &ConfigTree) -> Rendered {
        let mut out = Rendered::default();
        self.render_level(tree, 0, &mut out);
        if let Some(footer) = self.footer_line() {
            out.lines.push(footer);
        }
        out
    }

    /// Render a whole file to text
    pub fn to_text(&self, tree: &ConfigTree) -> String {
        self.render(tree).text()
    }

    /// The footer comment line, if enabled
    pub fn footer_line(&self) -> Option<String> {
        let footer = self.format.footer.as_deref()?;
        let timestamp = self
            .timestamp
            .clone()
            .unwrap_or_else(|| Local::now().format("%c").to_string());
        Some(format!(
            "{} {} - {} on {}",
            COMMENT_MARKER, footer, self.format.module, timestamp
        ))
    }

    fn render_level(&self, tree: &ConfigTree, level: usize, out: &mut Rendered) {
        for key in tree.emission_order() {
            let emitted = match tree.get(key) {
                Some(node) => self.emit_node(key, node, level, out),
                None => Emit::Skip(SkipReason::MissingNode(key.clone())),
            };

            match emitted {
                Emit::Lines(lines) => out.lines.extend(lines),
                Emit::Skip(reason) => {
                    debug!(target: SERIALIZER_TARGET, level, reason = ?reason, "skipping node");
                    out.skipped.push(reason);
                }
            }
        }

        if let Some(eof) = tree.eof() {
            let indent = self.format.indent.repeat(level);
            out.lines
                .extend(eof.precomment.iter().map(|line| comment_line(&indent, line)));
        }
    }

    /// Emit one node with its comments. Skips found inside a section body are
    /// recorded on `out` while the rest of the section is still written.
    pub fn emit_node(
        &self,
        key: &NodeKey,
        node: &Node,
        level: usize,
        out: &mut Rendered,
    ) -> Emit {
        if node.is_deleted() {
            return Emit::Lines(Vec::new());
        }

        let indent = self.format.indent.repeat(level);

        let body: Vec<String> = match (key, &node.value) {
            (NodeKey::Section { name, label }, NodeValue::Section(child)) => {
                let mut nested = Rendered::default();
                self.render_level(child, level + 1, &mut nested);
                out.skipped.append(&mut nested.skipped);

                let mut lines = Vec::with_capacity(nested.lines.len() + 2);
                if label.is_empty() {
                    lines.push(format!("{}<{}>", indent, name));
                } else {
                    lines.push(format!("{}<{} \"{}\">", indent, name, label));
                }
                lines.extend(nested.lines);
                lines.push(format!("{}</{}>", indent, name));
                lines
            }
            (NodeKey::Section { .. }, _) => {
                return Emit::Skip(SkipReason::ShapeMismatch {
                    key: key.clone(),
                    expected: "section",
                });
            }

            (NodeKey::Directive(name), NodeValue::Scalar(value)) => {
                if !self.grammar.accepts_leaf(name) {
                    return Emit::Skip(SkipReason::NotEmittable(key.clone()));
                }
                vec![self.directive_line(&indent, name, value, node.postcomment.as_deref())]
            }
            (NodeKey::Entry { name, value }, NodeValue::Scalar(_)) => {
                if !self.grammar.accepts_leaf(name) {
                    return Emit::Skip(SkipReason::NotEmittable(key.clone()));
                }
                vec![self.directive_line(&indent, name, value, node.postcomment.as_deref())]
            }
            (NodeKey::Directive(_) | NodeKey::Entry { .. }, _) => {
                return Emit::Skip(SkipReason::ShapeMismatch {
                    key: key.clone(),
                    expected: "scalar",
                });
            }

            (NodeKey::Passthrough(_), NodeValue::Raw(line)) => vec![line.clone()],
            (NodeKey::Passthrough(_), _) => {
                return Emit::Skip(SkipReason::ShapeMismatch {
                    key: key.clone(),
                    expected: "raw line",
                });
            }
        };

        let mut lines: Vec<String> = node
            .precomment
            .iter()
            .map(|line| comment_line(&indent, line))
            .collect();
        if node.disabled {
            lines.extend(body.into_iter().map(disable_line));
        } else {
            lines.extend(body);
        }
        Emit::Lines(lines)
    }

    fn directive_line(
        &self,
        indent: &str,
        name: &str,
        value: &str,
        postcomment: Option<&str>,
    ) -> String {
        let mut line = format!(
            "{}{:<width$}{}{}",
            indent,
            name,
            self.format.delimiter,
            value,
            width = self.format.key_width
        );
        if let Some(comment) = postcomment {
            line.push(' ');
            if !comment.starts_with(COMMENT_MARKER) {
                line.push(COMMENT_MARKER);
                line.push(' ');
            }
            line.push_str(comment);
        }
        line
    }
}

/// Free-form comment text gets a marker so it never reads back as a directive
fn comment_line(indent: &str, line: &str) -> String {
    if line.trim().is_empty() || line.trim_start().starts_with(COMMENT_MARKER) {
        line.to_string()
    } else {
        format!("{}{} {}", indent, COMMENT_MARKER, line)
    }
}

/// Comment a line out without doubling an existing marker
fn disable_line(line: String) -> String {
    if line.trim().is_empty() || line.starts_with(COMMENT_MARKER) {
        line
    } else {
        format!("{}{}", COMMENT_MARKER, line)
    }
}
