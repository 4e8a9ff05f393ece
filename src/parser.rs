use std::mem;

use tracing::{debug, warn};

use crate::error::SourceError;
use crate::grammar::{Grammar, Token};
use crate::options::{DirectiveSet, ParserOptions, UnknownLinePolicy};
use crate::source::{Locator, TextSource};
use crate::tree::{ConfigTree, Node, NodeKey};

/// Tracing target for parser diagnostics.
const PARSER_TARGET: &str = "svcconf::parser";

/// Builds a [`ConfigTree`] from a sequence of raw lines.
///
/// Parsing never fails: lines that cannot be classified are dropped (or kept
/// as passthrough, see [`UnknownLinePolicy`]) and comments are carried onto
/// the next directive or the end-of-file node.
#[derive(Debug, Clone, Default)]
pub struct ConfigParser {
    grammar: Grammar,
    options: ParserOptions,
}

impl ConfigParser {
    pub fn new(directives: DirectiveSet) -> Self {
        Self {
            grammar: Grammar::new(directives),
            options: ParserOptions::default(),
        }
    }

    pub fn with_options(directives: DirectiveSet, options: ParserOptions) -> Self {
        Self {
            grammar: Grammar::new(directives),
            options,
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parse a configuration string
    pub fn parse_str(&self, input: &str) -> ConfigTree {
        let lines: Vec<&str> = input.lines().collect();
        self.parse_lines(&lines)
    }

    /// Parse a sequence of lines
    pub fn parse_lines<S: AsRef<str>>(&self, lines: &[S]) -> ConfigTree {
        let lines: Vec<&str> = lines
            .iter()
            .map(|line| line.as_ref().trim_end_matches(['\r', '\n']))
            .collect();
        self.parse_level(&lines, 0)
    }

    /// Read lines from a text source and parse them
    pub fn read(
        &self,
        source: &impl TextSource,
        locator: &Locator,
    ) -> Result<ConfigTree, SourceError> {
        let lines = source.read_lines(locator)?;
        Ok(self.parse_lines(&lines))
    }

    fn parse_level(&self, lines: &[&str], level: usize) -> ConfigTree {
        let mut tree = ConfigTree::new();
        let mut precomment: Vec<String> = Vec::new();
        let mut index = 0;

        while index < lines.len() {
            let line = lines[index];
            index += 1;

            match self.grammar.classify(line) {
                Token::Blank => precomment.push(line.to_string()),

                Token::Comment => {
                    if self.is_footer(line) {
                        debug!(target: PARSER_TARGET, level, line, "dropping generated footer");
                    } else {
                        precomment.push(line.to_string());
                    }
                }

                Token::SectionOpen {
                    name,
                    label,
                    disabled,
                } => {
                    let body_start = index;
                    let (body_end, next) = self.find_close(lines, body_start, &name);
                    if next.is_none() {
                        warn!(
                            target: PARSER_TARGET,
                            level,
                            section = %name,
                            label = %label,
                            "section not closed before end of input"
                        );
                    }

                    let child = self.parse_level(&lines[body_start..body_end], level + 1);
                    let node = Node::section(child)
                        .with_precomment(mem::take(&mut precomment))
                        .with_disabled(disabled);
                    tree.insert(NodeKey::section(name, label), node);
                    index = next.unwrap_or(lines.len());
                }

                Token::UniDirective(directive) => {
                    let node = Node::scalar(directive.value)
                        .with_precomment(mem::take(&mut precomment))
                        .with_postcomment(directive.postcomment)
                        .with_disabled(directive.disabled);
                    tree.insert(NodeKey::directive(directive.name), node);
                }

                Token::MultiDirective(directive) => {
                    let key = NodeKey::entry(directive.name, directive.value.clone());
                    let node = Node::scalar(directive.value)
                        .with_precomment(mem::take(&mut precomment))
                        .with_postcomment(directive.postcomment)
                        .with_disabled(directive.disabled);
                    tree.insert(key, node);
                }

                Token::SectionClose { .. } | Token::Unknown => match self.options.unknown_lines {
                    UnknownLinePolicy::Drop => {
                        debug!(target: PARSER_TARGET, level, line, "dropping unrecognised line");
                    }
                    UnknownLinePolicy::Passthrough => {
                        tree.push_passthrough(line, mem::take(&mut precomment));
                    }
                },
            }
        }

        tree.set_eof_comment(precomment);
        tree
    }

    /// Find the line closing the section `name` whose body starts at `start`.
    ///
    /// Returns the end of the body and the index of the line after the close
    /// tag, or `None` when the section runs to the end of input. Same-named
    /// sections opened inside the body must be closed first.
    fn find_close(&self, lines: &[&str], start: usize, name: &str) -> (usize, Option<usize>) {
        let mut depth = 0usize;
        for (offset, line) in lines[start..].iter().enumerate() {
            match self.grammar.classify(line) {
                Token::SectionOpen { name: open, .. } if open == name => depth += 1,
                Token::SectionClose { name: close, .. } if close == name => {
                    if depth == 0 {
                        let at = start + offset;
                        return (at, Some(at + 1));
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        (lines.len(), None)
    }

    fn is_footer(&self, line: &str) -> bool {
        self.options
            .footer_marker
            .as_deref()
            .is_some_and(|marker| !marker.is_empty() && line.contains(marker))
    }
}
