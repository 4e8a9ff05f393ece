//! Line classification.
//!
//! The `pest` grammar in `line.pest` splits a physical line into its shape:
//! indentation, an optional run of comment markers, and a body that is a
//! section tag, a `Word value` pair or free text. [`Grammar::classify`] then
//! walks a fixed table of match rules over that shape and returns the first
//! [`Token`] produced.

use pest::Parser;
use pest_derive::Parser;

use crate::options::{COMMENT_MARKER, DirectiveSet};

#[derive(Parser)]
#[grammar = "line.pest"]
struct LineParser;

/// A directive recognised on a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub value: String,
    pub postcomment: Option<String>,
    /// The line carried a leading comment marker
    pub disabled: bool,
}

/// Classification of one physical line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    SectionOpen {
        name: String,
        label: String,
        disabled: bool,
    },
    SectionClose {
        name: String,
        disabled: bool,
    },
    MultiDirective(Directive),
    UniDirective(Directive),
    Comment,
    Blank,
    Unknown,
}

/// Body of a line as recognised by the pest grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body<'a> {
    Open { name: &'a str, label: &'a str },
    Close { name: &'a str },
    Pair { word: &'a str, value: &'a str },
    Text,
}

#[derive(Debug, Clone, Copy)]
struct LineShape<'a> {
    marked: bool,
    body: Body<'a>,
    /// Everything after the indentation, marker run and following blanks
    rest: &'a str,
}

impl<'a> LineShape<'a> {
    fn of(line: &'a str) -> Option<Self> {
        let mut pairs = LineParser::parse(Rule::line, line).ok()?;
        let root = pairs.next()?;

        let mut shape = LineShape {
            marked: false,
            body: Body::Text,
            rest: "",
        };

        for pair in root.into_inner() {
            match pair.as_rule() {
                Rule::marker => shape.marked = true,
                Rule::section_open => {
                    shape.rest = pair.as_str();
                    let mut inner = pair.into_inner();
                    let name = inner.next()?.as_str();
                    let label = inner.next().map(|p| p.as_str()).unwrap_or("");
                    shape.body = Body::Open { name, label };
                }
                Rule::section_close => {
                    shape.rest = pair.as_str();
                    let name = pair.into_inner().next()?.as_str();
                    shape.body = Body::Close { name };
                }
                Rule::directive => {
                    shape.rest = pair.as_str();
                    let mut inner = pair.into_inner();
                    let word = inner.next()?.as_str();
                    let value = inner.next()?.as_str();
                    shape.body = Body::Pair { word, value };
                }
                Rule::text => shape.rest = pair.as_str(),
                _ => {}
            }
        }

        Some(shape)
    }

    fn pair(&self) -> Option<(&'a str, &'a str)> {
        match self.body {
            Body::Pair { word, value } => Some((word, value)),
            _ => None,
        }
    }
}

type MatchFn = fn(&Grammar, &str, &LineShape<'_>) -> Option<Token>;

/// Ordered classification rules; the first rule producing a token wins
const RULES: &[(&str, MatchFn)] = &[
    ("blank", match_blank),
    ("uni", match_declared_uni),
    ("multi", match_declared_multi),
    ("section-open", match_section_open),
    ("section-close", match_section_close),
    ("fallback", match_fallback),
    ("comment", match_comment),
];

/// Classifies lines against a declared [`DirectiveSet`]
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    directives: DirectiveSet,
}

impl Grammar {
    pub fn new(directives: DirectiveSet) -> Self {
        Self { directives }
    }

    pub fn directives(&self) -> &DirectiveSet {
        &self.directives
    }

    /// Classify one physical line (line terminator already removed)
    pub fn classify(&self, line: &str) -> Token {
        let Some(shape) = LineShape::of(line) else {
            return Token::Unknown;
        };

        RULES
            .iter()
            .find_map(|(_, rule)| rule(self, line, &shape))
            .unwrap_or(Token::Unknown)
    }

    /// Whether `name` would be accepted back by the parser as a leaf directive
    pub fn accepts_leaf(&self, name: &str) -> bool {
        self.directives.is_uni(name) || self.directives.is_multi(name) || is_fallback_name(name)
    }
}

/// Capitalized identifier accepted for undeclared directives
pub fn is_fallback_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            chars.next().is_some() && !name.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

/// Split an inline comment off a directive value.
///
/// Only a marker strictly after the first column of the value starts a
/// comment.
pub fn split_postcomment(value: &str) -> (String, Option<String>) {
    let value = value.trim();
    match value.find(COMMENT_MARKER) {
        Some(pos) if pos > 0 => (
            value[..pos].trim_end().to_string(),
            Some(value[pos..].to_string()),
        ),
        _ => (value.to_string(), None),
    }
}

fn directive(shape: &LineShape<'_>, word: &str, value: &str) -> Directive {
    let (value, postcomment) = split_postcomment(value);
    Directive {
        name: word.to_string(),
        value,
        postcomment,
        disabled: shape.marked,
    }
}

fn match_blank(_: &Grammar, line: &str, _: &LineShape<'_>) -> Option<Token> {
    line.trim().is_empty().then_some(Token::Blank)
}

fn match_declared_uni(grammar: &Grammar, _: &str, shape: &LineShape<'_>) -> Option<Token> {
    let (word, value) = shape.pair()?;
    grammar
        .directives
        .is_uni(word)
        .then(|| Token::UniDirective(directive(shape, word, value)))
}

fn match_declared_multi(grammar: &Grammar, _: &str, shape: &LineShape<'_>) -> Option<Token> {
    let (word, value) = shape.pair()?;
    grammar
        .directives
        .is_multi(word)
        .then(|| Token::MultiDirective(directive(shape, word, value)))
}

fn match_section_open(grammar: &Grammar, _: &str, shape: &LineShape<'_>) -> Option<Token> {
    match shape.body {
        Body::Open { name, label } if grammar.directives.is_section(name) => {
            Some(Token::SectionOpen {
                name: name.to_string(),
                label: label.trim().replace(['"', '\''], ""),
                disabled: shape.marked,
            })
        }
        _ => None,
    }
}

fn match_section_close(grammar: &Grammar, _: &str, shape: &LineShape<'_>) -> Option<Token> {
    match shape.body {
        Body::Close { name } if grammar.directives.is_section(name) => Some(Token::SectionClose {
            name: name.to_string(),
            disabled: shape.marked,
        }),
        _ => None,
    }
}

fn match_fallback(grammar: &Grammar, _: &str, shape: &LineShape<'_>) -> Option<Token> {
    let (word, value) = shape.pair()?;
    if is_prose(grammar, shape) || !is_fallback_name(word) {
        return None;
    }
    Some(Token::UniDirective(directive(shape, word, value)))
}

fn match_comment(_: &Grammar, line: &str, _: &LineShape<'_>) -> Option<Token> {
    line.trim_start()
        .starts_with(COMMENT_MARKER)
        .then_some(Token::Comment)
}

/// Exclusions applied before the undeclared-directive fallback
fn is_prose(grammar: &Grammar, shape: &LineShape<'_>) -> bool {
    // A section name followed by a parameter: sections must be declared in full
    if shape
        .pair()
        .is_some_and(|(word, _)| grammar.directives.is_section(word))
    {
        return true;
    }

    if !shape.marked {
        return false;
    }

    let tokens = shape.rest.split_whitespace().count();

    // "# Read this configuration file"
    if tokens >= 4 {
        return true;
    }

    // "# Read this configuration:"
    if tokens >= 3 && shape.rest.ends_with(':') {
        return true;
    }

    // "# Read #"
    let unmarked = shape.rest.trim_end_matches(COMMENT_MARKER);
    unmarked.len() < shape.rest.len()
        && unmarked.ends_with([' ', '\t'])
        && unmarked.trim_end().chars().count() >= 2
}
