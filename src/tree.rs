//! In-memory configuration tree.
//!
//! A [`ConfigTree`] holds one nesting level of a parsed file: a map of
//! [`NodeKey`] to [`Node`], the declared emission order, and the synthetic
//! end-of-file node that keeps trailing comments. Sections nest a child tree
//! inside their node value.
//!
//! Edits never remove nodes immediately. They set a [`PendingAction`] that the
//! serializer honours, so a tree can be edited, rendered and edited again in
//! one session.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;

use crate::error::{ConfigError, ConfigResult};

/// Identity of a node within one nesting level
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    /// Uni-valued directive, keyed by name alone
    Directive(String),
    /// One occurrence of a multi-valued directive, keyed by name and value
    Entry { name: String, value: String },
    /// Bracketed section; `label` is empty when the section has none
    Section { name: String, label: String },
    /// Opaque line kept verbatim, numbered in order of appearance
    Passthrough(usize),
}

impl NodeKey {
    pub fn directive(name: impl Into<String>) -> Self {
        NodeKey::Directive(name.into())
    }

    pub fn entry(name: impl Into<String>, value: impl Into<String>) -> Self {
        NodeKey::Entry {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn section(name: impl Into<String>, label: impl Into<String>) -> Self {
        NodeKey::Section {
            name: name.into(),
            label: label.into(),
        }
    }

    /// Directive name, if the key has one
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeKey::Directive(name) => Some(name),
            NodeKey::Entry { name, .. } | NodeKey::Section { name, .. } => Some(name),
            NodeKey::Passthrough(_) => None,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Directive(name) => write!(f, "{}", name),
            NodeKey::Entry { name, value } => write!(f, "{} {}", name, value),
            NodeKey::Section { name, label } if label.is_empty() => write!(f, "<{}>", name),
            NodeKey::Section { name, label } => write!(f, "<{} \"{}\">", name, label),
            NodeKey::Passthrough(n) => write!(f, "@passthrough:{}", n),
        }
    }
}

/// Pending edit recorded on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingAction {
    #[default]
    None,
    /// Value overwritten in place
    Set,
    /// New independent entry
    Add,
    /// Removed from output
    Delete,
}

/// Value carried by a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Scalar(String),
    Section(ConfigTree),
    Raw(String),
}

impl NodeValue {
    fn kind(&self) -> &'static str {
        match self {
            NodeValue::Scalar(_) => "scalar",
            NodeValue::Section(_) => "section",
            NodeValue::Raw(_) => "raw line",
        }
    }
}

/// One directive, section or passthrough line with its comments
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub value: NodeValue,
    /// Raw comment and blank lines immediately before the node
    pub precomment: Vec<String>,
    /// Inline trailing comment, marker included
    pub postcomment: Option<String>,
    /// The whole node is commented out
    pub disabled: bool,
    pub action: PendingAction,
}

impl Node {
    fn new(value: NodeValue) -> Self {
        Self {
            value,
            precomment: Vec::new(),
            postcomment: None,
            disabled: false,
            action: PendingAction::None,
        }
    }

    pub fn scalar(value: impl Into<String>) -> Self {
        Self::new(NodeValue::Scalar(value.into()))
    }

    pub fn section(tree: ConfigTree) -> Self {
        Self::new(NodeValue::Section(tree))
    }

    pub fn raw(line: impl Into<String>) -> Self {
        Self::new(NodeValue::Raw(line.into()))
    }

    pub fn with_precomment(mut self, precomment: Vec<String>) -> Self {
        self.precomment = precomment;
        self
    }

    pub fn with_postcomment(mut self, postcomment: Option<String>) -> Self {
        self.postcomment = postcomment;
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_action(mut self, action: PendingAction) -> Self {
        self.action = action;
        self
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match &self.value {
            NodeValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_section(&self) -> Option<&ConfigTree> {
        match &self.value {
            NodeValue::Section(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_section_mut(&mut self) -> Option<&mut ConfigTree> {
        match &mut self.value {
            NodeValue::Section(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.action == PendingAction::Delete
    }
}

/// One nesting level of a configuration file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigTree {
    nodes: IndexMap<NodeKey, Node>,
    order: Vec<NodeKey>,
    eof: Option<Box<Node>>,
    passthrough_count: usize,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.eof.is_none()
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: &NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Nodes in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&NodeKey, &Node)> {
        self.nodes.iter()
    }

    /// Declared emission order
    pub fn order(&self) -> &[NodeKey] {
        &self.order
    }

    /// Replace the declared emission order
    pub fn set_order(&mut self, order: Vec<NodeKey>) {
        self.order = order;
    }

    /// Keys in the order they are emitted: the order list first (duplicates
    /// removed), then keys missing from it in first-seen order. Order entries
    /// without a node are kept so the serializer can report them.
    pub fn emission_order(&self) -> Vec<&NodeKey> {
        let mut seen: HashSet<&NodeKey> = HashSet::with_capacity(self.order.len());
        let mut keys: Vec<&NodeKey> = Vec::with_capacity(self.order.len() + self.nodes.len());
        for key in &self.order {
            if seen.insert(key) {
                keys.push(key);
            }
        }
        for key in self.nodes.keys() {
            if !seen.contains(key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Insert a node and record it in the declared order.
    ///
    /// Re-inserting an existing key replaces the node but keeps its original
    /// position.
    pub fn insert(&mut self, key: NodeKey, node: Node) {
        if !self.nodes.contains_key(&key) || !self.order.contains(&key) {
            self.order.push(key.clone());
        }
        self.nodes.insert(key, node);
    }

    /// Insert a node without an order entry; it is emitted after all
    /// ordered nodes
    pub fn insert_unordered(&mut self, key: NodeKey, node: Node) {
        self.nodes.insert(key, node);
    }

    /// Append an opaque line in declared order
    pub fn push_passthrough(
        &mut self,
        line: impl Into<String>,
        precomment: Vec<String>,
    ) -> NodeKey {
        let key = NodeKey::Passthrough(self.passthrough_count);
        self.passthrough_count += 1;
        self.insert(key.clone(), Node::raw(line).with_precomment(precomment));
        key
    }

    /// Value of a uni-valued directive, unless deleted
    pub fn value(&self, name: &str) -> Option<&str> {
        self.nodes
            .get(&NodeKey::directive(name))
            .filter(|node| !node.is_deleted())
            .and_then(Node::as_scalar)
    }

    /// Values of a multi-valued directive in emission order, deleted entries excluded
    pub fn entries(&self, name: &str) -> Vec<&str> {
        self.emission_order()
            .into_iter()
            .filter_map(|key| match key {
                NodeKey::Entry { name: n, value } if n == name => {
                    let node = self.nodes.get(key)?;
                    (!node.is_deleted()).then_some(value.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Child tree of a section, unless deleted
    pub fn section(&self, name: &str, label: &str) -> Option<&ConfigTree> {
        self.nodes
            .get(&NodeKey::section(name, label))
            .filter(|node| !node.is_deleted())
            .and_then(Node::as_section)
    }

    pub fn section_mut(&mut self, name: &str, label: &str) -> Option<&mut ConfigTree> {
        self.nodes
            .get_mut(&NodeKey::section(name, label))
            .filter(|node| !node.is_deleted())
            .and_then(Node::as_section_mut)
    }

    /// Labels of every live section with the given name
    pub fn section_labels(&self, name: &str) -> Vec<&str> {
        self.emission_order()
            .into_iter()
            .filter_map(|key| match key {
                NodeKey::Section { name: n, label } if n == name => {
                    let node = self.nodes.get(key)?;
                    (!node.is_deleted()).then_some(label.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Set a uni-valued directive, overwriting it in place if present
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> ConfigResult<()> {
        let key = NodeKey::directive(name);
        match self.nodes.get_mut(&key) {
            Some(node) => match &mut node.value {
                NodeValue::Scalar(current) => {
                    *current = value.into();
                    node.action = PendingAction::Set;
                    Ok(())
                }
                other => Err(ConfigError::type_error(name, "scalar", other.kind())),
            },
            None => {
                self.insert_unordered(key, Node::scalar(value).with_action(PendingAction::Set));
                Ok(())
            }
        }
    }

    /// Add an entry under a multi-valued directive.
    ///
    /// Entries are keyed by value, so adding an existing value revives it if
    /// it was deleted and is otherwise a no-op.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let key = NodeKey::entry(name, value.clone());
        match self.nodes.get_mut(&key) {
            Some(node) if node.is_deleted() => node.action = PendingAction::Add,
            Some(_) => {}
            None => self.insert_unordered(key, Node::scalar(value).with_action(PendingAction::Add)),
        }
    }

    /// Add a section with the given body
    pub fn add_section(&mut self, name: &str, label: &str, body: ConfigTree) -> ConfigResult<()> {
        let key = NodeKey::section(name, label);
        if self.nodes.get(&key).is_some_and(|node| !node.is_deleted()) {
            return Err(ConfigError::custom(format!("section {} already exists", key)));
        }
        self.insert_unordered(key, Node::section(body).with_action(PendingAction::Add));
        Ok(())
    }

    /// Mark a node for deletion
    pub fn delete(&mut self, key: &NodeKey) -> ConfigResult<()> {
        let node = self
            .nodes
            .get_mut(key)
            .ok_or_else(|| ConfigError::key_not_found(key.to_string()))?;
        node.action = PendingAction::Delete;
        Ok(())
    }

    /// Replace a node's comments
    pub fn set_comment(
        &mut self,
        key: &NodeKey,
        precomment: Vec<String>,
        postcomment: Option<String>,
    ) -> ConfigResult<()> {
        let node = self
            .nodes
            .get_mut(key)
            .ok_or_else(|| ConfigError::key_not_found(key.to_string()))?;
        node.precomment = precomment;
        node.postcomment = postcomment;
        Ok(())
    }

    /// Comment a node out, or back in
    pub fn set_disabled(&mut self, key: &NodeKey, disabled: bool) -> ConfigResult<()> {
        let node = self
            .nodes
            .get_mut(key)
            .ok_or_else(|| ConfigError::key_not_found(key.to_string()))?;
        node.disabled = disabled;
        Ok(())
    }

    /// Trailing comment block with no following directive
    pub fn eof(&self) -> Option<&Node> {
        self.eof.as_deref()
    }

    pub fn set_eof_comment(&mut self, lines: Vec<String>) {
        if lines.is_empty() {
            self.eof = None;
        } else {
            self.eof = Some(Box::new(Node::scalar("").with_precomment(lines)));
        }
    }

    /// Drop deleted nodes and clear pending actions, recursively
    pub fn commit(&mut self) {
        self.nodes.retain(|_, node| !node.is_deleted());
        let nodes = &self.nodes;
        self.order.retain(|key| nodes.contains_key(key));
        for node in self.nodes.values_mut() {
            node.action = PendingAction::None;
            if let Some(child) = node.as_section_mut() {
                child.commit();
            }
        }
    }
}
