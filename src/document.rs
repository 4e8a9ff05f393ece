//! Multi-file document session.
//!
//! A [`Document`] maps each source path to its parsed [`ConfigTree`] so that
//! several related files (a main config and its includes, say) can be loaded,
//! edited and written back together.
//!
//! The main operations are:
//! - [`Document::load`] - parse every path through one [`ConfigParser`]
//! - [`Document::render`] - dry run returning the text each file would receive
//! - [`Document::write`] - serialize and overwrite every file

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::SourceError;
use crate::parser::ConfigParser;
use crate::serializer::{Rendered, Serializer};
use crate::source::{Locator, TextSource};
use crate::tree::ConfigTree;

/// Tracing target for document operations.
const DOCUMENT_TARGET: &str = "svcconf::document";

/// Parsed configuration files keyed by path, in load order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    files: IndexMap<PathBuf, ConfigTree>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every path under one session.
    ///
    /// A path that does not exist yields an empty tree, so writing the
    /// document later creates it. Any other read error aborts the load.
    pub fn load<I, P>(
        paths: I,
        source: &impl TextSource,
        parser: &ConfigParser,
    ) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut document = Self::new();
        for path in paths {
            let path = path.into();
            let tree = match parser.read(source, &Locator::file(path.clone())) {
                Ok(tree) => tree,
                Err(err) if err.is_not_found() => {
                    debug!(
                        target: DOCUMENT_TARGET,
                        path = %path.display(),
                        "file missing, starting empty"
                    );
                    ConfigTree::new()
                }
                Err(err) => return Err(err),
            };
            document.files.insert(path, tree);
        }
        Ok(document)
    }

    /// Add or replace the tree for a path
    pub fn insert(&mut self, path: impl Into<PathBuf>, tree: ConfigTree) -> Option<ConfigTree> {
        self.files.insert(path.into(), tree)
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&ConfigTree> {
        self.files.get(path.as_ref())
    }

    pub fn get_mut(&mut self, path: impl AsRef<Path>) -> Option<&mut ConfigTree> {
        self.files.get_mut(path.as_ref())
    }

    /// Paths in load order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &ConfigTree)> {
        self.files.iter().map(|(path, tree)| (path.as_path(), tree))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Text every file would receive, each block headed by a
    /// `# -- filename: <path>` line
    pub fn render(&self, serializer: &Serializer) -> String {
        let mut out = String::new();
        for (path, tree) in &self.files {
            out.push_str(&format!("# -- filename: {}\n", path.display()));
            out.push_str(&serializer.to_text(tree));
        }
        out
    }

    /// Serialize and overwrite every file.
    ///
    /// Returns the rendered output per path so callers can inspect skipped
    /// nodes. Stops at the first write error; files already written stay
    /// written.
    pub fn write(
        &self,
        source: &impl TextSource,
        serializer: &Serializer,
    ) -> Result<Vec<(PathBuf, Rendered)>, SourceError> {
        let mut written = Vec::with_capacity(self.files.len());
        for (path, tree) in &self.files {
            let rendered = serializer.render(tree);
            source.write_all(path, &rendered.text())?;
            debug!(
                target: DOCUMENT_TARGET,
                path = %path.display(),
                lines = rendered.lines.len(),
                skipped = rendered.skipped.len(),
                "wrote document file"
            );
            written.push((path.clone(), rendered));
        }
        Ok(written)
    }

    /// Drop deleted nodes and clear pending actions in every file
    pub fn commit(&mut self) {
        for tree in self.files.values_mut() {
            tree.commit();
        }
    }
}
