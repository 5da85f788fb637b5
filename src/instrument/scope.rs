//! Source scope resolution for debug documents.
//!
//! A document is in scope when its path starts with the work root and appears, byte for byte,
//! in the set of requested source files. No normalization happens here; callers pass paths in
//! the exact form the debug information records them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// The source files to instrument together with the root their reported paths are relative to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceScope {
    root: String,
    files: HashSet<String>,
}

impl SourceScope {
    /// Create a scope for `files` below `root`.
    ///
    /// The platform separator is appended to `root` if it does not end in one, so `/work/app`
    /// never matches documents below `/work/application`.
    pub fn new<I, S>(root: &str, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut root = root.to_string();
        if !root.ends_with(['/', '\\']) {
            root.push(std::path::MAIN_SEPARATOR);
        }

        SourceScope {
            root,
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// The work root, always ending in a separator.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Number of in-scope source files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no source file is in scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of `document` relative to the work root, or `None` if it is out of scope.
    #[must_use]
    pub fn resolve<'a>(&self, document: &'a str) -> Option<&'a str> {
        let relative = document.strip_prefix(self.root.as_str())?;
        if self.files.contains(document) {
            Some(relative)
        } else {
            None
        }
    }

    /// Returns `true` if `document` resolves in scope.
    #[must_use]
    pub fn contains(&self, document: &str) -> bool {
        self.resolve(document).is_some()
    }
}
