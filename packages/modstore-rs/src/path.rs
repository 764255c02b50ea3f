//! Module paths: the identity of a module in the tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered sequence of child keys from the root module.
///
/// The empty path is the root. A plain string converts to a single-segment
/// path, so `"cart"` and `["cart"]` address the same module; keys are never
/// split on `/` or `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    /// The root path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from any sequence of keys.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// The path minus its last key. `None` for the root.
    pub fn parent(&self) -> Option<ModulePath> {
        match self.0.split_last() {
            Some((_, rest)) => Some(Self(rest.to_vec())),
            None => None,
        }
    }

    /// Last key of the path. `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// This path extended by one key.
    pub fn child(&self, key: impl Into<String>) -> ModulePath {
        let mut segments = self.0.clone();
        segments.push(key.into());
        Self(segments)
    }

    /// Keys joined with `/`.
    pub fn slashed(&self) -> String {
        self.0.join("/")
    }

    /// ` in module "a.b"` for error messages, empty for the root.
    pub(crate) fn location(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!(" in module \"{}\"", self)
        }
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for ModulePath {
    fn from(key: &str) -> Self {
        Self(vec![key.to_string()])
    }
}

impl From<String> for ModulePath {
    fn from(key: String) -> Self {
        Self(vec![key])
    }
}

impl From<Vec<String>> for ModulePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<Vec<&str>> for ModulePath {
    fn from(segments: Vec<&str>) -> Self {
        Self::new(segments)
    }
}

impl From<&[&str]> for ModulePath {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for ModulePath {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

impl From<&ModulePath> for ModulePath {
    fn from(path: &ModulePath) -> Self {
        path.clone()
    }
}

impl<'a> IntoIterator for &'a ModulePath {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
