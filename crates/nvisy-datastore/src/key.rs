//! Hierarchical datastore keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Path separator shared by keys and remote object names.
pub(crate) const SEPARATOR: char = '/';

/// A hierarchical identifier for a stored value, e.g. `/blocks/CIQA`.
///
/// The canonical form always starts with `/`, never ends with one (except for
/// the root key itself), and contains no empty, `.` or `..` segments.
/// Equality and ordering follow the canonical string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Creates a key from any string, normalizing it to canonical form.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(clean_path(&format!("{SEPARATOR}{}", key.as_ref())))
    }

    /// Returns the root key `/`.
    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns its canonical string.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns `true` for the root key.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Returns the path segments of the key.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Returns the last segment, or an empty string for the root key.
    pub fn name(&self) -> &str {
        self.segments().last().unwrap_or_default()
    }

    /// Returns the parent key; the root is its own parent.
    pub fn parent(&self) -> Self {
        match self.0.rfind(SEPARATOR) {
            Some(0) | None => Self::root(),
            Some(idx) => Self(self.0[..idx].to_string()),
        }
    }

    /// Returns a key with `child` appended below this one.
    pub fn child(&self, child: impl AsRef<str>) -> Self {
        Self::new(format!("{}{SEPARATOR}{}", self.0, child.as_ref()))
    }

    /// Returns `true` if `other` lies strictly below this key.
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        if self.is_root() {
            return !other.is_root();
        }

        other
            .0
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
    }

    /// Returns `true` if this key lies strictly below `other`.
    pub fn is_descendant_of(&self, other: &Key) -> bool {
        other.is_ancestor_of(self)
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Key> for String {
    fn from(value: Key) -> Self {
        value.0
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lexically cleans a slash-separated path.
///
/// Collapses repeated separators, drops `.` segments, resolves `..` against
/// the preceding segment and strips any trailing separator. A rooted input
/// stays rooted. An empty result is returned as `""` for relative paths and
/// `"/"` for rooted ones.
pub(crate) fn clean_path(path: &str) -> String {
    let rooted = path.starts_with(SEPARATOR);
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("{SEPARATOR}{joined}")
    } else {
        joined
    }
}

/// Joins path elements with `/` and cleans the result, ignoring empty elements.
pub(crate) fn join_path(elements: &[&str]) -> String {
    let non_empty: Vec<&str> = elements.iter().copied().filter(|e| !e.is_empty()).collect();
    if non_empty.is_empty() {
        return String::new();
    }

    clean_path(&non_empty.join("/"))
}
