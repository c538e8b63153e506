//! Mapping between datastore keys and remote object names.

use crate::key::{Key, SEPARATOR, clean_path, join_path};

/// Converts [`Key`]s into object names under a root directory and back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMapper {
    root: String,
}

impl KeyMapper {
    /// Creates a mapper for the given root directory (may be empty).
    ///
    /// Leading and trailing separators are dropped: bucket object names
    /// never start with one, so `/ipfs/` and `ipfs` address the same objects.
    pub fn new(root_directory: impl Into<String>) -> Self {
        let root = clean_path(&root_directory.into())
            .trim_matches(SEPARATOR)
            .to_string();
        Self { root }
    }

    /// Returns the normalized root directory.
    pub fn root_directory(&self) -> &str {
        &self.root
    }

    /// Returns the remote object name for `key`.
    pub fn to_remote_name(&self, key: &Key) -> String {
        self.join(key.as_str())
    }

    /// Returns the remote prefix covering a raw key prefix such as a query prefix.
    pub fn to_remote_prefix(&self, prefix: &str) -> String {
        self.join(prefix)
    }

    /// Recovers the key from a remote object name.
    ///
    /// The first occurrence of the root directory is removed and the rest is
    /// parsed as a key.
    pub fn to_key(&self, remote_name: &str) -> Key {
        if self.root.is_empty() {
            return Key::new(remote_name);
        }

        Key::new(remote_name.replacen(self.root.as_str(), "", 1))
    }

    /// Returns `true` if `remote_name` lives under the root directory.
    pub fn contains(&self, remote_name: &str) -> bool {
        if self.root.is_empty() {
            return true;
        }

        remote_name
            .trim_start_matches(SEPARATOR)
            .strip_prefix(self.root.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(SEPARATOR))
    }

    fn join(&self, path: &str) -> String {
        join_path(&[self.root.as_str(), path])
    }
}
