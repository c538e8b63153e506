//! Error types and utilities for datastore operations.

use std::fmt;

use crate::Key;
use crate::bucket::BucketError;

/// Result type for all datastore operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for datastore operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The key has no stored value.
    #[error("datastore: key '{key}' not found")]
    NotFound { key: Key },

    /// The query asks for something the bucket listing cannot express.
    #[error("datastore: invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// Invalid configuration.
    #[error("datastore: invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Remote bucket failure, passed through unchanged.
    #[error(transparent)]
    Bucket(#[from] BucketError),

    /// One or more jobs of a batch commit failed.
    #[error(transparent)]
    BatchCommit(#[from] BatchCommitError),

    /// The operation was cancelled before it completed.
    #[error("datastore: operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a not-found error for `key`.
    pub fn not_found(key: Key) -> Self {
        Self::NotFound { key }
    }

    /// Create an invalid query error.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether this error means the key has no stored value.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A single failed job of a batch commit.
#[derive(Debug)]
pub struct JobFailure {
    /// Human readable description of the job, e.g. `put /a`.
    pub job: String,
    /// Keys the job was responsible for.
    pub keys: Vec<Key>,
    /// Why the job failed.
    pub error: Box<Error>,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.job, self.error)
    }
}

/// Aggregate failure of a batch commit.
///
/// Failures are kept in job-dispatch order. The display form lists one failure
/// per line.
#[derive(Debug)]
pub struct BatchCommitError {
    failures: Vec<JobFailure>,
}

impl BatchCommitError {
    pub(crate) fn new(failures: Vec<JobFailure>) -> Self {
        Self { failures }
    }

    /// Every failed job in dispatch order.
    pub fn failures(&self) -> &[JobFailure] {
        &self.failures
    }

    /// Every key that belonged to a failed job.
    pub fn failed_keys(&self) -> impl Iterator<Item = &Key> {
        self.failures.iter().flat_map(|failure| failure.keys.iter())
    }
}

impl fmt::Display for BatchCommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("datastore: failed batch operation:")?;
        for failure in &self.failures {
            write!(f, "\n{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchCommitError {}
