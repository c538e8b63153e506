//! Error type for remote bucket calls.

use std::fmt;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for [`Bucket`](super::Bucket) calls.
pub type BucketResult<T, E = BucketError> = std::result::Result<T, E>;

/// Classification of a bucket failure.
///
/// Only [`NotFound`](Self::NotFound) changes datastore behavior; every other
/// kind is passed through to the caller unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketErrorKind {
    /// The object does not exist.
    NotFound,
    /// Credentials were rejected or lack access.
    PermissionDenied,
    /// The request itself was malformed.
    InvalidInput,
    /// Any other transport or service failure.
    Unexpected,
}

impl fmt::Display for BucketErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::InvalidInput => "invalid input",
            Self::Unexpected => "unexpected",
        };
        f.write_str(label)
    }
}

/// A bucket failure carrying a kind, a message, and an optional source.
pub struct BucketError {
    kind: BucketErrorKind,
    message: String,
    source: Option<BoxedError>,
}

impl BucketError {
    /// Creates an error of the given kind.
    pub fn new(kind: BucketErrorKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
            source: None,
        }
    }

    /// Creates a not-found error for the object `name`.
    pub fn not_found(name: impl fmt::Display) -> Self {
        Self::new(BucketErrorKind::NotFound, format!("object '{name}' not found"))
    }

    /// Creates an unexpected error.
    pub fn unexpected(message: impl fmt::Display) -> Self {
        Self::new(BucketErrorKind::Unexpected, message)
    }

    /// Attaches a source error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error classification.
    pub fn kind(&self) -> BucketErrorKind {
        self.kind
    }

    /// Whether the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind == BucketErrorKind::NotFound
    }
}

impl fmt::Display for BucketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[bucket: {}] {}", self.kind, self.message)
    }
}

impl fmt::Debug for BucketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

impl std::error::Error for BucketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<object_store::Error> for BucketError {
    fn from(err: object_store::Error) -> Self {
        let kind = match err {
            object_store::Error::NotFound { .. } => BucketErrorKind::NotFound,
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => BucketErrorKind::PermissionDenied,
            object_store::Error::InvalidPath { .. }
            | object_store::Error::NotSupported { .. }
            | object_store::Error::NotImplemented => BucketErrorKind::InvalidInput,
            _ => BucketErrorKind::Unexpected,
        };
        Self::new(kind, &err).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = BucketError::not_found("a/b");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "[bucket: not found] object 'a/b' not found");
    }

    #[test]
    fn test_object_store_kind_mapping() {
        let err: BucketError = object_store::Error::NotFound {
            path: "a".to_string(),
            source: "missing".into(),
        }
        .into();
        assert!(err.is_not_found());
        assert!(std::error::Error::source(&err).is_some());

        let err: BucketError = object_store::Error::Generic {
            store: "S3",
            source: "boom".into(),
        }
        .into();
        assert_eq!(err.kind(), BucketErrorKind::Unexpected);
    }
}
