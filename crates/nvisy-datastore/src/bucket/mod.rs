//! Remote bucket abstraction.
//!
//! The datastore never talks to a storage SDK directly. It sequences calls on
//! a [`Bucket`], a flat namespace of named byte objects that supports single
//! and multi-object deletes and marker-based listing.
//!
//! - [`ObjectStoreBucket`] - production implementation over [`object_store`]
//! - [`BucketError`] - failure type with a [`BucketErrorKind`] classification

mod error;
mod object_store_bucket;

use bytes::Bytes;

pub use self::error::{BucketError, BucketErrorKind, BucketResult};
pub use self::object_store_bucket::ObjectStoreBucket;

/// A flat object-storage namespace addressed by object name.
///
/// Implementations must be safe to share across tasks; the datastore calls
/// them concurrently from batch workers and queries.
#[async_trait::async_trait]
pub trait Bucket: Send + Sync + 'static {
    /// Name of the bucket, used for logging.
    fn name(&self) -> &str;

    /// Uploads `data` as the object `name`, replacing any previous content.
    async fn put_object(&self, name: &str, data: Bytes) -> BucketResult<()>;

    /// Downloads the full content of the object `name`.
    ///
    /// Fails with [`BucketErrorKind::NotFound`] when the object is absent.
    async fn get_object(&self, name: &str) -> BucketResult<Bytes>;

    /// Fetches object metadata without downloading the body.
    ///
    /// Fails with [`BucketErrorKind::NotFound`] when the object is absent.
    async fn get_object_metadata(&self, name: &str) -> BucketResult<ObjectMetadata>;

    /// Returns whether the object `name` exists.
    async fn object_exists(&self, name: &str) -> BucketResult<bool>;

    /// Removes the object `name`. Removing an absent object succeeds.
    async fn delete_object(&self, name: &str) -> BucketResult<()>;

    /// Removes many objects in one call.
    ///
    /// In quiet mode the report lists only failures. Per-object failures are
    /// reported in [`DeleteReport::failed`] rather than failing the call.
    async fn delete_objects(&self, names: &[String], quiet: bool) -> BucketResult<DeleteReport>;

    /// Lists up to `request.max_keys` objects whose names start with
    /// `request.prefix`, in ascending name order, strictly after
    /// `request.marker` when one is given.
    async fn list_objects(&self, request: ListRequest) -> BucketResult<ListPage>;
}

/// Metadata returned by [`Bucket::get_object_metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Size of the object body in bytes.
    pub content_length: u64,
}

/// Outcome of a [`Bucket::delete_objects`] call.
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Names confirmed deleted (empty in quiet mode).
    pub deleted: Vec<String>,
    /// Per-object failures.
    pub failed: Vec<BucketError>,
}

/// Parameters of a single [`Bucket::list_objects`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Object name prefix to list under.
    pub prefix: String,
    /// Maximum number of objects in the returned page.
    pub max_keys: usize,
    /// Continuation marker from the previous page.
    pub marker: Option<String>,
}

impl ListRequest {
    /// Creates a request for the first page under `prefix`.
    pub fn new(prefix: impl Into<String>, max_keys: usize) -> Self {
        Self {
            prefix: prefix.into(),
            max_keys,
            marker: None,
        }
    }

    /// Continues a listing after `marker`.
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }
}

/// A single object in a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    /// Remote object name.
    pub name: String,
    /// Object size in bytes.
    pub size: u64,
}

/// One page of a remote listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects in ascending name order.
    pub objects: Vec<ListedObject>,
    /// Whether more objects follow this page.
    pub is_truncated: bool,
    /// Marker to continue from; only meaningful when truncated.
    pub next_marker: Option<String>,
}

impl ListPage {
    /// Number of objects on the page.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the page holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
