//! [`Bucket`] implementation backed by [`object_store::ObjectStore`].
//!
//! [`ObjectStoreBucket`] is a thin, cloneable wrapper around
//! `Arc<dyn ObjectStore>`. Marker-based listing maps onto
//! [`ObjectStore::list_with_offset`] and multi-object deletes onto
//! [`ObjectStore::delete_stream`], so any backend with ordered listings
//! (S3, OSS, MinIO, the in-memory store) can serve a datastore.

use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use super::{
    Bucket, BucketError, BucketErrorKind, BucketResult, DeleteReport, ListPage, ListRequest,
    ListedObject, ObjectMetadata,
};
use crate::{DatastoreConfig, TRACING_TARGET_BUCKET};

/// Region used when the configuration does not name one.
const DEFAULT_REGION: &str = "us-east-1";

/// Cloneable handle to any [`ObjectStore`] backend (S3, OSS, MinIO, ...).
#[derive(Clone, Debug)]
pub struct ObjectStoreBucket {
    store: Arc<dyn ObjectStore>,
    name: Arc<String>,
}

impl ObjectStoreBucket {
    /// Wraps a concrete [`ObjectStore`] implementation.
    pub fn new(name: impl Into<String>, store: impl ObjectStore) -> Self {
        Self::from_arc(name, Arc::new(store))
    }

    /// Wraps a shared [`ObjectStore`].
    pub fn from_arc(name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            name: Arc::new(name.into()),
        }
    }

    /// Builds an S3-compatible bucket client from the datastore configuration.
    pub fn connect(config: &DatastoreConfig) -> BucketResult<Self> {
        let region = config.region.as_deref().unwrap_or(DEFAULT_REGION);
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket_name)
            .with_region(region)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.access_key_secret);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
        }

        let store = builder.build().map_err(|e| {
            BucketError::new(
                BucketErrorKind::InvalidInput,
                format!("failed to create bucket client: {e}"),
            )
            .with_source(e)
        })?;

        tracing::debug!(
            target: TRACING_TARGET_BUCKET,
            bucket = %config.bucket_name,
            endpoint = ?config.endpoint,
            region = %region,
            "Bucket client created"
        );

        Ok(Self::new(config.bucket_name.clone(), store))
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

/// Converts an object name into a store path; an empty path addresses the root.
///
/// Names are taken verbatim, so listed locations read back as the same names.
fn to_path(name: &str) -> BucketResult<Path> {
    Ok(Path::parse(name).map_err(object_store::Error::from)?)
}

fn to_prefix(prefix: &str) -> BucketResult<Option<Path>> {
    let path = to_path(prefix)?;
    if path.as_ref().is_empty() {
        Ok(None)
    } else {
        Ok(Some(path))
    }
}

#[async_trait::async_trait]
impl Bucket for ObjectStoreBucket {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(name = "bucket.put", skip(self, data), fields(size = data.len()))]
    async fn put_object(&self, name: &str, data: Bytes) -> BucketResult<()> {
        self.store
            .put(&to_path(name)?, PutPayload::from(data))
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "bucket.get", skip(self))]
    async fn get_object(&self, name: &str) -> BucketResult<Bytes> {
        let result = self.store.get(&to_path(name)?).await?;
        Ok(result.bytes().await?)
    }

    #[tracing::instrument(name = "bucket.head", skip(self))]
    async fn get_object_metadata(&self, name: &str) -> BucketResult<ObjectMetadata> {
        let meta = self.store.head(&to_path(name)?).await?;
        Ok(ObjectMetadata {
            content_length: meta.size,
        })
    }

    #[tracing::instrument(name = "bucket.exists", skip(self))]
    async fn object_exists(&self, name: &str) -> BucketResult<bool> {
        match self.store.head(&to_path(name)?).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(name = "bucket.delete", skip(self))]
    async fn delete_object(&self, name: &str) -> BucketResult<()> {
        match self.store.delete(&to_path(name)?).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(name = "bucket.delete_many", skip(self, names), fields(count = names.len()))]
    async fn delete_objects(&self, names: &[String], quiet: bool) -> BucketResult<DeleteReport> {
        let locations = futures::stream::iter(
            names
                .iter()
                .map(|name| Path::parse(name).map_err(object_store::Error::from)),
        )
        .boxed();
        let mut results = self.store.delete_stream(locations);

        let mut report = DeleteReport::default();
        while let Some(result) = results.next().await {
            match result {
                Ok(path) if !quiet => report.deleted.push(path.to_string()),
                Ok(_) => {}
                Err(e) => report.failed.push(e.into()),
            }
        }

        Ok(report)
    }

    #[tracing::instrument(
        name = "bucket.list",
        skip(self, request),
        fields(prefix = %request.prefix, max_keys = request.max_keys, marker = ?request.marker)
    )]
    async fn list_objects(&self, request: ListRequest) -> BucketResult<ListPage> {
        let prefix = to_prefix(&request.prefix)?;
        let listing = match &request.marker {
            Some(marker) => self
                .store
                .list_with_offset(prefix.as_ref(), &to_path(marker)?),
            None => self.store.list(prefix.as_ref()),
        };

        // One extra object tells whether the page is truncated.
        let mut objects: Vec<ListedObject> = listing
            .take(request.max_keys.saturating_add(1))
            .map_ok(|meta| ListedObject {
                name: meta.location.to_string(),
                size: meta.size,
            })
            .try_collect()
            .await?;

        let is_truncated = objects.len() > request.max_keys;
        if is_truncated {
            objects.truncate(request.max_keys);
        }

        let next_marker = if is_truncated {
            objects.last().map(|object| object.name.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            is_truncated,
            next_marker,
        })
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;

    use super::*;

    fn test_bucket() -> ObjectStoreBucket {
        ObjectStoreBucket::new("test", InMemory::new())
    }

    #[tokio::test]
    async fn put_and_get() {
        let bucket = test_bucket();
        let data = Bytes::from("hello world");
        bucket.put_object("dir/a", data.clone()).await.unwrap();

        assert_eq!(bucket.get_object("dir/a").await.unwrap(), data);
        let meta = bucket.get_object_metadata("dir/a").await.unwrap();
        assert_eq!(meta.content_length, 11);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let bucket = test_bucket();
        assert!(bucket.get_object("missing").await.unwrap_err().is_not_found());
        assert!(
            bucket
                .get_object_metadata("missing")
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(!bucket.object_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let bucket = test_bucket();
        bucket.put_object("a", Bytes::from("x")).await.unwrap();
        bucket.delete_object("a").await.unwrap();
        bucket.delete_object("a").await.unwrap();
        assert!(!bucket.object_exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn delete_many() {
        let bucket = test_bucket();
        for i in 0..5 {
            bucket
                .put_object(&format!("del/{i}"), Bytes::from("x"))
                .await
                .unwrap();
        }

        let names: Vec<String> = (0..5).map(|i| format!("del/{i}")).collect();
        let report = bucket.delete_objects(&names, false).await.unwrap();
        assert_eq!(report.deleted.len(), 5);

        let page = bucket.list_objects(ListRequest::new("del", 10)).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn list_pages_with_marker() {
        let bucket = test_bucket();
        for i in 0..5 {
            bucket
                .put_object(&format!("p/{i}"), Bytes::from(vec![0u8; i]))
                .await
                .unwrap();
        }
        bucket.put_object("q/0", Bytes::from("x")).await.unwrap();

        let first = bucket.list_objects(ListRequest::new("p", 2)).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.is_truncated);
        assert_eq!(first.next_marker.as_deref(), Some("p/1"));
        assert_eq!(first.objects[1].size, 1);

        let marker = first.next_marker.unwrap();
        let second = bucket
            .list_objects(ListRequest::new("p", 10).with_marker(marker))
            .await
            .unwrap();
        assert_eq!(second.len(), 3);
        assert!(!second.is_truncated);
        assert_eq!(second.next_marker, None);
        assert_eq!(second.objects[0].name, "p/2");
    }

    #[tokio::test]
    async fn reserved_characters_list_verbatim() {
        let bucket = test_bucket();
        let name = "blocks/a#b~c%d[e]|f*g";
        bucket.put_object(name, Bytes::from("x")).await.unwrap();

        let page = bucket.list_objects(ListRequest::new("blocks", 10)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.objects[0].name, name);
        assert_eq!(
            bucket.get_object(&page.objects[0].name).await.unwrap(),
            Bytes::from("x")
        );
    }

    #[tokio::test]
    async fn leading_separator_addresses_same_object() {
        let bucket = test_bucket();
        bucket.put_object("/blocks/a", Bytes::from("x")).await.unwrap();

        assert!(bucket.object_exists("blocks/a").await.unwrap());
        let page = bucket.list_objects(ListRequest::new("/blocks", 10)).await.unwrap();
        assert_eq!(page.objects[0].name, "blocks/a");
    }

    #[tokio::test]
    async fn control_characters_are_invalid_input() {
        let bucket = test_bucket();
        let err = bucket.put_object("a\u{1}b", Bytes::from("x")).await.unwrap_err();
        assert_eq!(err.kind(), BucketErrorKind::InvalidInput);
    }
}
