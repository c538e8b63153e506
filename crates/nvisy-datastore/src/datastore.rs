//! Key/value datastore over a remote bucket.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::batch::Batch;
use crate::bucket::{Bucket, BucketError, ObjectStoreBucket};
use crate::query::{ListingIterator, Query, QueryResults};
use crate::{DatastoreConfig, Error, Key, KeyMapper, Result, TRACING_TARGET_DATASTORE};

/// Generic key/value storage interface.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn put(&self, key: &Key, value: Bytes) -> Result<()>;

    /// Returns the value stored under `key`.
    ///
    /// Fails with [`Error::NotFound`] when there is none.
    async fn get(&self, key: &Key) -> Result<Bytes>;

    /// Returns the size in bytes of the value stored under `key`.
    ///
    /// Fails with [`Error::NotFound`] when there is none.
    async fn get_size(&self, key: &Key) -> Result<u64>;

    /// Returns whether a value is stored under `key`.
    async fn has(&self, key: &Key) -> Result<bool>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &Key) -> Result<()>;

    /// Lists keys, and optionally values, matching `query`.
    async fn query(&self, query: Query) -> Result<QueryResults>;

    /// Flushes pending writes under `prefix` to durable storage.
    async fn sync(&self, prefix: &Key) -> Result<()>;

    /// Releases resources held by the datastore.
    async fn close(&self) -> Result<()>;
}

/// A [`Datastore`] that can group writes into a [`Batch`].
pub trait Batching: Datastore {
    /// Starts an empty batch.
    fn batch(&self) -> Batch;
}

/// [`Datastore`] storing every key as one object of a [`Bucket`].
#[derive(Clone)]
pub struct BucketDatastore {
    bucket: Arc<dyn Bucket>,
    mapper: KeyMapper,
    workers: usize,
}

impl BucketDatastore {
    /// Creates a datastore over an existing bucket client.
    pub fn new(bucket: Arc<dyn Bucket>, root_directory: impl Into<String>, workers: usize) -> Self {
        Self {
            bucket,
            mapper: KeyMapper::new(root_directory),
            workers: workers.max(1),
        }
    }

    /// Validates `config` and connects to the S3-compatible bucket it names.
    pub fn connect(config: &DatastoreConfig) -> Result<Self> {
        config.validate()?;
        let bucket = ObjectStoreBucket::connect(config)?;
        let datastore = Self::new(
            Arc::new(bucket),
            config.root_directory.clone(),
            config.workers(),
        );

        tracing::info!(
            target: TRACING_TARGET_DATASTORE,
            bucket = %config.bucket_name,
            root_directory = %config.root_directory,
            workers = datastore.workers,
            "Datastore initialized"
        );

        Ok(datastore)
    }

    /// Returns the bucket client.
    pub fn bucket(&self) -> &Arc<dyn Bucket> {
        &self.bucket
    }

    /// Returns the key mapper.
    pub fn mapper(&self) -> &KeyMapper {
        &self.mapper
    }

    /// Returns the batch commit worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn not_found(key: &Key, error: BucketError) -> Error {
        if error.is_not_found() {
            Error::not_found(key.clone())
        } else {
            error.into()
        }
    }
}

/// Downloads the value of `key`, mapping a missing object to [`Error::NotFound`].
pub(crate) async fn fetch_value(
    bucket: &dyn Bucket,
    mapper: &KeyMapper,
    key: &Key,
) -> Result<Bytes> {
    bucket
        .get_object(&mapper.to_remote_name(key))
        .await
        .map_err(|e| BucketDatastore::not_found(key, e))
}

#[async_trait]
impl Datastore for BucketDatastore {
    async fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        tracing::trace!(target: TRACING_TARGET_DATASTORE, key = %key, size = value.len(), "Put");
        self.bucket
            .put_object(&self.mapper.to_remote_name(key), value)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &Key) -> Result<Bytes> {
        tracing::trace!(target: TRACING_TARGET_DATASTORE, key = %key, "Get");
        fetch_value(self.bucket.as_ref(), &self.mapper, key).await
    }

    async fn get_size(&self, key: &Key) -> Result<u64> {
        let metadata = self
            .bucket
            .get_object_metadata(&self.mapper.to_remote_name(key))
            .await
            .map_err(|e| Self::not_found(key, e))?;
        Ok(metadata.content_length)
    }

    async fn has(&self, key: &Key) -> Result<bool> {
        Ok(self
            .bucket
            .object_exists(&self.mapper.to_remote_name(key))
            .await?)
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        tracing::trace!(target: TRACING_TARGET_DATASTORE, key = %key, "Delete");
        match self
            .bucket
            .delete_object(&self.mapper.to_remote_name(key))
            .await
        {
            Err(e) if !e.is_not_found() => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn query(&self, query: Query) -> Result<QueryResults> {
        let iterator =
            ListingIterator::start(Arc::clone(&self.bucket), self.mapper.clone(), &query).await?;
        Ok(QueryResults::new(query, iterator))
    }

    async fn sync(&self, _prefix: &Key) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl Batching for BucketDatastore {
    fn batch(&self) -> Batch {
        Batch::new(Arc::clone(&self.bucket), self.mapper.clone()).with_workers(self.workers)
    }
}

impl std::fmt::Debug for BucketDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketDatastore")
            .field("bucket", &self.bucket.name())
            .field("root_directory", &self.mapper.root_directory())
            .field("workers", &self.workers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;

    use super::*;
    use crate::mock::MemoryBucket;

    fn datastore(bucket: &Arc<MemoryBucket>) -> BucketDatastore {
        BucketDatastore::new(bucket.clone(), "", 4)
    }

    #[tokio::test]
    async fn put_get_size_has() {
        let bucket = Arc::new(MemoryBucket::new());
        let store = datastore(&bucket);
        let key = Key::new("/blocks/abc");

        store.put(&key, Bytes::from("hello")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Bytes::from("hello"));
        assert_eq!(store.get_size(&key).await.unwrap(), 5);
        assert!(store.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let bucket = Arc::new(MemoryBucket::new());
        let store = datastore(&bucket);
        let key = Key::new("/missing");

        let err = store.get(&key).await.unwrap_err();
        assert!(matches!(&err, Error::NotFound { key: k } if *k == key));
        assert!(store.get_size(&key).await.unwrap_err().is_not_found());
        assert!(!store.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let bucket = Arc::new(MemoryBucket::new());
        let store = datastore(&bucket);
        let key = Key::new("/k");

        store.put(&key, Bytes::from("v")).await.unwrap();
        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        assert!(!store.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn remote_errors_pass_through() {
        let bucket = Arc::new(MemoryBucket::new());
        bucket.fail_get("/k");
        let err = datastore(&bucket).get(&Key::new("/k")).await.unwrap_err();
        assert!(matches!(err, Error::Bucket(_)));
    }

    #[tokio::test]
    async fn root_directory_prefixes_names() {
        let bucket = Arc::new(MemoryBucket::new());
        let store = BucketDatastore::new(bucket.clone(), "ipfs", 4);

        store.put(&Key::new("/a"), Bytes::from("v")).await.unwrap();
        assert_eq!(bucket.object("ipfs/a"), Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn batch_uses_configured_workers() {
        let bucket = Arc::new(MemoryBucket::new());
        let store = datastore(&bucket);

        let mut batch = store.batch();
        batch.put(Key::new("/a"), Bytes::from("1"));
        batch.put(Key::new("/b"), Bytes::from("2"));
        batch.commit().await.unwrap();

        assert_eq!(store.get(&Key::new("/b")).await.unwrap(), Bytes::from("2"));
    }

    #[tokio::test]
    async fn query_enforces_limit_and_rejects_orders() {
        let bucket = Arc::new(MemoryBucket::new());
        let store = datastore(&bucket);
        for i in 0..10 {
            store
                .put(&Key::new(format!("/q/{i}")), Bytes::from("x"))
                .await
                .unwrap();
        }

        let entries = store
            .query(Query::new("/q").with_limit(3))
            .await
            .unwrap()
            .rest()
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.value.is_some()));

        let calls_before = bucket.calls().len();
        let err = store
            .query(Query::new("/q").with_order(crate::query::Order::KeyAscending))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
        assert_eq!(bucket.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn sync_and_close_are_noops() {
        let bucket = Arc::new(MemoryBucket::new());
        let store = datastore(&bucket);
        store.sync(&Key::root()).await.unwrap();
        store.close().await.unwrap();
        assert!(bucket.calls().is_empty());
    }

    #[tokio::test]
    async fn works_over_object_store() {
        let bucket = Arc::new(ObjectStoreBucket::new("memory", InMemory::new()));
        let store = BucketDatastore::new(bucket, "root", 8);

        let mut batch = store.batch();
        for i in 0..25 {
            batch.put(Key::new(format!("/blocks/{i:02}")), Bytes::from(format!("{i}")));
        }
        batch.put(Key::new("/other/x"), Bytes::from("x"));
        batch.commit().await.unwrap();

        let entries = store
            .query(Query::new("/blocks").keys_only())
            .await
            .unwrap()
            .rest()
            .await
            .unwrap();
        assert_eq!(entries.len(), 25);
        assert_eq!(entries[0].key, Key::new("/blocks/00"));

        let mut batch = store.batch();
        for entry in &entries {
            batch.delete(entry.key.clone());
        }
        batch.commit().await.unwrap();

        assert!(!store.has(&Key::new("/blocks/00")).await.unwrap());
        assert!(store.has(&Key::new("/other/x")).await.unwrap());
    }

    #[tokio::test]
    async fn reserved_characters_survive_listing() {
        let bucket = Arc::new(ObjectStoreBucket::new("memory", InMemory::new()));
        let store = BucketDatastore::new(bucket, "", 4);
        let key = Key::new("/blocks/a#b~c");
        store.put(&key, Bytes::from("v")).await.unwrap();

        let entries = store
            .query(Query::new("/blocks"))
            .await
            .unwrap()
            .rest()
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, key);
        assert_eq!(entries[0].value, Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn rooted_root_directory_lists_entries() {
        let bucket = Arc::new(ObjectStoreBucket::new("memory", InMemory::new()));
        let store = BucketDatastore::new(bucket, "/ipfs", 4);
        store.put(&Key::new("/blocks/a"), Bytes::from("v")).await.unwrap();

        let entries = store
            .query(Query::new("/blocks").keys_only())
            .await
            .unwrap()
            .rest()
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, Key::new("/blocks/a"));
        assert_eq!(store.get(&Key::new("/blocks/a")).await.unwrap(), Bytes::from("v"));
    }
}
