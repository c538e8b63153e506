//! In-memory bucket for testing.
//!
//! [`MemoryBucket`] keeps objects in a sorted map, paginates listings with
//! markers like a real object store, records every call it receives, and can
//! be told to fail specific operations.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! nvisy-datastore = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::bucket::{
    Bucket, BucketError, BucketResult, DeleteReport, ListPage, ListRequest, ListedObject,
    ObjectMetadata,
};

/// A call received by a [`MemoryBucket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketCall {
    Put(String),
    Get(String),
    Head(String),
    Exists(String),
    Delete(String),
    DeleteMany(Vec<String>),
    List(ListRequest),
}

#[derive(Debug, Default)]
struct Failures {
    puts: HashSet<String>,
    gets: HashSet<String>,
    delete_many: bool,
    list_from_call: Option<usize>,
}

/// In-memory, call-recording [`Bucket`].
#[derive(Debug, Default)]
pub struct MemoryBucket {
    objects: Mutex<BTreeMap<String, Bytes>>,
    calls: Mutex<Vec<BucketCall>>,
    failures: Mutex<Failures>,
    list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryBucket {
    /// Creates an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency`, which makes concurrency observable.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Stores an object directly, without recording a call.
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.lock_objects().insert(name.into(), data.into());
    }

    /// Returns the stored object, without recording a call.
    pub fn object(&self, name: &str) -> Option<Bytes> {
        self.lock_objects().get(name).cloned()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock_objects().len()
    }

    /// Whether the bucket stores nothing.
    pub fn is_empty(&self) -> bool {
        self.lock_objects().is_empty()
    }

    /// Makes every put of `name` fail.
    pub fn fail_put(&self, name: impl Into<String>) {
        self.lock_failures().puts.insert(name.into());
    }

    /// Makes every get of `name` fail.
    pub fn fail_get(&self, name: impl Into<String>) {
        self.lock_failures().gets.insert(name.into());
    }

    /// Makes every multi-delete call fail.
    pub fn fail_delete_many(&self) {
        self.lock_failures().delete_many = true;
    }

    /// Makes the list call number `call` (zero based) and all later ones fail.
    pub fn fail_list_from(&self, call: usize) {
        self.lock_failures().list_from_call = Some(call);
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<BucketCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Object names of all put calls.
    pub fn put_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BucketCall::Put(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Object names of every multi-delete call.
    pub fn delete_many_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BucketCall::DeleteMany(names) => Some(names),
                _ => None,
            })
            .collect()
    }

    /// Every list request received.
    pub fn list_calls(&self) -> Vec<ListRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BucketCall::List(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Bytes>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, Failures> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn record(&self, call: BucketCall) -> InFlight<'_> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        guard
    }
}

/// Decrements the in-flight counter when a call completes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put_object(&self, name: &str, data: Bytes) -> BucketResult<()> {
        let _guard = self.record(BucketCall::Put(name.to_string())).await;
        if self.lock_failures().puts.contains(name) {
            return Err(BucketError::unexpected(format!("injected put failure for '{name}'")));
        }

        self.lock_objects().insert(name.to_string(), data);
        Ok(())
    }

    async fn get_object(&self, name: &str) -> BucketResult<Bytes> {
        let _guard = self.record(BucketCall::Get(name.to_string())).await;
        if self.lock_failures().gets.contains(name) {
            return Err(BucketError::unexpected(format!("injected get failure for '{name}'")));
        }

        self.object(name).ok_or_else(|| BucketError::not_found(name))
    }

    async fn get_object_metadata(&self, name: &str) -> BucketResult<ObjectMetadata> {
        let _guard = self.record(BucketCall::Head(name.to_string())).await;
        self.object(name)
            .map(|data| ObjectMetadata {
                content_length: data.len() as u64,
            })
            .ok_or_else(|| BucketError::not_found(name))
    }

    async fn object_exists(&self, name: &str) -> BucketResult<bool> {
        let _guard = self.record(BucketCall::Exists(name.to_string())).await;
        Ok(self.lock_objects().contains_key(name))
    }

    async fn delete_object(&self, name: &str) -> BucketResult<()> {
        let _guard = self.record(BucketCall::Delete(name.to_string())).await;
        self.lock_objects().remove(name);
        Ok(())
    }

    async fn delete_objects(&self, names: &[String], quiet: bool) -> BucketResult<DeleteReport> {
        let _guard = self.record(BucketCall::DeleteMany(names.to_vec())).await;
        if self.lock_failures().delete_many {
            return Err(BucketError::unexpected("injected multi-delete failure"));
        }

        let mut report = DeleteReport::default();
        let mut objects = self.lock_objects();
        for name in names {
            match objects.remove(name) {
                Some(_) if !quiet => report.deleted.push(name.clone()),
                Some(_) => {}
                // Some services report absent keys individually.
                None => report.failed.push(BucketError::not_found(name)),
            }
        }

        Ok(report)
    }

    async fn list_objects(&self, request: ListRequest) -> BucketResult<ListPage> {
        let _guard = self.record(BucketCall::List(request.clone())).await;
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .lock_failures()
            .list_from_call
            .is_some_and(|from| call >= from)
        {
            return Err(BucketError::unexpected("injected list failure"));
        }

        let objects = self.lock_objects();
        let mut matching = objects
            .iter()
            .filter(|(name, _)| name.starts_with(request.prefix.as_str()))
            .filter(|(name, _)| {
                request
                    .marker
                    .as_deref()
                    .is_none_or(|marker| name.as_str() > marker)
            })
            .map(|(name, data)| ListedObject {
                name: name.clone(),
                size: data.len() as u64,
            });

        let page: Vec<ListedObject> = matching.by_ref().take(request.max_keys).collect();
        let is_truncated = matching.next().is_some();
        let next_marker = if is_truncated {
            page.last().map(|object| object.name.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            is_truncated,
            next_marker,
        })
    }
}
