//! Buffered writes committed through a bounded worker pool.
//!
//! A [`Batch`] collects puts and deletes locally, keeping only the latest
//! operation per key. [`Batch::commit`] turns them into [`CommitJob`]s, one per
//! put and one per chunk of up to [`DELETE_MAX`](crate::DELETE_MAX) deletes,
//! and runs them on at most `workers` concurrent tasks. Every job runs to
//! completion; failures are collected into a single
//! [`BatchCommitError`](crate::BatchCommitError).

mod job;
mod worker;

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

pub use self::job::{CommitJob, PendingOp};
use self::job::plan_jobs;
use self::worker::run_pool;
use crate::bucket::{Bucket, BucketError};
use crate::{
    BatchCommitError, DEFAULT_WORKERS, DELETE_MAX, Error, JobFailure, Key, KeyMapper, Result,
    TRACING_TARGET_BATCH,
};

/// An uncommitted set of writes against a bucket datastore.
///
/// Put and delete only touch local state; nothing reaches the bucket until
/// [`commit`](Self::commit), which consumes the batch.
pub struct Batch {
    bucket: Arc<dyn Bucket>,
    mapper: KeyMapper,
    ops: BTreeMap<Key, PendingOp>,
    workers: usize,
    delete_max: usize,
    cancel_token: Option<CancellationToken>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new(bucket: Arc<dyn Bucket>, mapper: KeyMapper) -> Self {
        Self {
            bucket,
            mapper,
            ops: BTreeMap::new(),
            workers: DEFAULT_WORKERS,
            delete_max: DELETE_MAX,
            cancel_token: None,
        }
    }

    /// Sets the maximum number of concurrent commit workers (at least one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Cancels in-flight jobs when `token` fires; they report [`Error::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_delete_max(mut self, delete_max: usize) -> Self {
        self.delete_max = delete_max;
        self
    }

    /// Stores `value` under `key`, replacing any earlier operation on it.
    pub fn put(&mut self, key: Key, value: Bytes) {
        self.ops.insert(key, PendingOp::Put(value));
    }

    /// Removes `key`, replacing any earlier operation on it.
    pub fn delete(&mut self, key: Key) {
        self.ops.insert(key, PendingOp::Delete);
    }

    /// Returns the pending operation for `key`, if any.
    pub fn pending(&self, key: &Key) -> Option<&PendingOp> {
        self.ops.get(key)
    }

    /// Number of keys with a pending operation.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every pending operation to the bucket.
    ///
    /// Waits for all jobs, even after failures, and reports every failed job
    /// in dispatch order.
    pub async fn commit(self) -> Result<()> {
        let jobs = plan_jobs(self.ops, self.delete_max);
        if jobs.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            target: TRACING_TARGET_BATCH,
            bucket = %self.bucket.name(),
            jobs = jobs.len(),
            workers = self.workers.min(jobs.len()),
            "Committing batch"
        );

        let descriptions: Vec<(String, Vec<Key>)> = jobs
            .iter()
            .map(|job| (job.to_string(), job.keys()))
            .collect();

        let bucket = self.bucket;
        let mapper = Arc::new(self.mapper);
        let cancel_token = self.cancel_token;
        let outcomes = run_pool(jobs, self.workers, move |job: CommitJob| {
            let bucket = Arc::clone(&bucket);
            let mapper = Arc::clone(&mapper);
            let cancel_token = cancel_token.clone();
            async move {
                let run = job.run(bucket.as_ref(), &mapper);
                match cancel_token {
                    Some(token) => tokio::select! {
                        biased;
                        () = token.cancelled() => Err(Error::Cancelled),
                        result = run => result,
                    },
                    None => run.await,
                }
            }
        })
        .await;

        let failures: Vec<JobFailure> = outcomes
            .into_iter()
            .zip(descriptions)
            .filter_map(|(outcome, (job, keys))| {
                let error = match outcome {
                    Some(Ok(())) => return None,
                    Some(Err(error)) => error,
                    None => Error::Bucket(BucketError::unexpected("job did not report a result")),
                };
                Some(JobFailure {
                    job,
                    keys,
                    error: Box::new(error),
                })
            })
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        tracing::error!(
            target: TRACING_TARGET_BATCH,
            failed_jobs = failures.len(),
            "Batch commit failed"
        );

        Err(BatchCommitError::new(failures).into())
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("bucket", &self.bucket.name())
            .field("pending", &self.ops.len())
            .field("workers", &self.workers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{BucketCall, MemoryBucket};

    fn batch(bucket: &Arc<MemoryBucket>) -> Batch {
        Batch::new(bucket.clone(), KeyMapper::default())
    }

    #[tokio::test]
    async fn last_write_wins() {
        let bucket = Arc::new(MemoryBucket::new());
        let mut batch = batch(&bucket);
        let key = Key::new("/k");
        batch.put(key.clone(), Bytes::from("v1"));
        batch.delete(key.clone());
        batch.put(key.clone(), Bytes::from("v2"));
        assert_eq!(batch.len(), 1);

        batch.commit().await.unwrap();

        assert_eq!(bucket.put_calls(), vec!["/k".to_string()]);
        assert!(bucket.delete_many_calls().is_empty());
        assert_eq!(bucket.object("/k"), Some(Bytes::from("v2")));
    }

    #[tokio::test]
    async fn empty_commit_makes_no_calls() {
        let bucket = Arc::new(MemoryBucket::new());
        batch(&bucket).commit().await.unwrap();
        assert!(bucket.calls().is_empty());
    }

    #[tokio::test]
    async fn concurrent_commit_call_counts() {
        let bucket = Arc::new(MemoryBucket::new().with_latency(Duration::from_millis(1)));
        let mut batch = batch(&bucket).with_workers(10);
        for i in 0..250 {
            batch.put(Key::new(format!("/put/{i:04}")), Bytes::from(format!("{i}")));
        }
        for i in 0..2500 {
            batch.delete(Key::new(format!("/del/{i:04}")));
        }

        batch.commit().await.unwrap();

        assert_eq!(bucket.put_calls().len(), 250);
        let mut sizes: Vec<usize> = bucket.delete_many_calls().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![500, 1000, 1000]);
        let peak = bucket.peak_in_flight();
        assert!(peak > 1 && peak <= 10, "peak in flight: {peak}");
    }

    #[tokio::test]
    async fn job_count_for_small_delete_max() {
        let bucket = Arc::new(MemoryBucket::new());
        let mut batch = batch(&bucket).with_delete_max(3).with_workers(2);
        for i in 0..4 {
            batch.put(Key::new(format!("/p/{i}")), Bytes::from("x"));
        }
        for i in 0..7 {
            batch.delete(Key::new(format!("/d/{i}")));
        }

        batch.commit().await.unwrap();

        // 4 puts + ceil(7 / 3) delete chunks
        let mutating = bucket
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BucketCall::Put(_) | BucketCall::DeleteMany(_)))
            .count();
        assert_eq!(mutating, 4 + 3);
    }

    #[tokio::test]
    async fn deletes_of_missing_objects_succeed() {
        let bucket = Arc::new(MemoryBucket::new());
        bucket.insert("/present", Bytes::from("x"));

        let mut batch = batch(&bucket);
        batch.delete(Key::new("/present"));
        batch.delete(Key::new("/never-existed"));
        batch.commit().await.unwrap();

        assert_eq!(bucket.object("/present"), None);
    }

    #[tokio::test]
    async fn failures_are_aggregated_without_fail_fast() {
        let bucket = Arc::new(MemoryBucket::new());
        bucket.fail_put("/b");
        bucket.fail_put("/d");

        let mut batch = batch(&bucket).with_workers(2);
        for name in ["/a", "/b", "/c", "/d", "/e"] {
            batch.put(Key::new(name), Bytes::from("x"));
        }

        let commit = match batch.commit().await {
            Err(Error::BatchCommit(commit)) => commit,
            other => panic!("expected batch commit error, got {other:?}"),
        };

        let jobs: Vec<&str> = commit.failures().iter().map(|f| f.job.as_str()).collect();
        assert_eq!(jobs, vec!["put /b", "put /d"]);
        assert_eq!(
            commit.failed_keys().cloned().collect::<Vec<_>>(),
            vec![Key::new("/b"), Key::new("/d")]
        );

        // Every other put still went through.
        assert_eq!(bucket.put_calls().len(), 5);
        assert!(bucket.object("/a").is_some());
        assert!(bucket.object("/e").is_some());
    }

    #[tokio::test]
    async fn delete_many_failure_is_reported() {
        let bucket = Arc::new(MemoryBucket::new());
        bucket.fail_delete_many();

        let mut batch = batch(&bucket);
        batch.delete(Key::new("/a"));
        batch.put(Key::new("/b"), Bytes::from("x"));

        let err = batch.commit().await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("datastore: failed batch operation:"));
        assert!(message.contains("delete /a"));
        assert!(!message.contains("put /b"));
    }

    #[tokio::test]
    async fn cancelled_jobs_report_errors() {
        let bucket = Arc::new(MemoryBucket::new());
        let token = CancellationToken::new();
        token.cancel();

        let mut batch = batch(&bucket).with_cancellation(token);
        batch.put(Key::new("/a"), Bytes::from("x"));
        batch.delete(Key::new("/b"));

        let Err(Error::BatchCommit(commit)) = batch.commit().await else {
            panic!("expected batch commit error");
        };
        assert_eq!(commit.failures().len(), 2);
        assert!(
            commit
                .failures()
                .iter()
                .all(|f| matches!(*f.error, Error::Cancelled))
        );
    }

    #[tokio::test]
    async fn root_directory_is_applied() {
        let bucket = Arc::new(MemoryBucket::new());
        let mut batch = Batch::new(bucket.clone(), KeyMapper::new("root"));
        batch.put(Key::new("/a/b"), Bytes::from("x"));
        batch.commit().await.unwrap();

        assert_eq!(bucket.put_calls(), vec!["root/a/b".to_string()]);
    }
}
