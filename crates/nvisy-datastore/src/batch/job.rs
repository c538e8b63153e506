//! Pending operations and the commit jobs planned from them.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::bucket::Bucket;
use crate::{Error, Key, KeyMapper, Result, TRACING_TARGET_BATCH};

/// A buffered mutation for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    /// Store the value under the key.
    Put(Bytes),
    /// Remove the key.
    Delete,
}

impl PendingOp {
    /// Whether this operation removes the key.
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

/// One unit of remote work dispatched to a batch worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitJob {
    /// Upload a single object.
    Put { key: Key, value: Bytes },
    /// Remove up to [`DELETE_MAX`](crate::DELETE_MAX) objects in one call.
    Delete { keys: Vec<Key> },
}

impl CommitJob {
    /// Keys this job is responsible for.
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Self::Put { key, .. } => vec![key.clone()],
            Self::Delete { keys } => keys.clone(),
        }
    }

    /// Executes the job against the bucket.
    ///
    /// Objects reported missing by a multi-delete are not failures.
    pub(crate) async fn run(self, bucket: &dyn Bucket, mapper: &KeyMapper) -> Result<()> {
        match self {
            Self::Put { key, value } => {
                bucket
                    .put_object(&mapper.to_remote_name(&key), value)
                    .await?;
                Ok(())
            }
            Self::Delete { keys } => {
                let names: Vec<String> = keys.iter().map(|key| mapper.to_remote_name(key)).collect();
                let report = bucket.delete_objects(&names, true).await?;

                let mut failed = report.failed.into_iter().filter(|e| !e.is_not_found());
                match failed.next() {
                    Some(first) => {
                        let remaining = failed.count();
                        if remaining > 0 {
                            tracing::warn!(
                                target: TRACING_TARGET_BATCH,
                                additional_failures = remaining,
                                "Multi-delete reported several failed objects"
                            );
                        }
                        Err(Error::Bucket(first))
                    }
                    None => Ok(()),
                }
            }
        }
    }
}

impl fmt::Display for CommitJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put { key, .. } => write!(f, "put {key}"),
            Self::Delete { keys } => match keys.as_slice() {
                [only] => write!(f, "delete {only}"),
                [first, .., last] => write!(f, "delete {} keys ({first}..{last})", keys.len()),
                [] => f.write_str("delete 0 keys"),
            },
        }
    }
}

/// Plans the jobs for a set of pending operations.
///
/// Puts come first, one job per key in ascending key order. Deletes follow,
/// in ascending key order, chunked into jobs of at most `delete_max` keys.
pub(crate) fn plan_jobs(ops: BTreeMap<Key, PendingOp>, delete_max: usize) -> Vec<CommitJob> {
    let delete_max = delete_max.max(1);
    let mut jobs = Vec::new();
    let mut deletes = Vec::new();

    for (key, op) in ops {
        match op {
            PendingOp::Put(value) => jobs.push(CommitJob::Put { key, value }),
            PendingOp::Delete => deletes.push(key),
        }
    }

    jobs.extend(
        deletes
            .chunks(delete_max)
            .map(|chunk| CommitJob::Delete {
                keys: chunk.to_vec(),
            }),
    );

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(puts: usize, deletes: usize) -> BTreeMap<Key, PendingOp> {
        let mut ops = BTreeMap::new();
        for i in 0..puts {
            ops.insert(Key::new(format!("/put/{i:05}")), PendingOp::Put(Bytes::from("v")));
        }
        for i in 0..deletes {
            ops.insert(Key::new(format!("/del/{i:05}")), PendingOp::Delete);
        }
        ops
    }

    #[test]
    fn test_plan_counts() {
        let jobs = plan_jobs(ops(3, 2500), 1000);
        assert_eq!(jobs.len(), 3 + 3);

        let sizes: Vec<usize> = jobs
            .iter()
            .filter_map(|job| match job {
                CommitJob::Delete { keys } => Some(keys.len()),
                CommitJob::Put { .. } => None,
            })
            .collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
    }

    #[test]
    fn test_plan_puts_before_deletes() {
        let jobs = plan_jobs(ops(2, 1), 1000);
        assert!(matches!(jobs[0], CommitJob::Put { .. }));
        assert!(matches!(jobs[1], CommitJob::Put { .. }));
        assert!(matches!(jobs[2], CommitJob::Delete { .. }));
        assert_eq!(jobs[0].keys(), vec![Key::new("/put/00000")]);
    }

    #[test]
    fn test_plan_exact_multiple() {
        assert_eq!(plan_jobs(ops(0, 2000), 1000).len(), 2);
        assert_eq!(plan_jobs(ops(0, 0), 1000).len(), 0);
        assert_eq!(plan_jobs(ops(0, 1), 1000).len(), 1);
    }

    #[test]
    fn test_job_display() {
        let put = CommitJob::Put {
            key: Key::new("/a"),
            value: Bytes::new(),
        };
        assert_eq!(put.to_string(), "put /a");

        let delete = CommitJob::Delete {
            keys: vec![Key::new("/a"), Key::new("/b"), Key::new("/c")],
        };
        assert_eq!(delete.to_string(), "delete 3 keys (/a../c)");
    }
}
