//! Fixed-size worker pool draining a shared job queue.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::{Result, TRACING_TARGET_BATCH};

/// Result of one dispatched job, indexed by dispatch order.
///
/// `None` means the job never reported back, which only happens when a
/// worker task panicked.
pub(crate) type JobOutcomes = Vec<Option<Result<()>>>;

/// Runs `jobs` on `min(workers, jobs.len())` concurrent tasks.
///
/// Jobs are queued in order on a shared channel; each worker pulls the next
/// job, runs `handler` to completion and reports exactly one result. The
/// pool waits for every result and every worker before returning, so no
/// task outlives the call.
pub(crate) async fn run_pool<J, F, Fut>(jobs: Vec<J>, workers: usize, handler: F) -> JobOutcomes
where
    J: Send + 'static,
    F: Fn(J) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let num_jobs = jobs.len();
    let mut outcomes: JobOutcomes = (0..num_jobs).map(|_| None).collect();
    if num_jobs == 0 {
        return outcomes;
    }

    let num_workers = workers.clamp(1, num_jobs);
    let (job_tx, job_rx) = mpsc::channel::<(usize, J)>(num_jobs);
    let (result_tx, mut result_rx) = mpsc::channel::<(usize, Result<()>)>(num_jobs);
    let job_rx = Arc::new(Mutex::new(job_rx));

    tracing::debug!(
        target: TRACING_TARGET_BATCH,
        jobs = num_jobs,
        workers = num_workers,
        "Starting batch workers"
    );

    let mut tasks = JoinSet::new();
    for _ in 0..num_workers {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let handler = handler.clone();

        tasks.spawn(async move {
            loop {
                let next = job_rx.lock().await.recv().await;
                let Some((index, job)) = next else {
                    break;
                };

                let result = handler(job).await;
                if result_tx.send((index, result)).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(result_tx);

    // The queue holds every job, so sending never waits on a worker.
    for (index, job) in jobs.into_iter().enumerate() {
        if job_tx.send((index, job)).await.is_err() {
            tracing::error!(
                target: TRACING_TARGET_BATCH,
                index,
                "Job queue closed before dispatch finished"
            );
            break;
        }
    }
    drop(job_tx);

    let mut received = 0;
    while received < num_jobs {
        let Some((index, result)) = result_rx.recv().await else {
            break;
        };
        outcomes[index] = Some(result);
        received += 1;
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            tracing::error!(
                target: TRACING_TARGET_BATCH,
                error = %err,
                "Batch worker terminated abnormally"
            );
        }
    }

    tracing::debug!(
        target: TRACING_TARGET_BATCH,
        jobs = num_jobs,
        received,
        "Batch workers finished"
    );

    outcomes
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn runs_every_job_once() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let outcomes = run_pool((0..50).collect(), 4, move |_: usize| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(seen.load(Ordering::SeqCst), 50);
        assert_eq!(outcomes.len(), 50);
        assert!(outcomes.iter().all(|o| matches!(o, Some(Ok(())))));
    }

    #[tokio::test]
    async fn outcomes_follow_dispatch_order() {
        let outcomes = run_pool((0..10).collect(), 3, |i: usize| async move {
            // Later jobs finish first.
            tokio::time::sleep(Duration::from_millis(10 - i as u64)).await;
            if i % 2 == 0 {
                Err(Error::invalid_query(format!("job {i}")))
            } else {
                Ok(())
            }
        })
        .await;

        for (i, outcome) in outcomes.iter().enumerate() {
            match outcome {
                Some(Err(Error::InvalidQuery { reason })) => assert_eq!(reason, &format!("job {i}")),
                Some(Ok(())) => assert_eq!(i % 2, 1),
                other => panic!("unexpected outcome for job {i}: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));

        run_pool((0..40).collect(), 5, move |_: usize| {
            let (current, max) = (Arc::clone(&current), Arc::clone(&max));
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_job_list() {
        let outcomes = run_pool(Vec::<usize>::new(), 10, |_| async { Ok(()) }).await;
        assert!(outcomes.is_empty());
    }
}
