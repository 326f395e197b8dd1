// 🚦 Job Queue - One conversion at a time, in arrival order
//
// A single worker task drains a FIFO channel. Each job runs on a blocking
// thread (conversion, load and backup are synchronous CPU/disk work), and the
// worker waits for it before taking the next one.
//
// No retries, no cancellation: a submitted job runs to completion.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Pending jobs the channel holds before `submit` waits for room
pub const QUEUE_CAPACITY: usize = 64;

type BoxedJob = Box<dyn FnOnce() + Send + 'static>;

struct QueuedJob {
    id: Uuid,
    run: BoxedJob,
}

/// Result of one job, tagged with its id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult<T> {
    pub job_id: Uuid,
    pub output: T,
}

pub struct JobQueue {
    sender: mpsc::Sender<QueuedJob>,
    pending: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

impl JobQueue {
    /// Start the queue and its single worker (must be called inside a runtime)
    pub fn start() -> Self {
        let (sender, receiver) = mpsc::channel::<QueuedJob>(QUEUE_CAPACITY);
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(worker_loop(receiver, Arc::clone(&pending)));

        info!("Job queue started");
        JobQueue {
            sender,
            pending,
            worker,
        }
    }

    /// Jobs submitted but not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Enqueue a job and wait for its result
    pub async fn submit<F, T>(&self, job: F) -> Result<JobResult<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let id = Uuid::new_v4();
        let (result_tx, result_rx) = oneshot::channel::<Result<T>>();

        let run: BoxedJob = Box::new(move || {
            // Receiver gone means the submitter stopped waiting; nothing to report to
            let _ = result_tx.send(job());
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(QueuedJob { id, run }).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow!("Job queue is shut down"));
        }
        debug!(job_id = %id, "job queued");

        let output = result_rx
            .await
            .context("Job worker dropped the job before finishing")??;

        Ok(JobResult { job_id: id, output })
    }

    /// Stop accepting jobs, let queued ones finish, then join the worker
    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.worker.await;
        info!("Job queue shut down");
    }
}

async fn worker_loop(mut receiver: mpsc::Receiver<QueuedJob>, pending: Arc<AtomicUsize>) {
    while let Some(job) = receiver.recv().await {
        info!(job_id = %job.id, "job started");

        match tokio::task::spawn_blocking(job.run).await {
            Ok(()) => info!(job_id = %job.id, "job finished"),
            Err(e) => error!(job_id = %job.id, error = %e, "job panicked"),
        }

        pending.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_submit_returns_output() {
        let queue = JobQueue::start();
        let result = queue.submit(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(result.output, 42);
        assert_eq!(queue.pending(), 0);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_job_error_is_returned() {
        let queue = JobQueue::start();
        let result: Result<JobResult<()>> = queue.submit(|| Err(anyhow!("boom"))).await;
        assert!(result.unwrap_err().to_string().contains("boom"));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_jobs_run_one_at_a_time_in_order() {
        let queue = Arc::new(JobQueue::start());
        let log = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for n in 0..4 {
            let queue = Arc::clone(&queue);
            let log = Arc::clone(&log);
            let active = Arc::clone(&active);
            handles.push(tokio::spawn(async move {
                queue
                    .submit(move || {
                        let concurrent = active.fetch_add(1, Ordering::SeqCst) + 1;
                        std::thread::sleep(Duration::from_millis(10));
                        log.lock().unwrap().push((n, concurrent));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(n)
                    })
                    .await
                    .unwrap()
            }));
            // Let each submission reach the channel before the next
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert!(log.iter().all(|(_, concurrent)| *concurrent == 1));
        let order: Vec<i32> = log.iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_job_ids_are_unique() {
        let queue = JobQueue::start();
        let a = queue.submit(|| Ok(())).await.unwrap();
        let b = queue.submit(|| Ok(())).await.unwrap();
        assert_ne!(a.job_id, b.job_id);
        queue.shutdown().await;
    }
}
