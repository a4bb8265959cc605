//! Bounded-concurrency background job queue.
//!
//! Jobs are submitted with [`WorkQueue::add`] and run on the tokio
//! runtime: at most `N` at a time, started in FIFO submission order as
//! capacity frees up. Each job's output (or failure) is delivered only to
//! its own [`JobHandle`]; one job failing or panicking never blocks or
//! cancels the others. Abandoning a handle does not cancel the job - it
//! runs to completion so the backing store is never left half-applied.
//!
//! A dispatcher task pulls jobs from a FIFO channel and starts each one
//! behind a semaphore permit. Completion is tracked with an
//! outstanding-job counter in a watch channel, which makes
//! [`WorkQueue::on_all_complete`] level-triggered and re-awaitable: it
//! resolves whenever the count is zero, and a later drain cycle can await
//! it again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use folio_core::{FolioResult, QueueError};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to a submitted job. Resolves with the job's output.
pub struct JobHandle<T> {
    rx: oneshot::Receiver<T>,
    rejected: bool,
}

impl<T> JobHandle<T> {
    /// Wait for the job to finish and take its output.
    ///
    /// Returns `QueueError::JobFailed` if the job panicked, and
    /// `QueueError::QueueClosed` if the queue was already shut down when
    /// the job was submitted.
    pub async fn join(self) -> FolioResult<T> {
        if self.rejected {
            return Err(QueueError::QueueClosed.into());
        }
        self.rx.await.map_err(|_| QueueError::JobFailed.into())
    }
}

/// Decrements the outstanding count when the job finishes, even by panic.
struct OutstandingGuard(watch::Sender<usize>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Bounded-concurrency job scheduler.
///
/// Must be created inside a tokio runtime; the dispatcher is a spawned
/// task that lives until the queue is dropped (pending jobs still drain).
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<Job>,
    outstanding: watch::Sender<usize>,
    concurrency: usize,
}

impl WorkQueue {
    /// Create a queue running at most `concurrency` jobs at once.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (outstanding, _) = watch::channel(0usize);
        let semaphore = Arc::new(Semaphore::new(concurrency));

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    job.await;
                    drop(permit);
                });
            }
        });

        Self {
            tx,
            outstanding,
            concurrency,
        }
    }

    /// The configured concurrency cap.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Jobs currently queued or running.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Enqueue a job; returns a handle resolving with its output.
    pub fn add<T, F>(&self, job: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.outstanding.send_modify(|count| *count += 1);
        let guard = OutstandingGuard(self.outstanding.clone());

        let wrapped: Job = Box::pin(async move {
            let _outstanding = guard;
            let output = job.await;
            let _ = result_tx.send(output);
        });

        // If the dispatcher is gone the wrapped job is dropped here, which
        // releases the guard and the result sender.
        let rejected = self.tx.send(wrapped).is_err();
        JobHandle {
            rx: result_rx,
            rejected,
        }
    }

    /// Resolve once no job is queued or running.
    ///
    /// Level-triggered on the outstanding count: jobs submitted after the
    /// count reaches zero start a new drain cycle that can be awaited
    /// again with a fresh call.
    pub async fn on_all_complete(&self) {
        let mut rx = self.outstanding.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}
