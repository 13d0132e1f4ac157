//! Fixed-size worker pool.
//!
//! Workers share one bounded job channel and report on a result channel sized to the job
//! count, so a worker never blocks on reporting. With fail-fast enabled the first failure
//! flips a watch signal: the dispatcher stops handing out jobs and queued jobs are
//! reported as cancelled, while jobs already running finish.

use super::{Error, TransferFailure, TransferReport};
use crate::resource::TransferJob;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info_span, Instrument};

/// Performs one transfer job, returning the number of files it transferred.
pub trait TransferHandler: Send + Sync + 'static {
    fn transfer(&self, job: &TransferJob) -> impl Future<Output = Result<usize, Error>> + Send;
}

enum JobOutcome {
    Finished {
        job: TransferJob,
        result: Result<usize, Error>,
    },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    concurrency: usize,
    fail_fast: bool,
}

impl WorkerPool {
    /// Pool of `concurrency` workers, at least one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            fail_fast: false,
        }
    }

    /// Stops dispatching further jobs after the first failure.
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every job at most once and collects the outcome.
    pub async fn run<H: TransferHandler>(
        &self,
        jobs: Vec<TransferJob>,
        handler: Arc<H>,
    ) -> TransferReport {
        let mut report = TransferReport::default();
        let total = jobs.len();
        if total == 0 {
            return report;
        }

        let workers = self.concurrency.min(total);
        let (job_tx, job_rx) = mpsc::channel::<TransferJob>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<JobOutcome>(total);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let cancel_tx = Arc::clone(&cancel_tx);
            let cancel_rx = cancel_rx.clone();
            let handler = Arc::clone(&handler);
            let fail_fast = self.fail_fast;

            let task = async move {
                loop {
                    let next = job_rx.lock().await.recv().await;
                    let Some(job) = next else {
                        break;
                    };

                    if *cancel_rx.borrow() {
                        let _ = result_tx.send(JobOutcome::Cancelled).await;
                        continue;
                    }

                    let result = handler
                        .transfer(&job)
                        .instrument(info_span!("transfer", resource = %job.resource_name))
                        .await;
                    if result.is_err() && fail_fast {
                        cancel_tx.send_replace(true);
                    }
                    let _ = result_tx.send(JobOutcome::Finished { job, result }).await;
                }
            };
            handles.push(tokio::spawn(task.instrument(info_span!("worker", worker))));
        }
        drop(result_tx);

        for job in jobs {
            if *cancel_rx.borrow() {
                report.cancelled += 1;
                continue;
            }
            if job_tx.send(job).await.is_err() {
                report.cancelled += 1;
            }
        }
        drop(job_tx);

        while let Some(outcome) = result_rx.recv().await {
            match outcome {
                JobOutcome::Finished {
                    job,
                    result: Ok(files),
                } => {
                    report.completed += 1;
                    report.files += files;
                    debug!(resource = %job.resource_name, files, "Transfer completed");
                }
                JobOutcome::Finished {
                    job,
                    result: Err(err),
                } => {
                    error!(
                        resource = %job.resource_name,
                        path = %job.local_path.display(),
                        "Transfer failed: {}", err
                    );
                    report.failures.push(TransferFailure { job, error: err });
                }
                JobOutcome::Cancelled => report.cancelled += 1,
            }
        }

        for result in join_all(handles).await {
            if let Err(err) = result {
                error!("Worker terminated abnormally: {}", err);
            }
        }

        report
    }
}
