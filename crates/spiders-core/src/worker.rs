use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{TaskJob, WorkerConfig};
use crate::job_queue::JobQueue;
use crate::service::{ProcessOutcome, TaskService};
use crate::traits::{EventPublisher, Fetcher, SourceStore, TaskStore};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job: &'a TaskJob,
    },
    JobStarted {
        job_id: Uuid,
        task_id: Uuid,
    },
    JobCompleted {
        job_id: Uuid,
        task_id: Uuid,
        next_url: Option<&'a str>,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        will_retry: bool,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(job_id = %job.id, task_id = %job.task_id, "Job claimed");
            }
            WorkerEvent::JobStarted { job_id, task_id } => {
                tracing::info!(%job_id, %task_id, "Processing task");
            }
            WorkerEvent::JobCompleted {
                job_id,
                task_id,
                next_url,
            } => {
                tracing::info!(%job_id, %task_id, ?next_url, "Job completed");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%job_id, %error, %will_retry, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Worker that polls the job queue and processes tasks.
pub struct WorkerService<T, S, Q, F, P>
where
    T: TaskStore,
    S: SourceStore,
    Q: JobQueue,
    F: Fetcher,
    P: EventPublisher,
{
    service: TaskService<T, S, Q, F, P>,
    config: WorkerConfig,
}

impl<T, S, Q, F, P> WorkerService<T, S, Q, F, P>
where
    T: TaskStore,
    S: SourceStore,
    Q: JobQueue,
    F: Fetcher,
    P: EventPublisher,
{
    pub fn new(service: TaskService<T, S, Q, F, P>, config: WorkerConfig) -> Self {
        Self { service, config }
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        let queue = self.service.queue();
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match queue
                .claim_job(&self.config.queue, &self.config.worker_id)
                .await
            {
                Ok(Some(job)) => {
                    reporter.report(WorkerEvent::JobClaimed { job: &job });
                    self.process_job(&job, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        // Graceful shutdown: hand claimed jobs back to the queue
        let released = queue
            .release_worker_jobs(&self.config.worker_id)
            .await
            .unwrap_or(0);

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    async fn process_job<WR: WorkerReporter>(&self, job: &TaskJob, reporter: &WR) {
        let queue = self.service.queue();
        reporter.report(WorkerEvent::JobStarted {
            job_id: job.id,
            task_id: job.task_id,
        });

        match self.run_task(job).await {
            Ok(outcome) => {
                reporter.report(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    task_id: job.task_id,
                    next_url: outcome.next_url.as_deref(),
                });
                if let Err(e) = queue.complete_job(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                }
            }
            Err(e) => {
                let error_msg = e.to_string();
                let can_retry = job.can_retry() && e.is_retryable();
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error_msg,
                    will_retry: can_retry,
                });

                let next_retry = if can_retry {
                    Some(job.calculate_next_retry(&self.config.retry_config))
                } else {
                    None
                };

                if let Err(e) = queue.fail_job(job.id, &error_msg, next_retry).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                }
            }
        }
    }

    async fn run_task(&self, job: &TaskJob) -> Result<ProcessOutcome, AppError> {
        let task = self.service.get(job.task_id).await?;
        tokio::time::timeout(job.timeout(), self.service.process(&task))
            .await
            .map_err(|_| AppError::Timeout(job.timeout_secs))?
    }
}
