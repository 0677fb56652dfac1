pub mod continuation;
pub mod error;
pub mod extract;
pub mod job;
pub mod job_queue;
pub mod jsonpath;
pub mod models;
pub mod rules;
pub mod service;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub mod testutil;

pub use error::AppError;
pub use extract::{ExtractResult, extract};
pub use job::{JobStatus, TaskJob, TaskJobRequest, WorkerConfig};
pub use job_queue::JobQueue;
pub use models::{NewTask, Source, SourceRecord, Task, TaskStatus, UpsertOutcome, compute_hash};
pub use rules::{ExtractRule, FieldRule, HtmlRule, JsonRule, RuleSet, ScrollParams};
pub use service::{ProcessOutcome, ProcessorConfig, TaskService};
pub use traits::{EventPublisher, FetchRequest, Fetcher, SourceStore, TaskStore};
pub use worker::{TracingWorkerReporter, WorkerReporter, WorkerService};
