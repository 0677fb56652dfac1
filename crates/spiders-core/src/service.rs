use serde_json::Value;
use uuid::Uuid;

use crate::continuation;
use crate::error::AppError;
use crate::extract::extract;
use crate::job::TaskJobRequest;
use crate::job_queue::JobQueue;
use crate::models::{NewTask, Source, Task, TaskStatus, UpsertOutcome};
use crate::rules::ScrollParams;
use crate::traits::{
    DEFAULT_PROXY_URL, EventPublisher, FetchRequest, Fetcher, SourceStore, TaskStore,
};

/// Knobs for [`TaskService::process`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// SOCKS5 endpoint for sources with `use_proxy`.
    pub proxy_url: String,
    /// Whether a non-2xx response marks the task failed. When off, the
    /// task keeps whatever status it had and only the error is returned.
    pub mark_failed_on_http_status: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            mark_failed_on_http_status: true,
        }
    }
}

impl ProcessorConfig {
    pub fn with_proxy_url(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = proxy_url.into();
        self
    }

    pub fn with_mark_failed_on_http_status(mut self, mark: bool) -> Self {
        self.mark_failed_on_http_status = mark;
        self
    }
}

/// What a successful [`TaskService::process`] produced.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub extract_result: Value,
    /// URL of the follow-up page task, if pagination scheduled one.
    pub next_url: Option<String>,
}

/// Task lifecycle: deduplicated submission and the
/// fetch → extract → paginate → persist → publish pipeline.
///
/// Holds no mutable state, so one instance can be cloned into any number of
/// concurrent workers.
#[derive(Clone)]
pub struct TaskService<T, S, Q, F, P>
where
    T: TaskStore,
    S: SourceStore,
    Q: JobQueue,
    F: Fetcher,
    P: EventPublisher,
{
    tasks: T,
    sources: S,
    queue: Q,
    fetcher: F,
    publisher: P,
    config: ProcessorConfig,
}

impl<T, S, Q, F, P> TaskService<T, S, Q, F, P>
where
    T: TaskStore,
    S: SourceStore,
    Q: JobQueue,
    F: Fetcher,
    P: EventPublisher,
{
    pub fn new(tasks: T, sources: S, queue: Q, fetcher: F, publisher: P) -> Self {
        Self {
            tasks,
            sources,
            queue,
            fetcher,
            publisher,
            config: ProcessorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub async fn get(&self, id: Uuid) -> Result<Task, AppError> {
        self.tasks
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))
    }

    /// Task lookup by id, kept alongside [`get`](Self::get) so callers of
    /// the task store's `find`/`get` pair both resolve.
    pub async fn find(&self, id: Uuid) -> Result<Task, AppError> {
        self.get(id).await
    }

    pub async fn get_by_source_id(&self, source_id: Uuid) -> Result<Task, AppError> {
        self.tasks
            .get_by_source_id(source_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task for source {source_id}")))
    }

    /// Identifiers of every task in `status`, for reconciliation jobs.
    pub async fn scan(&self, status: TaskStatus) -> Result<Vec<Uuid>, AppError> {
        self.tasks.scan(status).await
    }

    /// Submit `url` for crawling and queue it for processing.
    ///
    /// Re-submitting a known URL resets that task to pending instead of
    /// creating a second row. The job is enqueued with no automatic retries;
    /// an enqueue failure is logged, not returned.
    pub async fn save(
        &self,
        parent_id: Option<Uuid>,
        source_id: Uuid,
        url: &str,
    ) -> Result<Task, AppError> {
        let new_task = NewTask::new(parent_id, source_id, url);
        let UpsertOutcome { task, inserted } = self.tasks.upsert(&new_task).await?;

        if inserted {
            tracing::info!(task_id = %task.id, %url, "Task created");
        } else {
            tracing::info!(task_id = %task.id, %url, "Task re-submitted");
        }

        if let Err(e) = self.queue.enqueue(TaskJobRequest::process(task.id)).await {
            tracing::warn!(task_id = %task.id, error = %e, "Failed to enqueue task");
        }

        Ok(task)
    }

    /// Fetch, extract, and record one task.
    ///
    /// 1. Resolve the task's source
    /// 2. Fetch the page with the source's headers, proxy, and timeout
    /// 3. Run the extraction rules
    /// 4. Schedule the next page if the source paginates
    /// 5. Persist status and result
    /// 6. Publish the task id on the source's slug
    pub async fn process(&self, task: &Task) -> Result<ProcessOutcome, AppError> {
        // 1. Source
        let source = self
            .sources
            .get(task.source_id)
            .await?
            .ok_or(AppError::SourceNotFound(task.source_id))?;

        // 2. Fetch
        let request = FetchRequest::for_source(&task.url, &source, &self.config.proxy_url);
        tracing::info!(task_id = %task.id, url = %task.url, proxy = source.use_proxy, "Fetching");
        let body = match self.fetcher.fetch(&request).await {
            Ok(body) => body,
            Err(e) => {
                if self.marks_failed(&e) {
                    self.tasks.update_status(task.id, TaskStatus::Failed).await?;
                }
                tracing::warn!(task_id = %task.id, error = %e, "Fetch failed");
                return Err(e);
            }
        };
        tracing::info!(task_id = %task.id, "Fetched {} bytes", body.len());

        // 3. Extract
        let fields = extract(&source.extract_rules, &body)?;
        tracing::info!(
            task_id = %task.id,
            fields = fields.len(),
            rules = source.extract_rules.len(),
            "Extraction complete"
        );
        let extract_result = Value::Object(fields);

        // 4. Paginate
        let next_url = match &source.scroll {
            Some(scroll) => {
                self.schedule_next_page(task, &source, scroll, &extract_result)
                    .await?
            }
            None => None,
        };

        // 5. Persist
        self.tasks.complete(task.id, &extract_result).await?;

        // 6. Publish, only once the row is updated
        self.announce(&source.slug, task.id).await;

        Ok(ProcessOutcome {
            extract_result,
            next_url,
        })
    }

    fn marks_failed(&self, err: &AppError) -> bool {
        err.is_transport()
            || (self.config.mark_failed_on_http_status
                && matches!(err, AppError::HttpStatus { .. }))
    }

    async fn schedule_next_page(
        &self,
        task: &Task,
        source: &Source,
        scroll: &ScrollParams,
        extract_result: &Value,
    ) -> Result<Option<String>, AppError> {
        let next = match continuation::next_page_url(&task.url, extract_result, scroll) {
            Ok(Some(url)) => url,
            Ok(None) => {
                tracing::debug!(task_id = %task.id, "No cursor, pagination stops");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "Cannot build next page URL");
                return Ok(None);
            }
        };

        if continuation::same_page(&next, &task.url) {
            tracing::warn!(task_id = %task.id, url = %next, "Cursor did not advance, pagination stops");
            return Ok(None);
        }

        let next_task = self.save(Some(task.id), source.id, next.as_str()).await?;
        tracing::info!(task_id = %task.id, next_task_id = %next_task.id, url = %next, "Next page scheduled");
        Ok(Some(next.into()))
    }

    /// Failures here are logged only: the task is already recorded and
    /// consumers can reconcile from task status.
    async fn announce(&self, topic: &str, task_id: Uuid) {
        let payload = task_id.to_string();
        if let Err(e) = self.publisher.publish(topic, payload.as_bytes()).await {
            tracing::warn!(%task_id, %topic, error = %e, "Failed to publish completion");
            return;
        }
        if let Err(e) = self.publisher.flush().await {
            tracing::warn!(%task_id, %topic, error = %e, "Failed to flush completion");
        }
    }
}
