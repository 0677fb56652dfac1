//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{JobStatus, TaskJob, TaskJobRequest};
use crate::job_queue::JobQueue;
use crate::models::{NewTask, Source, Task, TaskStatus, UpsertOutcome};
use crate::rules::RuleSet;
use crate::traits::{EventPublisher, FetchRequest, Fetcher, SourceStore, TaskStore};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns configurable bodies and records requests.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    pub requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetcher {
    pub fn new(body: &str) -> Self {
        Self::with_responses(vec![Ok(body.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockTaskStore
// ---------------------------------------------------------------------------

/// In-memory task table.
#[derive(Clone)]
pub struct MockTaskStore {
    tasks: Arc<Mutex<Vec<Task>>>,
    complete_error: Arc<Mutex<Option<AppError>>>,
}

impl MockTaskStore {
    pub fn empty() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            complete_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Store whose next `complete` call fails.
    pub fn with_complete_error(error: AppError) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            complete_error: Arc::new(Mutex::new(Some(error))),
        }
    }

    pub fn insert(&self, task: Task) -> Task {
        self.tasks.lock().unwrap().push(task.clone());
        task
    }

    pub fn find(&self, id: Uuid) -> Option<Task> {
        self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    pub fn all(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }
}

impl TaskStore for MockTaskStore {
    async fn get(&self, id: Uuid) -> Result<Option<Task>, AppError> {
        Ok(self.find(id))
    }

    async fn get_by_source_id(&self, source_id: Uuid) -> Result<Option<Task>, AppError> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.iter().find(|t| t.source_id == source_id).cloned())
    }

    async fn find_by_url(&self, url_hash: &str, url: &str) -> Result<Option<Task>, AppError> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .iter()
            .find(|t| t.url_hash == url_hash && t.url == url)
            .cloned())
    }

    async fn upsert(&self, new_task: &NewTask) -> Result<UpsertOutcome, AppError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks
            .iter_mut()
            .find(|t| t.url_hash == new_task.url_hash && t.url == new_task.url)
        {
            task.parent_id = new_task.parent_id;
            task.source_id = new_task.source_id;
            task.status = TaskStatus::Pending;
            task.updated_at = Utc::now();
            return Ok(UpsertOutcome {
                task: task.clone(),
                inserted: false,
            });
        }

        let task = Task {
            id: Uuid::new_v4(),
            parent_id: new_task.parent_id,
            source_id: new_task.source_id,
            url: new_task.url.clone(),
            url_hash: new_task.url_hash.clone(),
            status: TaskStatus::Pending,
            extract_result: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        tasks.push(task.clone());
        Ok(UpsertOutcome {
            task,
            inserted: true,
        })
    }

    async fn update_status(&self, id: Uuid, status: TaskStatus) -> Result<(), AppError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid, extract_result: &serde_json::Value) -> Result<(), AppError> {
        if let Some(e) = self.complete_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.status = TaskStatus::Succeeded;
            task.extract_result = extract_result.clone();
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn scan(&self, status: TaskStatus) -> Result<Vec<Uuid>, AppError> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.id)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockSourceStore
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockSourceStore {
    sources: Arc<Mutex<HashMap<Uuid, Source>>>,
}

impl MockSourceStore {
    pub fn with_source(source: Source) -> Self {
        let store = Self::default();
        store.sources.lock().unwrap().insert(source.id, source);
        store
    }
}

impl SourceStore for MockSourceStore {
    async fn get(&self, id: Uuid) -> Result<Option<Source>, AppError> {
        Ok(self.sources.lock().unwrap().get(&id).cloned())
    }
}

// ---------------------------------------------------------------------------
// MockJobQueue
// ---------------------------------------------------------------------------

/// Recorded failure: (job_id, error_message, next_retry_at).
pub type FailedJobRecord = (Uuid, String, Option<chrono::DateTime<Utc>>);

/// Mock job queue backed by an in-memory Vec.
#[derive(Clone)]
pub struct MockJobQueue {
    jobs: Arc<Mutex<Vec<TaskJob>>>,
    enqueue_error: Arc<Mutex<Option<AppError>>>,
    claim_error: Arc<Mutex<Option<AppError>>>,
    pub enqueued: Arc<Mutex<Vec<TaskJobRequest>>>,
    pub failed_jobs: Arc<Mutex<Vec<FailedJobRecord>>>,
    pub completed_jobs: Arc<Mutex<Vec<Uuid>>>,
    pub released_workers: Arc<Mutex<Vec<String>>>,
}

impl MockJobQueue {
    pub fn empty() -> Self {
        Self::with_jobs(Vec::new())
    }

    /// Queue with pending jobs ready to be claimed.
    pub fn with_jobs(jobs: Vec<TaskJob>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(jobs)),
            enqueue_error: Arc::new(Mutex::new(None)),
            claim_error: Arc::new(Mutex::new(None)),
            enqueued: Arc::new(Mutex::new(Vec::new())),
            failed_jobs: Arc::new(Mutex::new(Vec::new())),
            completed_jobs: Arc::new(Mutex::new(Vec::new())),
            released_workers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_enqueue_error(error: AppError) -> Self {
        let queue = Self::empty();
        *queue.enqueue_error.lock().unwrap() = Some(error);
        queue
    }

    pub fn with_claim_error(error: AppError) -> Self {
        let queue = Self::empty();
        *queue.claim_error.lock().unwrap() = Some(error);
        queue
    }

    pub fn job(&self, job_id: Uuid) -> Option<TaskJob> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
    }
}

impl JobQueue for MockJobQueue {
    async fn enqueue(&self, request: TaskJobRequest) -> Result<TaskJob, AppError> {
        if let Some(e) = self.enqueue_error.lock().unwrap().take() {
            return Err(e);
        }
        self.enqueued.lock().unwrap().push(request.clone());
        let job = TaskJob {
            queue: request.queue,
            max_retries: request.max_retries,
            timeout_secs: request.timeout.as_secs(),
            ..make_test_job(request.task_id)
        };
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn claim_job(&self, queue: &str, worker_id: &str) -> Result<Option<TaskJob>, AppError> {
        if let Some(e) = self.claim_error.lock().unwrap().take() {
            return Err(e);
        }

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(pos) = jobs
            .iter()
            .position(|j| {
                j.status == JobStatus::Pending
                    && j.queue == queue
                    && j.next_retry_at.is_none_or(|at| at <= Utc::now())
            })
        {
            jobs[pos].status = JobStatus::Running;
            jobs[pos].worker_id = Some(worker_id.to_string());
            jobs[pos].started_at = Some(Utc::now());
            Ok(Some(jobs[pos].clone()))
        } else {
            Ok(None)
        }
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<(), AppError> {
        self.completed_jobs.lock().unwrap().push(job_id);

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.worker_id = None;
        }
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.failed_jobs
            .lock()
            .unwrap()
            .push((job_id, error.to_string(), next_retry_at));

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            if next_retry_at.is_some() {
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.next_retry_at = next_retry_at;
            } else {
                job.status = JobStatus::Failed;
            }
            job.error_message = Some(error.to_string());
            job.worker_id = None;
        }
        Ok(())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        self.released_workers
            .lock()
            .unwrap()
            .push(worker_id.to_string());

        let mut jobs = self.jobs.lock().unwrap();
        let mut count = 0u64;
        for job in jobs.iter_mut() {
            if job.worker_id.as_deref() == Some(worker_id) && job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_by_status(&self, queue: &str, status: JobStatus) -> Result<i64, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|j| j.queue == queue && j.status == status)
            .count() as i64)
    }
}

// ---------------------------------------------------------------------------
// MockPublisher
// ---------------------------------------------------------------------------

/// Recorded event: (topic, payload as UTF-8).
pub type PublishedEvent = (String, String);

#[derive(Clone)]
pub struct MockPublisher {
    pub events: Arc<Mutex<Vec<PublishedEvent>>>,
    pub flushes: Arc<Mutex<usize>>,
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            flushes: Arc::new(Mutex::new(0)),
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// Publisher whose next `publish` fails.
    pub fn with_error(error: AppError) -> Self {
        let publisher = Self::new();
        *publisher.error.lock().unwrap() = Some(error);
        publisher
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for MockPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), AppError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        self.events.lock().unwrap().push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        Ok(())
    }

    async fn flush(&self) -> Result<(), AppError> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records events.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl crate::worker::WorkerReporter for MockReporter {
    fn report(&self, event: crate::worker::WorkerEvent<'_>) {
        let label = match &event {
            crate::worker::WorkerEvent::Started { .. } => "Started",
            crate::worker::WorkerEvent::Polling => "Polling",
            crate::worker::WorkerEvent::JobClaimed { .. } => "JobClaimed",
            crate::worker::WorkerEvent::JobStarted { .. } => "JobStarted",
            crate::worker::WorkerEvent::JobCompleted { .. } => "JobCompleted",
            crate::worker::WorkerEvent::JobFailed { .. } => "JobFailed",
            crate::worker::WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            crate::worker::WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a direct-fetch source with the given rules and no pagination.
pub fn make_test_source(extract_rules: RuleSet) -> Source {
    Source {
        id: Uuid::new_v4(),
        slug: "test-source".to_string(),
        use_proxy: false,
        timeout_secs: 30,
        headers: BTreeMap::new(),
        extract_rules,
        scroll: None,
        params: serde_json::json!({}),
    }
}

/// Create a pending root task.
pub fn make_test_task(source_id: Uuid, url: &str) -> Task {
    let new_task = NewTask::new(None, source_id, url);
    Task {
        id: Uuid::new_v4(),
        parent_id: None,
        source_id,
        url: new_task.url,
        url_hash: new_task.url_hash,
        status: TaskStatus::Pending,
        extract_result: serde_json::json!({}),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Create a pending job for `task_id` on the tasks queue.
pub fn make_test_job(task_id: Uuid) -> TaskJob {
    let request = TaskJobRequest::process(task_id);
    TaskJob {
        id: Uuid::new_v4(),
        task_id,
        queue: request.queue,
        status: JobStatus::Pending,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        started_at: None,
        completed_at: None,
        retry_count: 0,
        max_retries: request.max_retries,
        timeout_secs: request.timeout.as_secs(),
        next_retry_at: None,
        error_message: None,
        worker_id: None,
    }
}
