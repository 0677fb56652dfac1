use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewTask, Source, Task, TaskStatus, UpsertOutcome};

/// Local SOCKS5 endpoint used by sources with `use_proxy`.
pub const DEFAULT_PROXY_URL: &str = "socks5://127.0.0.1:1088";

/// Everything a fetcher needs for one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Proxy URL to dial through; `None` connects directly.
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn for_source(url: &str, source: &Source, proxy_url: &str) -> Self {
        Self {
            url: url.to_string(),
            headers: source.headers.clone(),
            proxy: source.use_proxy.then(|| proxy_url.to_string()),
            timeout: Duration::from_secs(source.timeout_secs),
        }
    }
}

/// Fetches a page body.
///
/// Implementations must not reuse connections between calls and must give
/// up once `request.timeout` has elapsed.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Persistence for task rows.
pub trait TaskStore: Send + Sync + Clone {
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<Task>, AppError>> + Send;

    /// Any one task owned by the source.
    fn get_by_source_id(
        &self,
        source_id: Uuid,
    ) -> impl Future<Output = Result<Option<Task>, AppError>> + Send;

    fn find_by_url(
        &self,
        url_hash: &str,
        url: &str,
    ) -> impl Future<Output = Result<Option<Task>, AppError>> + Send;

    /// Insert a pending task, or, if `(url_hash, url)` already exists,
    /// overwrite its `parent_id`/`source_id` and reset it to pending while
    /// leaving `extract_result` alone. Must be atomic per URL.
    fn upsert(&self, task: &NewTask) -> impl Future<Output = Result<UpsertOutcome, AppError>> + Send;

    fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Mark succeeded and replace `extract_result`.
    fn complete(
        &self,
        id: Uuid,
        extract_result: &serde_json::Value,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Identifiers of every task in `status`.
    fn scan(&self, status: TaskStatus) -> impl Future<Output = Result<Vec<Uuid>, AppError>> + Send;
}

/// Read access to source configuration.
pub trait SourceStore: Send + Sync + Clone {
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<Source>, AppError>> + Send;
}

/// Publish-subscribe bus for completion events.
pub trait EventPublisher: Send + Sync + Clone {
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Push out anything buffered by earlier `publish` calls.
    fn flush(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}
