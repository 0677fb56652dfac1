use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::rules::{RuleSet, ScrollParams};

/// Lifecycle state of a task. The numeric codes are what the datastore holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Succeeded => 1,
            TaskStatus::Failed => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }
}

impl TryFrom<i16> for TaskStatus {
    type Error = String;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TaskStatus::Pending),
            1 => Ok(TaskStatus::Succeeded),
            3 => Ok(TaskStatus::Failed),
            _ => Err(format!("Unknown task status code: {code}")),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accepts either the status name or its numeric code.
impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<i16>() {
            return TaskStatus::try_from(code);
        }
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(format!("Unknown task status: {s}")),
        }
    }
}

/// One URL to fetch and extract.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: Uuid,
    /// Task that spawned this one; `None` for roots.
    pub parent_id: Option<Uuid>,
    pub source_id: Uuid,
    pub url: String,
    /// SHA-256 of `url`, the deduplication key together with `url`.
    pub url_hash: String,
    pub status: TaskStatus,
    /// Output of the last successful extraction (`{}` until then).
    pub extract_result: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for inserting (or re-submitting) a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub parent_id: Option<Uuid>,
    pub source_id: Uuid,
    pub url: String,
    pub url_hash: String,
}

impl NewTask {
    pub fn new(parent_id: Option<Uuid>, source_id: Uuid, url: impl Into<String>) -> Self {
        let url = url.into();
        let url_hash = compute_hash(&url);
        Self {
            parent_id,
            source_id,
            url,
            url_hash,
        }
    }
}

/// Result of an upsert: the stored row and whether it was newly created.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub task: Task,
    pub inserted: bool,
}

/// Crawl configuration for one source, with rules already decoded.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: Uuid,
    /// Topic name for completion events.
    pub slug: String,
    pub use_proxy: bool,
    /// Applies to the proxy dial and the whole request.
    pub timeout_secs: u64,
    pub headers: BTreeMap<String, String>,
    pub extract_rules: RuleSet,
    pub scroll: Option<ScrollParams>,
    /// Raw `params`, kept for callers that need keys beyond pagination.
    pub params: serde_json::Value,
}

/// A source row as stored, before rule decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: Uuid,
    pub slug: String,
    pub use_proxy: bool,
    pub timeout: i32,
    pub headers: serde_json::Value,
    pub extract_rules: serde_json::Value,
    pub params: serde_json::Value,
}

impl From<SourceRecord> for Source {
    fn from(record: SourceRecord) -> Self {
        let mut headers = BTreeMap::new();
        if let Some(object) = record.headers.as_object() {
            for (name, value) in object {
                match value.as_str() {
                    Some(v) => {
                        headers.insert(name.clone(), v.to_string());
                    }
                    None => {
                        tracing::warn!(source_id = %record.id, header = %name, "Ignoring non-string header value");
                    }
                }
            }
        }

        Source {
            id: record.id,
            slug: record.slug,
            use_proxy: record.use_proxy,
            timeout_secs: record.timeout.max(0) as u64,
            headers,
            extract_rules: RuleSet::from_value(&record.extract_rules),
            scroll: ScrollParams::from_params(&record.params),
            params: record.params,
        }
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
