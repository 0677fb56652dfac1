use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use spiders_core::error::AppError;
use spiders_core::job::{JobStatus, TaskJob, TaskJobRequest};
use spiders_core::job_queue::JobQueue;

/// PostgreSQL-backed job queue using `SELECT FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct TaskJobRepository {
    pool: Pool<Postgres>,
}

impl TaskJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<TaskJob>, AppError> {
        let row = sqlx::query_as::<_, TaskJobRow>(r#"SELECT * FROM task_jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct TaskJobRow {
    id: Uuid,
    task_id: Uuid,
    queue: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    max_retries: i32,
    timeout_secs: i32,
    next_retry_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    worker_id: Option<String>,
}

impl From<TaskJobRow> for TaskJob {
    fn from(row: TaskJobRow) -> Self {
        TaskJob {
            id: row.id,
            task_id: row.task_id,
            queue: row.queue,
            status: row.status.parse().unwrap_or(JobStatus::Pending),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            timeout_secs: row.timeout_secs.max(0) as u64,
            next_retry_at: row.next_retry_at,
            error_message: row.error_message,
            worker_id: row.worker_id,
        }
    }
}

impl JobQueue for TaskJobRepository {
    async fn enqueue(&self, request: TaskJobRequest) -> Result<TaskJob, AppError> {
        let row = sqlx::query_as::<_, TaskJobRow>(
            r#"
            INSERT INTO task_jobs (task_id, queue, max_retries, timeout_secs)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request.task_id)
        .bind(&request.queue)
        .bind(request.max_retries as i32)
        .bind(request.timeout.as_secs() as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::QueueError(e.to_string()))?;

        Ok(row.into())
    }

    async fn claim_job(&self, queue: &str, worker_id: &str) -> Result<Option<TaskJob>, AppError> {
        let row = sqlx::query_as::<_, TaskJobRow>(
            r#"
            UPDATE task_jobs
            SET status = 'running', worker_id = $2, started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM task_jobs
                WHERE status = 'pending'
                  AND queue = $1
                  AND (next_retry_at IS NULL OR next_retry_at <= NOW())
                ORDER BY next_retry_at NULLS FIRST, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(queue)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE task_jobs
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                error_message = NULL, worker_id = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        // If next_retry_at is set, reset to pending for retry.
        // Otherwise mark as permanently failed.
        sqlx::query(
            r#"
            UPDATE task_jobs
            SET
                status = CASE WHEN $3::timestamptz IS NOT NULL THEN 'pending' ELSE 'failed' END,
                retry_count = CASE WHEN $3::timestamptz IS NOT NULL THEN retry_count + 1 ELSE retry_count END,
                next_retry_at = $3,
                error_message = $2,
                updated_at = NOW(),
                worker_id = NULL,
                started_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE started_at END
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE task_jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL, updated_at = NOW()
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, queue: &str, status: JobStatus) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM task_jobs WHERE queue = $1 AND status = $2"#,
        )
        .bind(queue)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }
}
