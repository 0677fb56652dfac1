use chrono::{DateTime, Utc};
use spiders_core::error::AppError;
use spiders_core::models::{NewTask, Task, TaskStatus, UpsertOutcome};
use spiders_core::traits::TaskStore;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Task persistence in PostgreSQL, deduplicated on `(url_hash, url)`.
#[derive(Clone)]
pub struct TaskRepository {
    pool: Pool<Postgres>,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recently updated tasks, newest first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT * FROM tasks
            ORDER BY updated_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    parent_id: Option<Uuid>,
    source_id: Uuid,
    url: String,
    url_hash: String,
    status: i16,
    extract_result: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            parent_id: row.parent_id,
            source_id: row.source_id,
            url: row.url,
            url_hash: row.url_hash,
            status: TaskStatus::try_from(row.status).unwrap_or(TaskStatus::Pending),
            extract_result: row.extract_result,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    task: TaskRow,
    inserted: bool,
}

impl TaskStore for TaskRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(r#"SELECT * FROM tasks WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn get_by_source_id(&self, source_id: Uuid) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT * FROM tasks
            WHERE source_id = $1
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn find_by_url(&self, url_hash: &str, url: &str) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"SELECT * FROM tasks WHERE url_hash = $1 AND url = $2"#,
        )
        .bind(url_hash)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn upsert(&self, task: &NewTask) -> Result<UpsertOutcome, AppError> {
        // xmax is 0 only for a row version created by this INSERT.
        let row = sqlx::query_as::<_, UpsertRow>(
            r#"
            INSERT INTO tasks (parent_id, source_id, url, url_hash, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (url_hash, url) DO UPDATE
            SET parent_id = EXCLUDED.parent_id,
                source_id = EXCLUDED.source_id,
                status = EXCLUDED.status,
                updated_at = NOW()
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(task.parent_id)
        .bind(task.source_id)
        .bind(&task.url)
        .bind(&task.url_hash)
        .bind(TaskStatus::Pending.as_i16())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(UpsertOutcome {
            task: row.task.into(),
            inserted: row.inserted,
        })
    }

    async fn update_status(&self, id: Uuid, status: TaskStatus) -> Result<(), AppError> {
        sqlx::query(r#"UPDATE tasks SET status = $2, updated_at = NOW() WHERE id = $1"#)
            .bind(id)
            .bind(status.as_i16())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn complete(&self, id: Uuid, extract_result: &serde_json::Value) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2, extract_result = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(TaskStatus::Succeeded.as_i16())
        .bind(extract_result)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    async fn scan(&self, status: TaskStatus) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"SELECT id FROM tasks WHERE status = $1 ORDER BY created_at ASC"#,
        )
        .bind(status.as_i16())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
