//! Completion events over PostgreSQL `LISTEN`/`NOTIFY`.
//!
//! The topic is the source slug and the payload is the task id, so a
//! consumer only needs a connection to the same database to follow a feed.

use spiders_core::error::AppError;
use spiders_core::traits::EventPublisher;
use sqlx::postgres::PgListener;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// `NOTIFY` payloads must stay under 8000 bytes.
const MAX_PAYLOAD_BYTES: usize = 7999;

/// Publishes with `pg_notify(topic, payload)`.
///
/// Each call runs in its own autocommit statement, so the notification is
/// delivered as soon as it returns and [`flush`](EventPublisher::flush) has
/// nothing to do.
#[derive(Clone)]
pub struct NotifyPublisher {
    pool: Pool<Postgres>,
}

impl NotifyPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EventPublisher for NotifyPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), AppError> {
        let payload = std::str::from_utf8(payload)
            .map_err(|e| AppError::PublishError(format!("payload is not UTF-8: {e}")))?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(AppError::PublishError(format!(
                "payload of {} bytes exceeds NOTIFY limit",
                payload.len()
            )));
        }

        sqlx::query(r#"SELECT pg_notify($1, $2)"#)
            .bind(topic)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn flush(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// A completion event as received by a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub topic: String,
    pub task_id: Uuid,
}

/// Subscribes to one or more source slugs.
pub struct TaskListener {
    listener: PgListener,
}

impl TaskListener {
    pub async fn connect(pool: &PgPool, topics: &[&str]) -> Result<Self, AppError> {
        let mut listener = PgListener::connect_with(pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open listener: {e}")))?;
        listener
            .listen_all(topics.iter().copied())
            .await
            .map_err(|e| AppError::DatabaseError(format!("LISTEN failed: {e}")))?;

        tracing::debug!(?topics, "Listening for task events");
        Ok(Self { listener })
    }

    /// Wait for the next event. Notifications whose payload is not a task
    /// id are skipped.
    pub async fn recv(&mut self) -> Result<TaskEvent, AppError> {
        loop {
            let notification = self
                .listener
                .recv()
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

            match notification.payload().parse::<Uuid>() {
                Ok(task_id) => {
                    return Ok(TaskEvent {
                        topic: notification.channel().to_string(),
                        task_id,
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        topic = notification.channel(),
                        payload = notification.payload(),
                        "Ignoring notification without a task id"
                    );
                }
            }
        }
    }
}
