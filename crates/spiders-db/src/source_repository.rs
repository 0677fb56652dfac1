use spiders_core::error::AppError;
use spiders_core::models::{Source, SourceRecord};
use spiders_core::traits::SourceStore;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// DTO for registering a source. Rules and params stay raw JSON and are
/// decoded on read.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub slug: String,
    pub use_proxy: bool,
    pub timeout_secs: i32,
    pub headers: serde_json::Value,
    pub extract_rules: serde_json::Value,
    pub params: serde_json::Value,
}

impl NewSource {
    pub fn new(slug: impl Into<String>, extract_rules: serde_json::Value) -> Self {
        Self {
            slug: slug.into(),
            use_proxy: false,
            timeout_secs: 30,
            headers: serde_json::json!({}),
            extract_rules,
            params: serde_json::json!({}),
        }
    }
}

/// Source configuration in PostgreSQL.
#[derive(Clone)]
pub struct SourceRepository {
    pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: Uuid,
    slug: String,
    use_proxy: bool,
    timeout: i32,
    headers: serde_json::Value,
    extract_rules: serde_json::Value,
    params: serde_json::Value,
}

impl From<SourceRow> for SourceRecord {
    fn from(row: SourceRow) -> Self {
        SourceRecord {
            id: row.id,
            slug: row.slug,
            use_proxy: row.use_proxy,
            timeout: row.timeout,
            headers: row.headers,
            extract_rules: row.extract_rules,
            params: row.params,
        }
    }
}

impl SourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a source, or replace the configuration of the one with the
    /// same slug.
    ///
    /// Rules are sent as text so the `json` column keeps their key order.
    pub async fn save(&self, source: &NewSource) -> Result<SourceRecord, AppError> {
        let row = sqlx::query_as::<_, SourceRow>(
            r#"
            INSERT INTO sources (slug, use_proxy, timeout, headers, extract_rules, params)
            VALUES ($1, $2, $3, $4, $5::json, $6)
            ON CONFLICT (slug) DO UPDATE
            SET use_proxy = EXCLUDED.use_proxy,
                timeout = EXCLUDED.timeout,
                headers = EXCLUDED.headers,
                extract_rules = EXCLUDED.extract_rules,
                params = EXCLUDED.params,
                updated_at = NOW()
            RETURNING id, slug, use_proxy, timeout, headers, extract_rules, params
            "#,
        )
        .bind(&source.slug)
        .bind(source.use_proxy)
        .bind(source.timeout_secs)
        .bind(&source.headers)
        .bind(source.extract_rules.to_string())
        .bind(&source.params)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.into())
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<SourceRecord>, AppError> {
        let row = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, slug, use_proxy, timeout, headers, extract_rules, params
            FROM sources
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    pub async fn list(&self) -> Result<Vec<SourceRecord>, AppError> {
        let rows = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, slug, use_proxy, timeout, headers, extract_rules, params
            FROM sources
            ORDER BY slug
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

impl SourceStore for SourceRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Source>, AppError> {
        let row = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, slug, use_proxy, timeout, headers, extract_rules, params
            FROM sources
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(|r| SourceRecord::from(r).into()))
    }
}
