//! Snippets: short texts that stop being served once they expire.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::Instrument;

use super::ModelError;

/// How many snippets the home page lists.
pub const LATEST_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl Snippet {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            created: row.try_get("created")?,
            expires: row.try_get("expires")?,
        })
    }
}

#[async_trait]
pub trait SnippetStore: Send + Sync {
    /// Store a snippet that expires `expires_days` from now and return its id.
    async fn insert(&self, title: &str, content: &str, expires_days: i32)
        -> Result<i64, ModelError>;

    /// Fetch an unexpired snippet; expired or missing ids are [`ModelError::NoRecord`].
    async fn get(&self, id: i64) -> Result<Snippet, ModelError>;

    /// Newest unexpired snippets, at most [`LATEST_LIMIT`].
    async fn latest(&self) -> Result<Vec<Snippet>, ModelError>;

    /// Check the backing store is reachable.
    async fn ping(&self) -> Result<(), ModelError>;
}

#[derive(Clone, Debug)]
pub struct PgSnippets {
    pool: PgPool,
}

impl PgSnippets {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnippetStore for PgSnippets {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_days: i32,
    ) -> Result<i64, ModelError> {
        let query = r"
            INSERT INTO snippets (title, content, created, expires)
            VALUES ($1, $2, NOW(), NOW() + make_interval(days => $3))
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let id: i64 = sqlx::query_scalar(query)
            .bind(title)
            .bind(content)
            .bind(expires_days)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        let query = r"
            SELECT id, title, content, created, expires FROM snippets
            WHERE expires > NOW() AND id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        let row = row.ok_or(ModelError::NoRecord)?;
        Ok(Snippet::from_row(&row)?)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, ModelError> {
        let query = r"
            SELECT id, title, content, created, expires FROM snippets
            WHERE expires > NOW() ORDER BY id DESC LIMIT $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(LATEST_LIMIT)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;

        Ok(rows
            .iter()
            .map(Snippet::from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn ping(&self) -> Result<(), ModelError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
