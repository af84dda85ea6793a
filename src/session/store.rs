//! Session backing stores.
//!
//! Stores are keyed by the SHA-256 hash of the session token; the raw token
//! only ever lives in the client's cookie.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, PgPool, Row};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, error, Instrument};

/// Session payload as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub data: HashMap<String, Value>,
    /// End of the absolute lifetime; never extended.
    pub deadline: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the record for `token_hash` unless it is missing or expired.
    async fn find(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>>;

    /// Insert or replace the record, to be treated as absent after `expiry`.
    async fn commit(
        &self,
        token_hash: &[u8],
        record: &SessionRecord,
        expiry: DateTime<Utc>,
    ) -> Result<()>;

    async fn delete(&self, token_hash: &[u8]) -> Result<()>;

    /// Purge expired records and return how many were removed.
    async fn delete_expired(&self) -> Result<u64>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<Vec<u8>, (SessionRecord, DateTime<Utc>)>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let now = Utc::now();
        Ok(self
            .sessions
            .read()
            .await
            .get(token_hash)
            .filter(|(_, expiry)| *expiry > now)
            .map(|(record, _)| record.clone()))
    }

    async fn commit(
        &self,
        token_hash: &[u8],
        record: &SessionRecord,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(token_hash.to_vec(), (record.clone(), expiry));
        Ok(())
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<()> {
        self.sessions.write().await.remove(token_hash);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, (_, expiry)| *expiry > now);
        Ok(u64::try_from(before - sessions.len()).unwrap_or(u64::MAX))
    }
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn find(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let query = "SELECT data, deadline FROM sessions WHERE token_hash = $1 AND expiry > NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let Json(data): Json<HashMap<String, Value>> = row
            .try_get("data")
            .context("failed to decode session data")?;
        let deadline = row
            .try_get("deadline")
            .context("failed to decode session deadline")?;
        Ok(Some(SessionRecord { data, deadline }))
    }

    async fn commit(
        &self,
        token_hash: &[u8],
        record: &SessionRecord,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO sessions (token_hash, data, deadline, expiry)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token_hash)
            DO UPDATE SET data = EXCLUDED.data, deadline = EXCLUDED.deadline, expiry = EXCLUDED.expiry
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .bind(Json(&record.data))
            .bind(record.deadline)
            .bind(expiry)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to commit session")?;
        Ok(())
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<()> {
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE expiry <= NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete expired sessions")?;
        Ok(result.rows_affected())
    }
}

/// Periodically purge expired sessions for as long as the process runs.
pub fn spawn_cleanup(store: Arc<dyn SessionStore>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match store.delete_expired().await {
                Ok(removed) => debug!("removed {} expired sessions", removed),
                Err(err) => error!("Session cleanup failed: {err:#}"),
            }
        }
    });
}
