//! User accounts and credential checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{is_unique_violation, ModelError};

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub hashed_password: String,
    pub created: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user; fails with [`ModelError::DuplicateEmail`] when the email is taken.
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError>;

    /// Return the user id when `email` and `password` match a stored user.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError>;

    async fn email_taken(&self, email: &str) -> Result<bool, ModelError>;

    async fn exists(&self, id: i64) -> Result<bool, ModelError>;
}

/// Hash `password` with bcrypt on the blocking pool.
///
/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, ModelError> {
    let password = password.to_string();
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hashed)
}

/// Check `password` against a bcrypt hash on the blocking pool.
///
/// A mismatch is `Ok(false)`; only malformed hashes and task failures are errors.
///
/// # Errors
/// Returns an error if the stored hash cannot be parsed or the blocking task panics.
pub async fn verify_password(password: &str, hashed_password: &str) -> Result<bool, ModelError> {
    let password = password.to_string();
    let hashed_password = hashed_password.to_string();
    let matched =
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed_password)).await??;
    Ok(matched)
}

#[derive(Clone, Debug)]
pub struct PgUsers {
    pool: PgPool,
    cost: u32,
}

impl PgUsers {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cost: bcrypt::DEFAULT_COST,
        }
    }

    #[must_use]
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }
}

#[async_trait]
impl UserStore for PgUsers {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError> {
        let hashed_password = hash_password(password, self.cost).await?;

        let query = r"
            INSERT INTO users (name, email, hashed_password, created)
            VALUES ($1, $2, $3, NOW())
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(name)
            .bind(email)
            .bind(hashed_password)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(ModelError::DuplicateEmail),
            Err(err) => Err(err.into()),
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let query = "SELECT id, hashed_password FROM users WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        let Some(row) = row else {
            return Err(ModelError::InvalidCredentials);
        };
        let id: i64 = row.try_get("id")?;
        let hashed_password: String = row.try_get("hashed_password")?;

        if verify_password(password, &hashed_password).await? {
            Ok(id)
        } else {
            Err(ModelError::InvalidCredentials)
        }
    }

    async fn email_taken(&self, email: &str) -> Result<bool, ModelError> {
        let query = "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let taken: bool = sqlx::query_scalar(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(taken)
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        let query = "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let exists: bool = sqlx::query_scalar(query)
            .bind(id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(exists)
    }
}
