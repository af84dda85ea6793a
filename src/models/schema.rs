//! Table bootstrap: creates whatever is missing, never alters existing tables.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{debug, Instrument};

const STATEMENTS: [&str; 5] = [
    r"
    CREATE TABLE IF NOT EXISTS snippets (
        id BIGSERIAL PRIMARY KEY,
        title VARCHAR(100) NOT NULL,
        content TEXT NOT NULL,
        created TIMESTAMPTZ NOT NULL,
        expires TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_snippets_created ON snippets (created)",
    r"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        email VARCHAR(255) NOT NULL,
        hashed_password CHAR(60) NOT NULL,
        created TIMESTAMPTZ NOT NULL,
        CONSTRAINT users_uc_email UNIQUE (email)
    )",
    r"
    CREATE TABLE IF NOT EXISTS sessions (
        token_hash BYTEA PRIMARY KEY,
        data JSONB NOT NULL,
        deadline TIMESTAMPTZ NOT NULL,
        expiry TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON sessions (expiry)",
];

/// Create the `snippets`, `users` and `sessions` tables when missing.
///
/// # Errors
/// Returns an error if any statement fails.
pub async fn bootstrap(pool: &PgPool) -> Result<()> {
    for (index, statement) in STATEMENTS.into_iter().enumerate() {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = statement
        );
        sqlx::query(statement)
            .execute(pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    debug!("schema bootstrap complete");

    Ok(())
}
