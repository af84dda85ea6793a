use thiserror::Error;

/// Errors surfaced by the user and snippet stores.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No row matched, or the snippet has expired.
    #[error("models: no matching record found")]
    NoRecord,

    /// Unknown email or wrong password; deliberately indistinguishable.
    #[error("models: invalid credentials")]
    InvalidCredentials,

    #[error("models: duplicate email")]
    DuplicateEmail,

    #[error("models: database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("models: password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("models: blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
