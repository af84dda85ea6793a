//! Persistence for users and snippets.
//!
//! Handlers talk to storage through the [`UserStore`] and [`SnippetStore`]
//! traits. The Postgres implementations back the running service; the
//! in-memory implementations in [`memory`] back tests and local experiments.

mod errors;
pub mod memory;
pub mod schema;
pub mod snippets;
pub mod users;

pub use errors::ModelError;
pub use snippets::{PgSnippets, Snippet, SnippetStore};
pub use users::{PgUsers, User, UserStore};

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code.as_ref() == UNIQUE_VIOLATION),
        _ => false,
    }
}
