//! # Snippetbox
//!
//! `snippetbox` is a small web application for sharing short-lived text
//! snippets. Anyone can read unexpired snippets; creating one requires an
//! account.
//!
//! ## Request pipeline
//!
//! Every request passes through panic recovery, request-id tagging, tracing
//! and security headers. Page routes additionally load the server-side
//! session, verify the CSRF token on state-changing requests and compute the
//! authentication context that handlers and templates read. Protected pages
//! redirect anonymous visitors to the login form.
//!
//! ## Sessions
//!
//! Sessions are keyed by a random token carried in an `HttpOnly` cookie. The
//! backing store only ever sees a SHA-256 hash of that token. Sessions have an
//! absolute lifetime and a sliding idle timeout; the token is renewed on
//! login and logout to prevent fixation.
//!
//! ## Passwords
//!
//! Passwords are hashed with bcrypt using a configurable work factor. Login
//! failures never reveal whether the email or the password was wrong.

pub mod api;
pub mod cli;
pub mod models;
pub mod session;
pub mod templates;
pub mod validator;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
