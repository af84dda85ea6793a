//! Server-side sessions carried by an opaque cookie token.
//!
//! [`SessionManager`] loads a [`Session`] at the start of a request and
//! commits it at the end. Handlers mutate the session through the cheap,
//! clonable [`Session`] handle found in the request extensions.

pub mod store;

use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{InvalidHeaderValue, COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::error;

pub use store::{MemoryStore, PgStore, SessionRecord, SessionStore};

const DEFAULT_LIFETIME_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_IDLE_TIMEOUT_SECONDS: i64 = 20 * 60;
const DEFAULT_COOKIE_NAME: &str = "snippetbox_session";

/// Upper bound for the session lifetime and idle timeout: one year.
pub const MAX_SESSION_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Session key holding the anti-forgery token.
pub const CSRF_TOKEN_KEY: &str = "csrf_token";
pub const AUTHENTICATED_KEY: &str = "authenticated";
pub const USER_ID_KEY: &str = "user_id";
/// One-shot message shown on the next rendered page.
pub const FLASH_KEY: &str = "flash";

/// Create a new random token for cookies and form fields.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate random token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a session token so raw values never reach the store.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    lifetime_seconds: i64,
    idle_timeout_seconds: i64,
    cookie_name: String,
    cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_seconds: DEFAULT_LIFETIME_SECONDS,
            idle_timeout_seconds: DEFAULT_IDLE_TIMEOUT_SECONDS,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_secure: true,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_lifetime_seconds(mut self, seconds: i64) -> Self {
        self.lifetime_seconds = seconds;
        self
    }

    /// Sliding inactivity window; `0` disables it.
    #[must_use]
    pub fn with_idle_timeout_seconds(mut self, seconds: i64) -> Self {
        self.idle_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: String) -> Self {
        self.cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn lifetime_seconds(&self) -> i64 {
        self.lifetime_seconds
    }

    #[must_use]
    pub fn idle_timeout_seconds(&self) -> i64 {
        self.idle_timeout_seconds
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Unmodified,
    Modified,
    Destroyed,
}

#[derive(Debug)]
struct SessionState {
    token: Option<String>,
    data: HashMap<String, Value>,
    deadline: DateTime<Utc>,
    status: Status,
    /// Tokens replaced during this request; deleted from the store on commit.
    stale_tokens: Vec<String>,
}

/// Request-scoped handle to the session data.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    fn new(token: Option<String>, record: SessionRecord, status: Status) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                token,
                data: record.data,
                deadline: record.deadline,
                status,
                stale_tokens: Vec::new(),
            })),
        }
    }

    pub async fn status(&self) -> Status {
        self.inner.lock().await.status
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.inner.lock().await.data.contains_key(key)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.inner.lock().await;
        state
            .data
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).await
    }

    pub async fn get_bool(&self, key: &str) -> bool {
        self.get(key).await.unwrap_or(false)
    }

    pub async fn put(&self, key: &str, value: impl Into<Value> + Send) {
        let mut state = self.inner.lock().await;
        state.data.insert(key.to_string(), value.into());
        state.status = Status::Modified;
    }

    pub async fn put_string(&self, key: &str, value: &str) {
        self.put(key, value.to_string()).await;
    }

    /// Read and remove a string; missing keys yield an empty string.
    pub async fn pop_string(&self, key: &str) -> String {
        let mut state = self.inner.lock().await;
        match state.data.remove(key) {
            Some(value) => {
                state.status = Status::Modified;
                match value {
                    Value::String(s) => s,
                    _ => String::new(),
                }
            }
            None => String::new(),
        }
    }

    pub async fn remove(&self, key: &str) {
        let mut state = self.inner.lock().await;
        if state.data.remove(key).is_some() {
            state.status = Status::Modified;
        }
    }

    /// Issue a fresh token for the same data, discarding the anti-forgery token.
    pub async fn renew_token(&self) {
        let mut state = self.inner.lock().await;
        if let Some(old) = state.token.take() {
            state.stale_tokens.push(old);
        }
        state.data.remove(CSRF_TOKEN_KEY);
        state.status = Status::Modified;
    }

    pub async fn destroy(&self) {
        let mut state = self.inner.lock().await;
        if let Some(old) = state.token.take() {
            state.stale_tokens.push(old);
        }
        state.data.clear();
        state.status = Status::Destroyed;
    }

    /// Anti-forgery token bound to this session, minted on first use.
    ///
    /// # Errors
    /// Returns an error if a new token cannot be generated.
    pub async fn csrf_token(&self) -> Result<String> {
        let mut state = self.inner.lock().await;
        if let Some(Value::String(token)) = state.data.get(CSRF_TOKEN_KEY) {
            return Ok(token.clone());
        }
        let token = generate_token()?;
        state
            .data
            .insert(CSRF_TOKEN_KEY.to_string(), Value::String(token.clone()));
        state.status = Status::Modified;
        Ok(token)
    }

    /// Anti-forgery token if one was ever issued; never mints.
    pub async fn existing_csrf_token(&self) -> Option<String> {
        self.get_string(CSRF_TOKEN_KEY).await
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            error!("Session extractor used on a route without the session layer");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        })
    }
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Session token from the request cookie, if any.
    #[must_use]
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        extract_cookie(headers, self.config.cookie_name())
    }

    /// Load the session for `token`, or start an empty one.
    ///
    /// # Errors
    /// Returns an error if the store lookup fails.
    pub async fn load(&self, token: Option<&str>) -> Result<Session> {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            if let Some(record) = self.store.find(&hash_session_token(token)).await? {
                // With an idle timeout every touch slides the expiry, so re-commit.
                let status = if self.config.idle_timeout_seconds > 0 {
                    Status::Modified
                } else {
                    Status::Unmodified
                };
                return Ok(Session::new(Some(token.to_string()), record, status));
            }
        }

        let record = SessionRecord {
            data: HashMap::new(),
            deadline: after_seconds(Utc::now(), self.config.lifetime_seconds)
                .context("invalid session lifetime")?,
        };
        Ok(Session::new(None, record, Status::Unmodified))
    }

    /// Persist the session and return the `Set-Cookie` value, if one is needed.
    ///
    /// # Errors
    /// Returns an error if the store fails or a token cannot be generated.
    pub async fn commit(&self, session: &Session) -> Result<Option<HeaderValue>> {
        let mut state = session.inner.lock().await;

        for stale in state.stale_tokens.drain(..) {
            self.store.delete(&hash_session_token(&stale)).await?;
        }

        match state.status {
            Status::Unmodified => Ok(None),
            Status::Destroyed => {
                state.status = Status::Unmodified;
                Ok(Some(self.expired_cookie()?))
            }
            Status::Modified => {
                let token = match &state.token {
                    Some(token) => token.clone(),
                    None => {
                        let token = generate_token()?;
                        state.token = Some(token.clone());
                        token
                    }
                };

                let now = Utc::now();
                let expiry = if self.config.idle_timeout_seconds > 0 {
                    let idle = after_seconds(now, self.config.idle_timeout_seconds)
                        .context("invalid session idle timeout")?;
                    std::cmp::min(idle, state.deadline)
                } else {
                    state.deadline
                };
                let record = SessionRecord {
                    data: state.data.clone(),
                    deadline: state.deadline,
                };
                self.store
                    .commit(&hash_session_token(&token), &record, expiry)
                    .await?;
                state.status = Status::Unmodified;

                let max_age = (state.deadline - now).num_seconds().max(0);
                Ok(Some(self.session_cookie(&token, max_age)?))
            }
        }
    }

    /// Build a secure `HttpOnly` cookie for the session token.
    fn session_cookie(&self, token: &str, max_age: i64) -> Result<HeaderValue, InvalidHeaderValue> {
        let name = self.config.cookie_name();
        let mut cookie = format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
        if self.config.cookie_secure() {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    fn expired_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        self.session_cookie("", 0)
    }
}

fn after_seconds(start: DateTime<Utc>, seconds: i64) -> Result<DateTime<Utc>> {
    Duration::try_seconds(seconds)
        .and_then(|delta| start.checked_add_signed(delta))
        .with_context(|| format!("{seconds} seconds from now is out of range"))
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == name {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(store: Arc<MemoryStore>) -> SessionManager {
        SessionManager::new(store, SessionConfig::new().with_cookie_secure(false))
    }

    fn cookie_token(cookie: &HeaderValue) -> Option<String> {
        let value = cookie.to_str().ok()?;
        let first = value.split(';').next()?;
        first.split_once('=').map(|(_, token)| token.to_string())
    }

    #[test]
    fn generate_token_is_32_random_bytes() -> Result<()> {
        let first = generate_token()?;
        let second = generate_token()?;
        assert_ne!(first, second);
        let decoded = Base64UrlUnpadded::decode_vec(&first).map_err(anyhow::Error::msg)?;
        assert_eq!(decoded.len(), 32);
        Ok(())
    }

    #[test]
    fn hash_session_token_stable() {
        assert_eq!(hash_session_token("a"), hash_session_token("a"));
        assert_ne!(hash_session_token("a"), hash_session_token("b"));
        assert_eq!(hash_session_token("a").len(), 32);
    }

    #[test]
    fn extract_cookie_finds_named_pair() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; snippetbox_session=abc123; other=1"),
        );
        assert_eq!(
            extract_cookie(&headers, "snippetbox_session"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }

    #[tokio::test]
    async fn untouched_new_session_is_not_persisted() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone());
        let session = manager.load(None).await?;
        assert_eq!(manager.commit(&session).await?, None);
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn flash_round_trip_is_delivered_once() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone());

        let session = manager.load(None).await?;
        session.put_string("flash", "X").await;
        let cookie = manager.commit(&session).await?;
        let token = cookie.as_ref().and_then(cookie_token);
        assert!(token.is_some());

        let session = manager.load(token.as_deref()).await?;
        assert_eq!(session.pop_string("flash").await, "X");
        assert_eq!(session.pop_string("flash").await, "");
        manager.commit(&session).await?;

        let session = manager.load(token.as_deref()).await?;
        assert_eq!(session.pop_string("flash").await, "");
        Ok(())
    }

    #[tokio::test]
    async fn cookie_attributes() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store, SessionConfig::new().with_cookie_secure(true));
        let session = manager.load(None).await?;
        session.put("authenticated", true).await;
        let cookie = manager
            .commit(&session)
            .await?
            .context("cookie expected")?;
        let value = cookie.to_str()?;
        assert!(value.starts_with("snippetbox_session="));
        assert!(value.contains("; Path=/"));
        assert!(value.contains("; HttpOnly"));
        assert!(value.contains("; SameSite=Lax"));
        assert!(value.ends_with("; Secure"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_starts_fresh_session() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store);
        let session = manager.load(Some("forged-token")).await?;
        assert!(!session.exists("authenticated").await);
        session.put("authenticated", true).await;
        let cookie = manager.commit(&session).await?;
        let token = cookie.as_ref().and_then(cookie_token);
        assert_ne!(token.as_deref(), Some("forged-token"));
        Ok(())
    }

    #[tokio::test]
    async fn renew_token_moves_data_and_drops_old_token() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone());

        let session = manager.load(None).await?;
        session.put_string("flash", "kept").await;
        let csrf = session.csrf_token().await?;
        let old = manager.commit(&session).await?.as_ref().and_then(cookie_token);

        let session = manager.load(old.as_deref()).await?;
        session.renew_token().await;
        let new = manager.commit(&session).await?.as_ref().and_then(cookie_token);

        assert!(new.is_some());
        assert_ne!(old, new);
        assert_eq!(store.len().await, 1);

        let old_session = manager.load(old.as_deref()).await?;
        assert!(!old_session.exists("flash").await);

        let session = manager.load(new.as_deref()).await?;
        assert_eq!(session.get_string("flash").await.as_deref(), Some("kept"));
        assert_ne!(session.csrf_token().await?, csrf);
        Ok(())
    }

    #[tokio::test]
    async fn destroy_removes_record_and_expires_cookie() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone());

        let session = manager.load(None).await?;
        session.put("authenticated", true).await;
        let token = manager.commit(&session).await?.as_ref().and_then(cookie_token);

        let session = manager.load(token.as_deref()).await?;
        session.destroy().await;
        let cookie = manager
            .commit(&session)
            .await?
            .context("expired cookie expected")?;
        assert!(cookie.to_str()?.contains("Max-Age=0"));
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn idle_timeout_expires_session() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone());
        let session = manager.load(None).await?;
        session.put("authenticated", true).await;
        let token = manager.commit(&session).await?.as_ref().and_then(cookie_token);

        // Simulate the idle window elapsing by re-committing with a past expiry.
        let hash = hash_session_token(token.as_deref().unwrap_or_default());
        let record = store.find(&hash).await?.context("record expected")?;
        store
            .commit(&hash, &record, Utc::now() - Duration::seconds(1))
            .await?;

        let session = manager.load(token.as_deref()).await?;
        assert!(!session.get_bool("authenticated").await);
        Ok(())
    }

    #[tokio::test]
    async fn loaded_session_slides_with_idle_timeout() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store);
        let session = manager.load(None).await?;
        session.put("authenticated", true).await;
        let token = manager.commit(&session).await?.as_ref().and_then(cookie_token);

        let session = manager.load(token.as_deref()).await?;
        assert_eq!(session.status().await, Status::Modified);

        let no_idle = SessionManager::new(
            Arc::new(MemoryStore::new()),
            SessionConfig::new().with_idle_timeout_seconds(0),
        );
        let session = no_idle.load(None).await?;
        session.put("authenticated", true).await;
        let token = no_idle.commit(&session).await?.as_ref().and_then(cookie_token);
        let session = no_idle.load(token.as_deref()).await?;
        assert_eq!(session.status().await, Status::Unmodified);
        Ok(())
    }

    #[tokio::test]
    async fn csrf_token_is_stable_within_a_session() -> Result<()> {
        let manager = manager(Arc::new(MemoryStore::new()));
        let session = manager.load(None).await?;
        assert_eq!(session.existing_csrf_token().await, None);
        let first = session.csrf_token().await?;
        let second = session.csrf_token().await?;
        assert_eq!(first, second);
        assert_eq!(session.existing_csrf_token().await, Some(first));
        Ok(())
    }

    #[tokio::test]
    async fn unrepresentable_durations_are_errors() -> Result<()> {
        let store = Arc::new(MemoryStore::new());

        let huge_lifetime = SessionManager::new(
            store.clone(),
            SessionConfig::new().with_lifetime_seconds(i64::MAX),
        );
        assert!(huge_lifetime.load(None).await.is_err());

        let huge_idle = SessionManager::new(
            store.clone(),
            SessionConfig::new().with_idle_timeout_seconds(i64::MAX / 2),
        );
        let session = huge_idle.load(None).await?;
        session.put_string(FLASH_KEY, "hello").await;
        assert!(huge_idle.commit(&session).await.is_err());
        assert!(store.is_empty().await);

        let longest = SessionManager::new(
            store,
            SessionConfig::new()
                .with_lifetime_seconds(MAX_SESSION_SECONDS)
                .with_idle_timeout_seconds(MAX_SESSION_SECONDS),
        );
        let session = longest.load(None).await?;
        session.put_string(FLASH_KEY, "hello").await;
        assert!(longest.commit(&session).await?.is_some());
        Ok(())
    }
}
