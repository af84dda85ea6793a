#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, Method, Request, StatusCode,
    },
    Router,
};
use regex::Regex;
use snippetbox::{
    api::{router, AppState},
    models::memory::{MemorySnippets, MemoryUsers, FIXTURE_USER_EMAIL, FIXTURE_USER_PASSWORD},
    session::{MemoryStore, SessionConfig, SessionManager},
    templates::TemplateCache,
};
use std::{path::PathBuf, sync::Arc};
use tower::ServiceExt;
use url::form_urlencoded;

pub const COOKIE_NAME: &str = "snippetbox_session";
pub const TEST_BCRYPT_COST: u32 = 4;

pub struct TestApp {
    pub router: Router,
    pub users: Arc<MemoryUsers>,
    pub snippets: Arc<MemorySnippets>,
    pub sessions: Arc<MemoryStore>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let users = Arc::new(MemoryUsers::with_fixtures(TEST_BCRYPT_COST).await?);
        let snippets = Arc::new(MemorySnippets::with_fixtures());
        Self::with_stores(users, snippets).await
    }

    pub async fn with_stores(users: Arc<MemoryUsers>, snippets: Arc<MemorySnippets>) -> Result<Self> {
        let sessions = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(
            sessions.clone(),
            SessionConfig::new().with_cookie_secure(false),
        );
        let state = AppState::new(
            users.clone(),
            snippets.clone(),
            manager,
            Arc::new(TemplateCache::new()?),
        )
        .with_static_dir(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("ui/static"));

        Ok(Self {
            router: router(state),
            users,
            snippets,
            sessions,
        })
    }

    pub fn client(&self) -> Client {
        Client {
            router: self.router.clone(),
            cookie: None,
        }
    }
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(ToString::to_string)
            .collect()
    }

    /// The anti-forgery token embedded in the rendered form.
    pub fn csrf_token(&self) -> Result<String> {
        let rx = Regex::new(r#"name="csrf_token" value="([^"]+)""#)?;
        rx.captures(&self.body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .context("no csrf token in body")
    }
}

/// Minimal browser: keeps the session cookie between requests.
#[derive(Clone)]
pub struct Client {
    router: Router,
    pub cookie: Option<String>,
}

impl Client {
    pub async fn get(&mut self, uri: &str) -> Result<TestResponse> {
        let request = self
            .request(Method::GET, uri)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> Result<TestResponse> {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = self
            .request(Method::POST, uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))?;
        self.send(request).await
    }

    /// Fetch a form page, then post to it with the page's CSRF token added.
    pub async fn submit(
        &mut self,
        form_page: &str,
        action: &str,
        fields: &[(&str, &str)],
    ) -> Result<TestResponse> {
        let page = self.get(form_page).await?;
        let token = page.csrf_token()?;
        let mut fields = fields.to_vec();
        fields.push(("csrf_token", token.as_str()));
        self.post_form(action, &fields).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<TestResponse> {
        self.submit(
            "/user/login",
            "/user/login",
            &[("email", email), ("password", password)],
        )
        .await
    }

    pub async fn login_fixture_user(&mut self) -> Result<TestResponse> {
        let response = self.login(FIXTURE_USER_EMAIL, FIXTURE_USER_PASSWORD).await?;
        anyhow::ensure!(
            response.status == StatusCode::SEE_OTHER,
            "login failed with {}",
            response.status
        );
        Ok(response)
    }

    fn request(&self, method: Method, uri: &str) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match &self.cookie {
            Some(token) => builder.header(COOKIE, format!("{COOKIE_NAME}={token}")),
            None => builder,
        }
    }

    async fn send(&mut self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();

        for value in headers.get_all(SET_COOKIE) {
            let value = value.to_str()?;
            let Some(pair) = value.split(';').next() else {
                continue;
            };
            let Some((name, token)) = pair.split_once('=') else {
                continue;
            };
            if name != COOKIE_NAME {
                continue;
            }
            if value.contains("Max-Age=0") || token.is_empty() {
                self.cookie = None;
            } else {
                self.cookie = Some(token.to_string());
            }
        }

        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec())?,
        })
    }
}
