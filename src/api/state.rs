use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    models::{SnippetStore, UserStore},
    session::SessionManager,
    templates::TemplateCache,
};

const DEFAULT_STATIC_DIR: &str = "./ui/static";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub snippets: Arc<dyn SnippetStore>,
    pub sessions: SessionManager,
    pub templates: Arc<TemplateCache>,
    pub static_dir: PathBuf,
    /// Requests still running after this are answered with 408.
    pub request_timeout: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        snippets: Arc<dyn SnippetStore>,
        sessions: SessionManager,
        templates: Arc<TemplateCache>,
    ) -> Self {
        Self {
            users,
            snippets,
            sessions,
            templates,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_static_dir(mut self, static_dir: PathBuf) -> Self {
        self.static_dir = static_dir;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions)
            .field("static_dir", &self.static_dir)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
