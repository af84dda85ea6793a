//! In-memory stores with fixture data, used by tests and local runs
//! that should not need Postgres.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use super::{
    snippets::LATEST_LIMIT,
    users::{hash_password, verify_password},
    ModelError, Snippet, SnippetStore, User, UserStore,
};

pub const FIXTURE_USER_ID: i64 = 1;
pub const FIXTURE_USER_NAME: &str = "Alice";
pub const FIXTURE_USER_EMAIL: &str = "alice@example.com";
pub const FIXTURE_USER_PASSWORD: &str = "pa$$word";

pub const FIXTURE_SNIPPET_ID: i64 = 1;
pub const FIXTURE_EXPIRED_SNIPPET_ID: i64 = 2;

#[derive(Debug)]
pub struct MemoryUsers {
    users: RwLock<Vec<User>>,
    cost: u32,
}

impl MemoryUsers {
    #[must_use]
    pub fn new(cost: u32) -> Self {
        Self {
            users: RwLock::new(Vec::new()),
            cost,
        }
    }

    /// A store holding the fixture user (id 1).
    ///
    /// # Errors
    /// Returns an error if the fixture password cannot be hashed.
    pub async fn with_fixtures(cost: u32) -> Result<Self, ModelError> {
        let store = Self::new(cost);
        store
            .insert(FIXTURE_USER_NAME, FIXTURE_USER_EMAIL, FIXTURE_USER_PASSWORD)
            .await?;
        Ok(store)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Drop a user, as if the account had been deleted elsewhere.
    pub async fn remove(&self, id: i64) {
        self.users.write().await.retain(|user| user.id != id);
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError> {
        let hashed_password = hash_password(password, self.cost).await?;

        let mut users = self.users.write().await;
        if users.iter().any(|user| user.email == email) {
            return Err(ModelError::DuplicateEmail);
        }
        let id = users.iter().map(|user| user.id).max().unwrap_or(0) + 1;
        users.push(User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            hashed_password,
            created: Utc::now(),
        });
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let found = self
            .users
            .read()
            .await
            .iter()
            .find(|user| user.email == email)
            .map(|user| (user.id, user.hashed_password.clone()));

        let Some((id, hashed_password)) = found else {
            return Err(ModelError::InvalidCredentials);
        };

        if verify_password(password, &hashed_password).await? {
            Ok(id)
        } else {
            Err(ModelError::InvalidCredentials)
        }
    }

    async fn email_taken(&self, email: &str) -> Result<bool, ModelError> {
        Ok(self.users.read().await.iter().any(|user| user.email == email))
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        Ok(self.users.read().await.iter().any(|user| user.id == id))
    }
}

#[derive(Debug, Default)]
pub struct MemorySnippets {
    snippets: RwLock<Vec<Snippet>>,
}

impl MemorySnippets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding one live snippet (id 1) and one expired snippet (id 2).
    #[must_use]
    pub fn with_fixtures() -> Self {
        let now = Utc::now();
        let snippets = vec![
            Snippet {
                id: FIXTURE_SNIPPET_ID,
                title: "An old silent pond".to_string(),
                content: "An old silent pond...\nA frog jumps into the pond,\nsplash! Silence again."
                    .to_string(),
                created: now,
                expires: now + Duration::days(365),
            },
            Snippet {
                id: FIXTURE_EXPIRED_SNIPPET_ID,
                title: "Over the wintry forest".to_string(),
                content: "Over the wintry\nforest, winds howl in rage\nwith no leaves to blow."
                    .to_string(),
                created: now - Duration::days(8),
                expires: now - Duration::days(1),
            },
        ];
        Self {
            snippets: RwLock::new(snippets),
        }
    }
}

#[async_trait]
impl SnippetStore for MemorySnippets {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_days: i32,
    ) -> Result<i64, ModelError> {
        let now = Utc::now();
        let mut snippets = self.snippets.write().await;
        let id = snippets.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        snippets.push(Snippet {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created: now,
            expires: now + Duration::days(i64::from(expires_days)),
        });
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        let now = Utc::now();
        self.snippets
            .read()
            .await
            .iter()
            .find(|s| s.id == id && s.expires > now)
            .cloned()
            .ok_or(ModelError::NoRecord)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, ModelError> {
        let now = Utc::now();
        let mut live: Vec<Snippet> = self
            .snippets
            .read()
            .await
            .iter()
            .filter(|s| s.expires > now)
            .cloned()
            .collect();
        live.sort_by(|a, b| b.id.cmp(&a.id));
        live.truncate(usize::try_from(LATEST_LIMIT).unwrap_or(usize::MAX));
        Ok(live)
    }

    async fn ping(&self) -> Result<(), ModelError> {
        Ok(())
    }
}
