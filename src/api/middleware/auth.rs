use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::CACHE_CONTROL, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::convert::Infallible;
use tracing::debug;

use crate::{
    api::{error::AppError, state::AppState},
    session::{Session, AUTHENTICATED_KEY, USER_ID_KEY},
};

pub const LOGIN_PATH: &str = "/user/login";

/// Authentication status computed once per request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub is_authenticated: bool,
    pub user_id: Option<i64>,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().copied().unwrap_or_default())
    }
}

/// Derive the [`RequestContext`] from the session.
///
/// A session only counts as authenticated while the user it names still exists.
pub async fn authenticate(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mut context = RequestContext::default();

    if session.get_bool(AUTHENTICATED_KEY).await {
        if let Some(user_id) = session.get::<i64>(USER_ID_KEY).await {
            if state.users.exists(user_id).await? {
                context = RequestContext {
                    is_authenticated: true,
                    user_id: Some(user_id),
                };
            } else {
                debug!("session refers to missing user {user_id}");
            }
        }
    }

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Send anonymous visitors to the login page; keep authenticated pages out of caches.
pub async fn require_authentication(
    context: RequestContext,
    request: Request,
    next: Next,
) -> Response {
    if !context.is_authenticated {
        return Redirect::to(LOGIN_PATH).into_response();
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
