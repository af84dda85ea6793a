use axum::{
    extract::{Request, State},
    http::{
        header::{CACHE_CONTROL, SET_COOKIE, VARY},
        HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::{error::AppError, state::AppState};

/// Load the session before the handler runs and persist it afterwards.
///
/// The handle is stored in the request extensions, where the
/// [`Session`](crate::session::Session) extractor finds it.
pub async fn load_and_save(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = state.sessions.token_from_headers(request.headers());
    let session = match state.sessions.load(token.as_deref()).await {
        Ok(session) => session,
        Err(err) => return AppError::Internal(err.context("failed to load session")).into_response(),
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    let cookie = match state.sessions.commit(&session).await {
        Ok(cookie) => cookie,
        Err(err) => {
            return AppError::Internal(err.context("failed to commit session")).into_response()
        }
    };

    let headers = response.headers_mut();
    headers.append(VARY, HeaderValue::from_static("Cookie"));
    if let Some(cookie) = cookie {
        headers.append(SET_COOKIE, cookie);
        // `no-store` already keeps the cookie out of shared caches.
        if !headers.contains_key(CACHE_CONTROL) {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static(r#"no-cache="Set-Cookie""#));
        }
    }

    response
}
