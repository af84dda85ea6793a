use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::Method,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::warn;
use url::form_urlencoded;

use crate::{
    api::error::AppError,
    session::{Session, CSRF_TOKEN_KEY},
};

/// Upper bound for a buffered form body.
pub const MAX_FORM_BYTES: usize = 1024 * 1024;

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Reject state-changing requests whose `csrf_token` field does not match
/// the token bound to the session.
///
/// The form body is read here and handed on unchanged.
pub async fn verify_csrf(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if is_safe(request.method()) {
        return Ok(next.run(request).await);
    }

    let Some(expected) = session.existing_csrf_token().await else {
        warn!("CSRF check failed: session has no token");
        return Err(AppError::BadRequest);
    };

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES).await.map_err(|err| {
        warn!("CSRF check failed: unreadable body: {err}");
        AppError::BadRequest
    })?;

    let submitted = form_urlencoded::parse(&bytes)
        .find(|(key, _)| key == CSRF_TOKEN_KEY)
        .map(|(_, value)| value.into_owned());

    let Some(submitted) = submitted else {
        warn!("CSRF check failed: token missing from form");
        return Err(AppError::BadRequest);
    };

    if !bool::from(submitted.as_bytes().ct_eq(expected.as_bytes())) {
        warn!("CSRF check failed: token mismatch");
        return Err(AppError::BadRequest);
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}
