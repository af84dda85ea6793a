use axum::{
    http::{header::CONNECTION, HeaderValue, StatusCode},
    response::Response,
};
use std::any::Any;
use tracing::error;

use crate::api::error::status_response;

/// Turn a handler panic into a 500 and close the connection.
///
/// Used with `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!("panic while handling request: {detail}");

    let mut response = status_response(StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}
