pub mod health;
pub mod snippets;
pub mod users;

use axum::{
    extract::rejection::FormRejection,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form,
};
use tracing::debug;

use crate::{
    api::{error::AppError, middleware::auth::RequestContext},
    session::{Session, FLASH_KEY},
    templates::{TemplateCache, TemplateData},
};

/// Template data shared by every page: flash, auth status and CSRF token.
pub(crate) async fn new_template_data(
    session: &Session,
    context: &RequestContext,
) -> Result<TemplateData, AppError> {
    let mut data = TemplateData::new();
    data.flash = session.pop_string(FLASH_KEY).await;
    data.is_authenticated = context.is_authenticated;
    data.csrf_token = session.csrf_token().await?;
    Ok(data)
}

/// Render into memory first so a template failure never yields a partial page.
pub(crate) fn render(
    templates: &TemplateCache,
    status: StatusCode,
    page: &str,
    data: &TemplateData,
) -> Result<Response, AppError> {
    let body = templates.render(page, data)?;
    Ok((status, Html(body)).into_response())
}

/// Undecodable form bodies are the client's fault.
pub(crate) fn decode_form<T>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    match form {
        Ok(Form(value)) => Ok(value),
        Err(rejection) => {
            debug!("rejected form: {rejection}");
            Err(AppError::BadRequest)
        }
    }
}

pub async fn ping() -> &'static str {
    "OK"
}
