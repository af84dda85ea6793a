use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{decode_form, new_template_data, render};
use crate::{
    api::{error::AppError, middleware::auth::RequestContext, state::AppState},
    session::{Session, FLASH_KEY},
    validator::{max_chars, not_blank, permitted_value, Validator},
};

const TITLE_MAX_CHARS: usize = 100;
const PERMITTED_EXPIRES: [i32; 3] = [1, 7, 365];
const DEFAULT_EXPIRES: i32 = 365;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SnippetCreateForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub expires: i32,
}

impl SnippetCreateForm {
    fn validate(&self) -> Validator {
        let mut v = Validator::default();
        v.check_field(not_blank(&self.title), "title", "This field cannot be blank");
        v.check_field(
            max_chars(&self.title, TITLE_MAX_CHARS),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", "This field cannot be blank");
        v.check_field(
            permitted_value(&self.expires, &PERMITTED_EXPIRES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v
    }
}

/// Positive integer ids only; anything else is indistinguishable from a missing snippet.
fn parse_id(raw: &str) -> Result<i64, AppError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::NotFound),
    }
}

pub async fn home(
    State(state): State<AppState>,
    session: Session,
    context: RequestContext,
) -> Result<Response, AppError> {
    let snippets = state.snippets.latest().await?;
    let data = new_template_data(&session, &context)
        .await?
        .with_snippets(snippets);
    render(&state.templates, StatusCode::OK, "home.html", &data)
}

pub async fn view(
    State(state): State<AppState>,
    session: Session,
    context: RequestContext,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let snippet = state.snippets.get(id).await?;
    let data = new_template_data(&session, &context)
        .await?
        .with_snippet(snippet);
    render(&state.templates, StatusCode::OK, "view.html", &data)
}

pub async fn create_form(
    State(state): State<AppState>,
    session: Session,
    context: RequestContext,
) -> Result<Response, AppError> {
    let form = SnippetCreateForm {
        expires: DEFAULT_EXPIRES,
        ..SnippetCreateForm::default()
    };
    let data = new_template_data(&session, &context)
        .await?
        .with_form(&form, &Validator::default())?;
    render(&state.templates, StatusCode::OK, "create.html", &data)
}

pub async fn create(
    State(state): State<AppState>,
    session: Session,
    context: RequestContext,
    form: Result<Form<SnippetCreateForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = decode_form(form)?;

    let validator = form.validate();
    if !validator.valid() {
        let data = new_template_data(&session, &context)
            .await?
            .with_form(&form, &validator)?;
        return render(
            &state.templates,
            StatusCode::UNPROCESSABLE_ENTITY,
            "create.html",
            &data,
        );
    }

    let id = state
        .snippets
        .insert(&form.title, &form.content, form.expires)
        .await?;
    debug!("created snippet {id}");

    session
        .put_string(FLASH_KEY, "Snippet successfully created!")
        .await;

    Ok(Redirect::to(&format!("/snippet/view/{id}/")).into_response())
}
