use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{decode_form, new_template_data, render};
use crate::{
    api::{error::AppError, middleware::auth::RequestContext, state::AppState},
    models::ModelError,
    session::{Session, AUTHENTICATED_KEY, FLASH_KEY, USER_ID_KEY},
    validator::{matches, min_chars, not_blank, Validator, EMAIL_RX},
};

const PASSWORD_MIN_CHARS: usize = 8;

const BLANK: &str = "This field cannot be blank";
const INVALID_EMAIL: &str = "This field must be a valid email address";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UserSignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl UserSignupForm {
    fn validate(&self) -> Validator {
        let mut v = Validator::default();
        v.check_field(not_blank(&self.name), "name", BLANK);
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(matches(&self.email, EMAIL_RX), "email", INVALID_EMAIL);
        v.check_field(not_blank(&self.password), "password", BLANK);
        v.check_field(
            min_chars(&self.password, PASSWORD_MIN_CHARS),
            "password",
            "This field must be at least 8 characters long",
        );
        v
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UserLoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl UserLoginForm {
    fn validate(&self) -> Validator {
        let mut v = Validator::default();
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(matches(&self.email, EMAIL_RX), "email", INVALID_EMAIL);
        v.check_field(not_blank(&self.password), "password", BLANK);
        v
    }
}

pub async fn signup_form(
    State(state): State<AppState>,
    session: Session,
    context: RequestContext,
) -> Result<Response, AppError> {
    let data = new_template_data(&session, &context)
        .await?
        .with_form(&UserSignupForm::default(), &Validator::default())?;
    render(&state.templates, StatusCode::OK, "signup.html", &data)
}

pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    context: RequestContext,
    form: Result<Form<UserSignupForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = decode_form(form)?;

    let mut validator = form.validate();
    if validator.valid() && state.users.email_taken(&form.email).await? {
        validator.add_field_error("email", "Email address is already in use");
    }

    if validator.valid() {
        match state
            .users
            .insert(&form.name, &form.email, &form.password)
            .await
        {
            Ok(()) => {
                info!("new user signed up");
                session
                    .put_string(FLASH_KEY, "Your signup was successful. Please log in.")
                    .await;
                return Ok(Redirect::to("/user/login").into_response());
            }
            // Lost a race with a concurrent signup for the same address.
            Err(ModelError::DuplicateEmail) => {
                validator.add_field_error("email", "Email address is already in use");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let data = new_template_data(&session, &context)
        .await?
        .with_form(&form, &validator)?;
    render(
        &state.templates,
        StatusCode::UNPROCESSABLE_ENTITY,
        "signup.html",
        &data,
    )
}

pub async fn login_form(
    State(state): State<AppState>,
    session: Session,
    context: RequestContext,
) -> Result<Response, AppError> {
    let data = new_template_data(&session, &context)
        .await?
        .with_form(&UserLoginForm::default(), &Validator::default())?;
    render(&state.templates, StatusCode::OK, "login.html", &data)
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    context: RequestContext,
    form: Result<Form<UserLoginForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = decode_form(form)?;

    let mut validator = form.validate();
    if validator.valid() {
        match state.users.authenticate(&form.email, &form.password).await {
            Ok(user_id) => {
                // New token on privilege change to prevent session fixation.
                session.renew_token().await;
                session.put(AUTHENTICATED_KEY, true).await;
                session.put(USER_ID_KEY, user_id).await;
                debug!("user {user_id} logged in");
                return Ok(Redirect::to("/").into_response());
            }
            Err(ModelError::InvalidCredentials) => {
                validator.add_non_field_error("Email or password is incorrect");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let data = new_template_data(&session, &context)
        .await?
        .with_form(&form, &validator)?;
    render(
        &state.templates,
        StatusCode::UNPROCESSABLE_ENTITY,
        "login.html",
        &data,
    )
}

pub async fn logout(session: Session, context: RequestContext) -> Response {
    session.renew_token().await;
    session.remove(AUTHENTICATED_KEY).await;
    session.remove(USER_ID_KEY).await;
    session
        .put_string(FLASH_KEY, "You've been logged out successfully!")
        .await;
    if let Some(user_id) = context.user_id {
        debug!("user {user_id} logged out");
    }
    Redirect::to("/").into_response()
}
