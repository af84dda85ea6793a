mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::TestApp;
use snippetbox::models::memory::{FIXTURE_USER_EMAIL, FIXTURE_USER_ID, FIXTURE_USER_PASSWORD};

#[tokio::test]
async fn signup_then_login() -> Result<()> {
    let app = TestApp::new().await?;
    let mut client = app.client();

    let response = client
        .submit(
            "/user/signup",
            "/user/signup",
            &[
                ("name", "Bob"),
                ("email", "bob@example.com"),
                ("password", "validPa$$word"),
            ],
        )
        .await?;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
    assert_eq!(app.users.len().await, 2);

    let response = client.get("/user/login").await?;
    assert!(response
        .body
        .contains("Your signup was successful. Please log in."));

    let response = client.login("bob@example.com", "validPa$$word").await?;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/"));
    Ok(())
}

#[tokio::test]
async fn signup_validation() -> Result<()> {
    let app = TestApp::new().await?;
    let mut client = app.client();

    let cases = [
        ("", "bob@example.com", "validPa$$word", "This field cannot be blank"),
        ("Bob", "", "validPa$$word", "This field cannot be blank"),
        ("Bob", "bob@example.", "validPa$$word", "This field must be a valid email address"),
        ("Bob", "bob@example.com", "", "This field cannot be blank"),
        ("Bob", "bob@example.com", "pa$$", "This field must be at least 8 characters long"),
        ("Bob", FIXTURE_USER_EMAIL, "validPa$$word", "Email address is already in use"),
    ];

    for (name, email, password, message) in cases {
        let response = client
            .submit(
                "/user/signup",
                "/user/signup",
                &[("name", name), ("email", email), ("password", password)],
            )
            .await?;
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY, "{email}");
        assert!(response.body.contains(message), "{message}");
        assert!(response.body.contains(r#"<form action="/user/signup" method="POST" novalidate>"#));
        // Submitted values come back, except the password.
        assert!(response.body.contains(&format!(r#"value="{email}""#)));
        assert!(password.is_empty() || !response.body.contains(password));
    }

    assert_eq!(app.users.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_credentials() -> Result<()> {
    let app = TestApp::new().await?;
    let mut client = app.client();

    for (email, password) in [
        (FIXTURE_USER_EMAIL, "wrong-password"),
        ("nobody@example.com", FIXTURE_USER_PASSWORD),
    ] {
        let response = client.login(email, password).await?;
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.body.contains("Email or password is incorrect"));
    }

    let response = client.login("", "").await?;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("This field cannot be blank"));
    assert!(!response.body.contains("Email or password is incorrect"));

    let response = client.get("/snippet/create").await?;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    Ok(())
}

#[tokio::test]
async fn login_renews_the_session_token() -> Result<()> {
    let app = TestApp::new().await?;
    let mut client = app.client();

    client.get("/user/login").await?;
    let before = client.cookie.clone();
    assert!(before.is_some());

    client.login_fixture_user().await?;
    assert!(client.cookie.is_some());
    assert_ne!(client.cookie, before);

    let response = client.get("/").await?;
    assert!(response.body.contains(r#"action="/user/logout""#));

    // The pre-login token carries no privileges.
    let mut stale = client.clone();
    stale.cookie = before;
    let response = stale.get("/snippet/create").await?;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
    Ok(())
}

#[tokio::test]
async fn logout() -> Result<()> {
    let app = TestApp::new().await?;
    let mut client = app.client();
    client.login_fixture_user().await?;

    let response = client.submit("/", "/user/logout", &[]).await?;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/"));

    let response = client.get("/").await?;
    assert!(response.body.contains("been logged out successfully!"));
    assert!(response.body.contains(r#"href="/user/login""#));
    assert!(!response.body.contains(r#"action="/user/logout""#));

    let response = client.get("/snippet/create").await?;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
    Ok(())
}

#[tokio::test]
async fn logout_requires_authentication() -> Result<()> {
    let app = TestApp::new().await?;
    let mut client = app.client();

    // A valid token, but nobody to log out.
    let response = client.submit("/user/login", "/user/logout", &[]).await?;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
    Ok(())
}

#[tokio::test]
async fn csrf_failures_are_bad_requests() -> Result<()> {
    let app = TestApp::new().await?;

    // No session at all.
    let mut client = app.client();
    let response = client
        .post_form(
            "/user/login",
            &[("email", FIXTURE_USER_EMAIL), ("password", FIXTURE_USER_PASSWORD)],
        )
        .await?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // A session, but the token is missing or wrong.
    client.get("/user/login").await?;
    let response = client
        .post_form(
            "/user/login",
            &[("email", FIXTURE_USER_EMAIL), ("password", FIXTURE_USER_PASSWORD)],
        )
        .await?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = client
        .post_form(
            "/user/login",
            &[
                ("email", FIXTURE_USER_EMAIL),
                ("password", FIXTURE_USER_PASSWORD),
                ("csrf_token", "forged"),
            ],
        )
        .await?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // Tokens minted before login die with the old session.
    let page = client.get("/user/login").await?;
    let old_token = page.csrf_token()?;
    client.login_fixture_user().await?;
    let response = client
        .post_form("/user/logout", &[("csrf_token", old_token.as_str())])
        .await?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = client.get("/snippet/create").await?;
    assert_eq!(response.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn deleted_users_lose_their_session() -> Result<()> {
    let app = TestApp::new().await?;
    let mut client = app.client();
    client.login_fixture_user().await?;

    let response = client.get("/snippet/create").await?;
    assert_eq!(response.status, StatusCode::OK);

    app.users.remove(FIXTURE_USER_ID).await;

    let response = client.get("/snippet/create").await?;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));

    let response = client.get("/").await?;
    assert!(!response.body.contains(r#"action="/user/logout""#));
    Ok(())
}
