use crate::{
    models::{schema, PgSnippets, PgUsers},
    session::{store::spawn_cleanup, PgStore, SessionConfig, SessionManager, SessionStore},
    templates::TemplateCache,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, request_id::PropagateRequestIdLayer,
    services::ServeDir, set_header::SetRequestHeaderLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use self::{error::AppError, state::AppState};

use self::handlers::{health, ping, snippets, users};
use self::middleware::{auth, csrf, headers, recover, session};

const SESSION_CLEANUP_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Build the full application: static files, probes and page routes
/// behind the standard and per-route middleware.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/snippet/create",
            get(snippets::create_form).post(snippets::create),
        )
        .route("/user/logout", post(users::logout))
        .route_layer(from_fn(auth::require_authentication));

    // Layers listed first run first.
    let pages = Router::new()
        .route("/", get(snippets::home))
        .route("/snippet/view/:id/", get(snippets::view))
        .route("/user/signup", get(users::signup_form).post(users::signup))
        .route("/user/login", get(users::login_form).post(users::login))
        .merge(protected)
        .route_layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), session::load_and_save))
                .layer(from_fn(csrf::verify_csrf))
                .layer(from_fn_with_state(state.clone(), auth::authenticate)),
        );

    let request_timeout = state.request_timeout;

    Router::new()
        .nest_service("/static", ServeDir::new(&state.static_dir))
        .route("/ping", get(ping))
        .route("/health", get(health::health).options(health::health))
        .merge(pages)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(recover::handle_panic))
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(make_span)
                        .on_request(on_request),
                )
                .layer(from_fn(headers::secure_headers))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// Connect to the database, prepare tables and serve until shutdown.
///
/// # Errors
/// Returns an error if the database is unreachable, the templates fail to
/// parse or the listener cannot bind.
pub async fn new(
    port: u16,
    dsn: &SecretString,
    static_dir: PathBuf,
    request_timeout: Duration,
    session_config: SessionConfig,
    bcrypt_cost: u32,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    schema::bootstrap(&pool)
        .await
        .context("Failed to prepare database tables")?;

    let templates = Arc::new(TemplateCache::new()?);

    let session_store: Arc<dyn SessionStore> = Arc::new(PgStore::new(pool.clone()));
    spawn_cleanup(session_store.clone(), SESSION_CLEANUP_PERIOD);

    let state = AppState::new(
        Arc::new(PgUsers::new(pool.clone()).with_cost(bcrypt_cost)),
        Arc::new(PgSnippets::new(pool)),
        SessionManager::new(session_store, session_config),
        templates,
    )
    .with_static_dir(static_dir)
    .with_request_timeout(request_timeout);

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        http.uri = %request.uri(),
        request_id
    )
}

fn on_request(request: &Request<Body>, _span: &Span) {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string());

    info!(
        ip = %ip,
        proto = ?request.version(),
        method = %request.method(),
        uri = %request.uri(),
        "received request"
    );
}
