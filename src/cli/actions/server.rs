use crate::{api, session::SessionConfig};
use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::{path::PathBuf, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub static_dir: PathBuf,
    pub request_timeout: Duration,
    pub session: SessionConfig,
    pub bcrypt_cost: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    api::new(
        args.port,
        &args.dsn,
        args.static_dir,
        args.request_timeout,
        args.session,
        args.bcrypt_cost,
    )
    .await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(args.dsn.expose_secret())),
        ("static_dir", args.static_dir.display().to_string()),
        (
            "request_timeout_seconds",
            args.request_timeout.as_secs().to_string(),
        ),
        (
            "session_lifetime_seconds",
            args.session.lifetime_seconds().to_string(),
        ),
        (
            "session_idle_timeout_seconds",
            args.session.idle_timeout_seconds().to_string(),
        ),
        (
            "session_cookie_secure",
            args.session.cookie_secure().to_string(),
        ),
        ("bcrypt_cost", args.bcrypt_cost.to_string()),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "snippetbox {} - {}\n\n{title}:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed.chars().take(7).collect()
}
