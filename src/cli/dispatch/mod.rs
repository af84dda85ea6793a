//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{
    auth, ARG_DSN, ARG_PORT, ARG_REQUEST_TIMEOUT_SECONDS, ARG_STATIC_DIR,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|v| !v.trim().is_empty())
        .context("missing required argument: --dsn")?;
    let static_dir = matches
        .get_one::<String>(ARG_STATIC_DIR)
        .map(PathBuf::from)
        .context("missing required argument: --static-dir")?;

    let request_timeout = matches
        .get_one::<u64>(ARG_REQUEST_TIMEOUT_SECONDS)
        .copied()
        .map(Duration::from_secs)
        .context("missing required argument: --request-timeout-seconds")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn: SecretString::from(dsn),
        static_dir,
        request_timeout,
        session: auth_opts.session,
        bcrypt_cost: auth_opts.bcrypt_cost,
    }))
}
