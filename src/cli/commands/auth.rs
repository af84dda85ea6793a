use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::session::{SessionConfig, MAX_SESSION_SECONDS};

pub const ARG_SESSION_LIFETIME_SECONDS: &str = "session-lifetime-seconds";
pub const ARG_SESSION_IDLE_TIMEOUT_SECONDS: &str = "session-idle-timeout-seconds";
pub const ARG_SESSION_COOKIE_SECURE: &str = "session-cookie-secure";
pub const ARG_BCRYPT_COST: &str = "bcrypt-cost";

#[derive(Debug)]
pub struct Options {
    pub session: SessionConfig,
    pub bcrypt_cost: u32,
}

impl Options {
    /// Parse session and password hashing arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_i64 = |id: &str| -> anyhow::Result<i64> {
            matches
                .get_one::<i64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let session = SessionConfig::new()
            .with_lifetime_seconds(read_i64(ARG_SESSION_LIFETIME_SECONDS)?)
            .with_idle_timeout_seconds(read_i64(ARG_SESSION_IDLE_TIMEOUT_SECONDS)?)
            .with_cookie_secure(
                matches
                    .get_one::<bool>(ARG_SESSION_COOKIE_SECURE)
                    .copied()
                    .unwrap_or(true),
            );

        let bcrypt_cost = matches
            .get_one::<u32>(ARG_BCRYPT_COST)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_BCRYPT_COST}"))?;

        Ok(Self {
            session,
            bcrypt_cost,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_LIFETIME_SECONDS)
                .long(ARG_SESSION_LIFETIME_SECONDS)
                .help("Absolute session lifetime in seconds")
                .env("SNIPPETBOX_SESSION_LIFETIME_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_SESSION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_SESSION_IDLE_TIMEOUT_SECONDS)
                .long(ARG_SESSION_IDLE_TIMEOUT_SECONDS)
                .help("Session idle timeout in seconds, 0 disables it")
                .env("SNIPPETBOX_SESSION_IDLE_TIMEOUT_SECONDS")
                .default_value("1200")
                .value_parser(clap::value_parser!(i64).range(0..=MAX_SESSION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_SECURE)
                .long(ARG_SESSION_COOKIE_SECURE)
                .help("Mark the session cookie Secure (disable only for plain HTTP development)")
                .env("SNIPPETBOX_SESSION_COOKIE_SECURE")
                .default_value("true")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_BCRYPT_COST)
                .long(ARG_BCRYPT_COST)
                .help("bcrypt work factor for new password hashes")
                .env("SNIPPETBOX_BCRYPT_COST")
                .default_value("12")
                .value_parser(clap::value_parser!(u32).range(4..=31)),
        )
}
