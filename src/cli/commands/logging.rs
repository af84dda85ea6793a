use clap::{builder::ValueParser, Arg, ArgMatches, Command};
use std::str::FromStr;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_FORMAT: &str = "log-format";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("invalid log format: {s}")),
        }
    }
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn validator_log_format() -> ValueParser {
    ValueParser::from(|format: &str| format.parse::<LogFormat>())
}

/// Log format from matches; text unless asked otherwise.
#[must_use]
pub fn log_format(matches: &ArgMatches) -> LogFormat {
    matches
        .get_one::<LogFormat>(ARG_LOG_FORMAT)
        .copied()
        .unwrap_or_default()
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("SNIPPETBOX_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long(ARG_LOG_FORMAT)
                .help("Log output format: text or json")
                .env("SNIPPETBOX_LOG_FORMAT")
                .default_value("text")
                .value_parser(validator_log_format()),
        )
}
