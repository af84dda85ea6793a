pub mod auth;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_STATIC_DIR: &str = "static-dir";
pub const ARG_REQUEST_TIMEOUT_SECONDS: &str = "request-timeout-seconds";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("snippetbox")
        .about("Share short-lived text snippets")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("SNIPPETBOX_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("SNIPPETBOX_DSN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_STATIC_DIR)
                .long(ARG_STATIC_DIR)
                .help("Directory served under /static/")
                .env("SNIPPETBOX_STATIC_DIR")
                .default_value("./ui/static"),
        )
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT_SECONDS)
                .long(ARG_REQUEST_TIMEOUT_SECONDS)
                .help("Seconds a request may take before it is answered with 408")
                .env("SNIPPETBOX_REQUEST_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..=300)),
        );

    let command = auth::with_args(command);
    logging::with_args(command)
}
