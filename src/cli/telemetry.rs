use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::cli::commands::logging::LogFormat;

/// Initialize logging.
///
/// `RUST_LOG` overrides the level picked with `--verbose`.
///
/// # Errors
///
/// Returns an error if a filter directive is invalid or a global subscriber
/// is already installed.
pub fn init(verbosity_level: Option<Level>, format: LogFormat) -> Result<()> {
    let verbosity_level = verbosity_level.unwrap_or(Level::ERROR);

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("sqlx=warn".parse()?);

    match format {
        LogFormat::Text => {
            let fmt_layer = fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_target(false);
            let subscriber = Registry::default().with(fmt_layer).with(filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true);
            let subscriber = Registry::default().with(fmt_layer).with(filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
