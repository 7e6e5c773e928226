use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _};

use tslog::GenericError;

/// Initializes the logging subsystem for `tracing`.
///
/// This function reads the `TSLOG_LOG_LEVEL` environment variable to determine the log level to use. If the environment
/// variable is not set, the default log level is `INFO`. Additionally, it reads the `TSLOG_LOG_FORMAT_JSON` environment
/// variable to determine which output format to use: if it is set to `true` or `1`, logs are formatted as JSON.
/// Otherwise, logs are written in a human-readable format.
///
/// # Errors
///
/// If the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging() -> Result<(), GenericError> {
    let is_json = std::env::var("TSLOG_LOG_FORMAT_JSON")
        .map(|s| s.trim().to_lowercase())
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false);

    let level_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("TSLOG_LOG_LEVEL")
        .from_env_lossy();

    if is_json {
        let json_layer = tracing_subscriber::fmt::Layer::new()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_thread_names(true);
        tracing_subscriber::registry()
            .with(json_layer.with_filter(level_filter))
            .try_init()?;
    } else {
        let pretty_layer = tracing_subscriber::fmt::Layer::new().with_thread_names(true);
        tracing_subscriber::registry()
            .with(pretty_layer.with_filter(level_filter))
            .try_init()?;
    }

    Ok(())
}
