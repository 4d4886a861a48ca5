use serde_derive::Deserialize;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum LogType {
    Stdout,
    Stderr,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub level: String,
    pub structured: bool,
    pub backend: LogType,
}

/// setup log from an optional environment filter and the config file
///
/// if the environment filter is present, then the config is not used
pub fn setup(
    env_filter: Result<EnvFilter, tracing_subscriber::filter::FromEnvError>,
    config: Option<&Log>,
) -> Result<(), SetGlobalDefaultError> {
    let (filter, config) = match (env_filter, config) {
        (Ok(env_filter), config) => (env_filter, config),
        (Err(_), Some(config)) => (EnvFilter::new(&config.level), Some(config)),
        (Err(_), None) => return Ok(()),
    };
    let ansi = !config.map_or(false, |c| c.structured);
    let builder = Subscriber::builder()
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc3339())
        .with_level(true)
        .with_target(!ansi)
        .with_ansi(ansi)
        .with_env_filter(filter);

    match config.map(|c| &c.backend) {
        Some(LogType::Stderr) => {
            tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())
        }
        _ => tracing::subscriber::set_global_default(builder.finish()),
    }
}
