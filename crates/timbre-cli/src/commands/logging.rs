use anyhow::{anyhow, bail, Result};
use timbre_similarity::config::LoggingConfig;
use twyg::{LogLevel, OptsBuilder};

/// Install the global logger from the `[logging]` section.
pub fn setup(logging: &LoggingConfig) -> Result<()> {
    let opts = OptsBuilder::new()
        .coloured(logging.coloured)
        .level(parse_level(&logging.level)?)
        .report_caller(false)
        .build()
        .map_err(|e| anyhow!("Invalid logging options: {e:?}"))?;

    twyg::setup(opts).map_err(|e| anyhow!("Could not set up logger: {e:?}"))?;
    Ok(())
}

fn parse_level(level: &str) -> Result<LogLevel> {
    Ok(match level.to_ascii_lowercase().as_str() {
        "trace" => LogLevel::Trace,
        "debug" => LogLevel::Debug,
        "info" => LogLevel::Info,
        "warn" | "warning" => LogLevel::Warn,
        "error" => LogLevel::Error,
        other => bail!("Unknown log level: {other}\n\nValid levels: trace, debug, info, warn, error"),
    })
}
