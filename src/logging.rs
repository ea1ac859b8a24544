use tracing_subscriber::fmt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingSection};

/// Install the global subscriber.
///
/// Level precedence: `override_level` (the `--log-level` flag), then
/// `RUST_LOG`, then the config file. Records emitted through the `log`
/// facade by the ledger crates are forwarded into the same subscriber.
pub fn init(section: &LoggingSection, override_level: Option<&str>) -> anyhow::Result<()> {
    let filter = match override_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&section.level))?,
    };

    let builder = fmt().with_env_filter(filter).with_target(true);
    match section.format {
        LogFormat::Json => builder.json().finish().try_init()?,
        LogFormat::Pretty => builder.finish().try_init()?,
    }
    Ok(())
}
