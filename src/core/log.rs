use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Installs the global subscriber, writing to stderr so JSON output on
/// stdout stays clean. Output is off unless `verbose` is set or `RUST_LOG`
/// says otherwise.
pub fn init_logging(verbose: bool) -> Result<()> {
    let (level_filter, level) = if verbose {
        (LevelFilter::DEBUG, "debug")
    } else {
        (LevelFilter::OFF, "off")
    };
    let crate_filter = Targets::new().with_target(CRATE_TARGET, level_filter);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let layer = fmt::layer()
        .pretty()
        .without_time()
        .with_ansi(console::colors_enabled_stderr())
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(layer)
        .with(crate_filter)
        .with(env_filter)
        .try_init()
        .context("Failed to install the log subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_can_only_be_installed_once() {
        assert_eq!(CRATE_TARGET, "bridgefx");
        assert!(init_logging(false).is_ok());
        assert!(init_logging(true).is_err());
    }
}
