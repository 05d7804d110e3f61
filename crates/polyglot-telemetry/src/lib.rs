//! Logging for Polyglot
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a
//! text or JSON formatter chosen by configuration.

use polyglot_config::{LogFormat, TelemetryConfig};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber
///
/// `filter_override` (from the command line) wins over the configured
/// filter. An unparsable filter falls back to `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(config: Option<&TelemetryConfig>, filter_override: Option<&str>) -> anyhow::Result<()> {
    let defaults = TelemetryConfig::default();
    let config = config.unwrap_or(&defaults);

    let directive = filter_override.unwrap_or(&config.log_filter);
    let filter = build_filter(directive);

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);
            registry
                .with(fmt_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_target(true);
            registry
                .with(fmt_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;
        }
    }

    Ok(())
}

fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|e| {
        eprintln!("invalid log filter {directive:?}: {e}, falling back to info");
        EnvFilter::new("info")
    })
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn valid_directive_is_kept() {
        let filter = build_filter("polyglot_llm=debug,warn");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn invalid_directive_falls_back_to_info() {
        let filter = build_filter("polyglot_llm=loudest");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }
}
