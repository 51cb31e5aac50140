//! Subscriber installation.

use anyhow::{Context, Result};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::config::{LogFormat, TracingConfig};

/// Handle returned by [`init_tracing`]. Hold it for the lifetime of the process.
#[must_use = "dropping the guard immediately is almost always a mistake"]
#[derive(Debug)]
pub struct TracingGuard {
    format: LogFormat,
}

impl TracingGuard {
    /// The format the subscriber was installed with.
    pub fn format(&self) -> LogFormat {
        self.format
    }
}

/// Install a global tracing subscriber.
///
/// Fails if a global subscriber is already set. An invalid filter string
/// falls back to `info`.
pub fn init_tracing(config: TracingConfig) -> Result<TracingGuard> {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_file(config.include_location())
                    .with_line_number(config.include_location())
                    .with_target(config.include_target())
                    .with_thread_ids(config.include_thread_ids())
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(config.include_location())
                    .with_line_number(config.include_location())
                    .with_target(config.include_target())
                    .with_thread_ids(config.include_thread_ids()),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_file(config.include_location())
                    .with_line_number(config.include_location())
                    .with_target(config.include_target())
                    .with_thread_ids(config.include_thread_ids()),
            )
            .try_init(),
    }
    .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(format = ?config.log_format(), filter = %config.log_filter(), "Tracing initialized");

    Ok(TracingGuard {
        format: config.log_format(),
    })
}
