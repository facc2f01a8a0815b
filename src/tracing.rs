//! Logging setup for processes embedding the resctrl manager
//!
//! The library itself only emits `tracing` events; binaries decide where
//! they go by calling [`init_tracing`] once at startup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,rdtvisor=debug";

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install a global subscriber with an `EnvFilter`
///
/// Falls back to [`DEFAULT_FILTER`] when `RUST_LOG` is unset or invalid.
/// If a subscriber is already installed (tests, or the host process set
/// one up) this leaves it in place and returns `Ok`.
pub fn init_tracing(
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
        return Ok(());
    }

    tracing::info!(?format, "tracing initialized");
    Ok(())
}
