//! Tracing bootstrap.
//!
//! Everything goes to stderr so CLI subcommands can keep stdout for their
//! JSON output. `log::` records from sqlx and the db module are bridged into
//! the same subscriber.

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    filter::ParseError,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

/// Dependencies that are chatty at debug level.
const QUIET_TARGETS: [&str; 4] = ["sqlx=warn", "hyper=warn", "reqwest=info", "rustls=warn"];

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("invalid log filter '{directive}': {source}")]
    InvalidFilter {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Filter from `RUST_LOG` when set, otherwise the configured level with
/// dependency noise turned down.
pub fn build_filter(log_level: &str) -> Result<EnvFilter, TelemetryInitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = std::iter::once(log_level.trim())
        .chain(QUIET_TARGETS)
        .collect::<Vec<_>>()
        .join(",");

    EnvFilter::try_new(&directive).map_err(|source| TelemetryInitError::InvalidFilter {
        directive,
        source,
    })
}

/// Install the global subscriber. Later calls are no-ops.
///
/// `LOG_FORMAT` selects `json` (default), `pretty` or `compact`.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let filter = match build_filter(&config.log_level) {
        Ok(filter) => filter,
        Err(err) => {
            INSTALLED.store(false, Ordering::SeqCst);
            return Err(err);
        }
    };

    // Tests and embedders may have installed a logger already
    if let Err(err) = LogTracer::builder().with_max_level(LevelFilter::Debug).init() {
        eprintln!("log bridge not installed, `log` records bypass tracing: {err}");
    }

    let output = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        "compact" => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
        _ => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
    {
        INSTALLED.store(false, Ordering::SeqCst);
        return Err(err.into());
    }

    Ok(())
}
