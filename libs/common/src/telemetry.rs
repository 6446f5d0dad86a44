//! Telemetry for the mediator process
//!
//! Run-engine events carry `workflow_id`, `step`, and `topic` fields, and
//! the formats here exist to keep those fields greppable: compact
//! single-line output for terminals, JSON lines with the event fields
//! flattened to the top level for log shipping.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Operator log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact single-line output for terminals
    Compact,

    /// JSON lines with event fields flattened to the top level
    Json,
}

impl LogFormat {
    /// Resolve the format from `ENSEMBLE_LOG_FORMAT`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_name(
            std::env::var("ENSEMBLE_LOG_FORMAT")
                .as_deref()
                .unwrap_or_default(),
        )
    }

    /// Resolve a format name; anything other than "json" means compact
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

/// Initialize tracing for the mediator.
///
/// RUST_LOG overrides the filter. Without it, the ensemble crates log at
/// debug so per-run transitions (dispatches, drops, retries) stay visible,
/// while dependencies stay at info.
pub fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "info,ensemble_workflow_engine=debug,ensemble_bus=debug,ensemble_mediator=debug",
        )
    });

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer().json().flatten_event(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
