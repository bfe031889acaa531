//! Observability module for logging and metrics

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "metrics")]
pub use metrics::{init_metrics, render_metrics};

use crate::Result;
use crate::config::TelemetryConfig;

/// Initialize observability stack
pub fn init_observability(config: &TelemetryConfig) -> Result<()> {
    #[cfg(feature = "metrics")]
    {
        init_metrics()?;
    }

    init_logging(config);
    Ok(())
}

/// Initialize the tracing subscriber; `RUST_LOG` wins over the configured level
fn init_logging(config: &TelemetryConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Outcome label used in logs and metrics
pub(crate) const fn outcome_label(outcome: &crate::auth::Outcome) -> &'static str {
    match outcome {
        crate::auth::Outcome::NotHandled => "not_handled",
        crate::auth::Outcome::Handled => "handled",
        crate::auth::Outcome::Rejected(_) => "rejected",
    }
}
