use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Every metric recorded by the stores and their sync loops. All carry a
/// `store` label naming the store.
const STORE_METRICS: &[(&str, MetricKind, Unit, &str)] = &[
    (
        "quizstore_store_sync_ms",
        MetricKind::Histogram,
        Unit::Milliseconds,
        "Store sync latency in milliseconds.",
    ),
    (
        "quizstore_store_events_applied_total",
        MetricKind::Counter,
        Unit::Count,
        "Total number of events applied to store snapshots.",
    ),
    (
        "quizstore_store_sync_errors_total",
        MetricKind::Counter,
        Unit::Count,
        "Total number of failed store syncs.",
    ),
    (
        "quizstore_store_objects",
        MetricKind::Gauge,
        Unit::Count,
        "Current number of objects held by a store snapshot.",
    ),
];

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, kind, unit, description) in STORE_METRICS {
            match kind {
                MetricKind::Counter => describe_counter!(*name, *unit, *description),
                MetricKind::Gauge => describe_gauge!(*name, *unit, *description),
                MetricKind::Histogram => describe_histogram!(*name, *unit, *description),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn metric_names_are_unique_and_prefixed() {
        let names: HashSet<&str> = STORE_METRICS.iter().map(|(name, ..)| *name).collect();
        assert_eq!(names.len(), STORE_METRICS.len());
        assert!(names.iter().all(|name| name.starts_with("quizstore_store_")));
    }
}
