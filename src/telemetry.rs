use std::time::Instant;

use metrics::{histogram, increment_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use vudata_core::Family;

use crate::{config::LoggingConfig, error::PrimitiveError};

/// Installs the global tracing subscriber. `RUST_LOG` wins over the config.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn outcome<T>(result: &Result<T, PrimitiveError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(PrimitiveError::Validation(_)) => "invalid",
        Err(PrimitiveError::NotFound { .. }) => "not_found",
        Err(e) if e.is_transient() => "busy",
        Err(PrimitiveError::Storage(_)) => "error",
    }
}

/// Runs one engine operation, recording its outcome and latency.
pub fn observe<T>(
    family: Family,
    op: &'static str,
    f: impl FnOnce() -> Result<T, PrimitiveError>,
) -> Result<T, PrimitiveError> {
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();

    let outcome = outcome(&result);
    increment_counter!(
        "vudata_operations_total",
        "family" => family.as_str(),
        "op" => op,
        "outcome" => outcome
    );
    histogram!(
        "vudata_operation_seconds",
        elapsed.as_secs_f64(),
        "family" => family.as_str(),
        "op" => op
    );

    match &result {
        Err(PrimitiveError::Storage(e)) => {
            tracing::warn!(%family, op, error = %e, "storage operation failed");
        }
        _ => tracing::debug!(%family, op, outcome, elapsed_us = elapsed.as_micros() as u64, "operation finished"),
    }
    result
}
