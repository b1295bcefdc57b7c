//! Tracing/logging bootstrap, grounded on `ph_operator::main::init_telemetry`:
//! an `EnvFilter` plus a JSON `fmt` layer, with an optional Jaeger export
//! layer behind the `jaeger` feature so a plain build never needs a collector
//! reachable at startup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[cfg(feature = "jaeger")]
pub struct TelemetryGuard;

#[cfg(feature = "jaeger")]
impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

#[cfg(not(feature = "jaeger"))]
pub struct TelemetryGuard;

/// Initializes the global tracing subscriber. Returns a guard that flushes
/// the exporter (when the `jaeger` feature is enabled) on drop.
pub fn init(log_level: &str) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json();

    #[cfg(feature = "jaeger")]
    {
        let tracer = opentelemetry_jaeger::new_agent_pipeline()
            .with_service_name("openfero")
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;
        let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

        tracing_subscriber::registry()
            .with(filter)
            .with(telemetry)
            .with(fmt_layer)
            .try_init()?;

        Ok(TelemetryGuard)
    }

    #[cfg(not(feature = "jaeger"))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(TelemetryGuard)
    }
}
