//! Logging and telemetry
//!
//! Plain `tracing` output by default. When `OTEL_EXPORTER_OTLP_ENDPOINT` is
//! set, spans are also exported over OTLP.

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider;
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::{propagation::TraceContextPropagator, runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "travel_recommender=info,tower_http=info";

/// Flushes exported spans on drop
pub struct TelemetryGuard {
    otel: bool,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.otel {
            global::shutdown_tracer_provider();
        }
    }
}

pub fn init_telemetry(service_name: &str) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_err() {
        Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .context("Failed to set tracing subscriber")?;
        return Ok(TelemetryGuard { otel: false });
    }

    global::set_text_map_propagator(TraceContextPropagator::new());

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .build_span_exporter()
        .context("Failed to build OTLP span exporter")?;

    let trace_config = sdktrace::Config::default().with_resource(Resource::new(vec![KeyValue::new(
        "service.name",
        service_name.to_string(),
    )]));

    let provider = sdktrace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(trace_config)
        .build();
    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer(service_name.to_string());

    Registry::default()
        .with(filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .context("Failed to set tracing subscriber")?;

    Ok(TelemetryGuard { otel: true })
}
