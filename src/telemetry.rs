//! Logging and distributed tracing setup
//!
//! Logs go to stdout, as text or JSON. When `OTEL_EXPORTER_OTLP_ENDPOINT` is
//! set, spans are also exported over OTLP.

use opentelemetry::trace::TraceError;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{self as sdktrace, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use tracing::{info, warn, Level, Subscriber};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const OTEL_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const SERVICE_NAME: &str = "network-status-operator";

/// Build the OTLP layer, or `None` when no collector endpoint is configured
pub fn init_telemetry<S>() -> Result<Option<OpenTelemetryLayer<S, Tracer>>, TraceError>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let Ok(endpoint) = std::env::var(OTEL_ENDPOINT_ENV) else {
        return Ok(None);
    };

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])))
        .install_batch(runtime::Tokio)?;

    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
}

/// Install the global subscriber
///
/// Must be called from within a tokio runtime when OTLP export is enabled.
pub fn init_tracing(log_json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let json_layer = log_json.then(|| fmt::layer().json().with_target(true));
    let text_layer = (!log_json).then(|| fmt::layer().with_target(true));

    let (otel_layer, otel_error) = match init_telemetry() {
        Ok(layer) => (layer, None),
        Err(e) => (None, Some(e)),
    };
    let otel_enabled = otel_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .init();

    match (otel_enabled, otel_error) {
        (_, Some(e)) => warn!("OpenTelemetry tracing disabled: {}", e),
        (true, None) => info!("OpenTelemetry tracing initialized"),
        (false, None) => {
            info!("OpenTelemetry tracing disabled ({} not set)", OTEL_ENDPOINT_ENV)
        }
    }
}

/// Flush any remaining spans
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
