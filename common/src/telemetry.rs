use anyhow::Result;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use std::env;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318/v1/traces";

/// Installs the global subscriber: compact fmt output filtered by `RUST_LOG`
/// (default `info`), plus an OTLP/HTTP span exporter when
/// `OTEL_TRACES_EXPORTER=otlp`.
pub fn init_telemetry(service_name: &'static str) {
    // W3C trace context, used by the node client and the node middleware
    global::set_text_map_propagator(TraceContextPropagator::new());

    let otlp_enabled = env::var("OTEL_TRACES_EXPORTER")
        .map(|v| v == "otlp")
        .unwrap_or(false);

    let tracer = if otlp_enabled {
        let endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());
        match create_otlp_tracer(&endpoint, service_name) {
            Ok(tracer) => Some(tracer),
            Err(e) => {
                eprintln!("failed to initialize OTLP tracer for {service_name}: {e}");
                None
            }
        }
    } else {
        None
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(tracer.map(OpenTelemetryLayer::new))
        .init();
}

fn create_otlp_tracer(endpoint: &str, service_name: &'static str) -> Result<Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(service_name).build())
        .build();

    let tracer = provider.tracer(service_name);
    global::set_tracer_provider(provider);

    Ok(tracer)
}
