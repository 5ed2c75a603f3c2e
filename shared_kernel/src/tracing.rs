use anyhow::Context;
use opentelemetry::global;
use opentelemetry::sdk::propagation::BaggagePropagator;
use opentelemetry::sdk::propagation::TextMapCompositePropagator;
use opentelemetry::sdk::propagation::TraceContextPropagator;
use opentelemetry::sdk::trace;
use opentelemetry::sdk::Resource;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

const DEFAULT_DIRECTIVES: &str = "info";

/// Installs the global subscriber: JSON logs filtered by `RUST_LOG` (defaulting to `info`),
/// plus an OTLP span exporter unless `SKIP_OTLP_EXPORTER` is set.
pub fn config_telemetry(service_name: &'static str) -> anyhow::Result<()> {
    // Needed to forward ordinary log statements to our tracing subscriber.
    tracing_log::LogTracer::init().context("Failed to initialize log tracer")?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let subscriber = Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_names(true),
    );

    let otel_layer = match std::env::var("SKIP_OTLP_EXPORTER") {
        Ok(_) => None,
        Err(_) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_env())
                .with_trace_config(trace::config().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name),
                ])))
                .install_batch(opentelemetry::runtime::Tokio)
                .context("Failed to initialize otlp tracer")?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
    };

    tracing::subscriber::set_global_default(subscriber.with(otel_layer))
        .context("Failed to install `tracing` subscriber")?;

    let composite_propagator = TextMapCompositePropagator::new(vec![
        Box::new(BaggagePropagator::new()),
        Box::new(TraceContextPropagator::new()),
    ]);
    global::set_text_map_propagator(composite_propagator);
    Ok(())
}

pub fn shutdown_global_tracer_provider() {
    global::shutdown_tracer_provider();
}
