//! # Telemetry Features
//!
//! Logs always go to the console through `tracing_subscriber::fmt`. Export to
//! OpenTelemetry backends is opt-in.
//!
//! ## Feature matrix
//!
//! - `traces`: Enables OpenTelemetry distributed tracing (via spans).
//! - `metrics`: Enables OpenTelemetry metrics. Lifecycle events carrying
//!   `monotonic_counter.*` or `histogram.*` fields (service starts, shutdowns,
//!   drain duration) are turned into instruments by
//!   [`tracing_opentelemetry::MetricsLayer`].
//! - `honeycomb`: Enables the Honeycomb OTLP exporter.
//! - `stdout`: Enables the stdout OTLP exporter.
//!
//! ## Feature constraints
//!
//! - Exporters require at least one of `traces` or `metrics`.
//! - `honeycomb` and `stdout` can be enabled at the same time.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --bin compute-service --features traces,metrics,honeycomb
//! cargo run --bin network-service --features traces,stdout -- 9000
//! ```

#[cfg(all(feature = "honeycomb", not(any(feature = "traces", feature = "metrics"))))]
compile_error!(
    "The 'honeycomb' feature requires at least one of 'traces' or 'metrics' to be enabled."
);

#[cfg(all(feature = "stdout", not(any(feature = "traces", feature = "metrics"))))]
compile_error!("The 'stdout' feature requires at least one of 'traces' or 'metrics' to be enabled.");

use crate::config::ServiceProfile;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "traces")))]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "honeycomb", feature = "metrics"))]
use opentelemetry_sdk::metrics::Temporality;
#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "traces")))]
use tonic::{metadata::MetadataMap, transport::ClientTlsConfig};

#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;

#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry::KeyValue;
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "traces")]
use opentelemetry::{InstrumentationScope, trace::TracerProvider};
#[cfg(feature = "traces")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "traces")]
use opentelemetry_sdk::trace as sdktrace;

/// Export pipelines that must be flushed before the process exits.
pub struct TelemetryProviders {
    #[cfg(feature = "traces")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every enabled exporter.
    ///
    /// The subscriber may already be unusable at this point, so failures go
    /// to stderr.
    pub fn shutdown(self) {
        #[cfg(feature = "traces")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Installs the global subscriber for `profile`'s process.
pub fn init_telemetry(_profile: &ServiceProfile) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "traces")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "traces")]
    let tracer_provider = init_tracer(_profile)?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics(_profile)?;

    // Console output is unrelated to the `opentelemetry_stdout` exporter; it
    // prints spans/events as human-readable log lines.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "traces")]
    let registry = {
        let scope = InstrumentationScope::builder("autoinfra")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(semvcns::SCHEMA_URL)
            .build();
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "traces")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "traces")))]
struct HoneycombConfig {
    metadata: MetadataMap,
    endpoint: String,
    compression: Compression,
}

#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "traces")))]
impl HoneycombConfig {
    fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::str::FromStr;

        let api_key = std::env::var("HONEYCOMB_API_KEY").context("missing `HONEYCOMB_API_KEY`")?;
        let dataset = std::env::var("HONEYCOMB_DATASET").context("missing `HONEYCOMB_DATASET`")?;
        let mut metadata = MetadataMap::new();
        metadata.insert(
            "x-honeycomb-team",
            api_key.parse().context("invalid API key")?,
        );
        metadata.insert(
            "x-honeycomb-dataset",
            dataset.parse().context("invalid dataset")?,
        );

        let endpoint =
            std::env::var("HONEYCOMB_ENDPOINT").context("missing `HONEYCOMB_ENDPOINT`")?;
        let raw = std::env::var("HONEYCOMB_COMPRESSION")
            .context("missing `HONEYCOMB_COMPRESSION`")?
            .to_ascii_lowercase();
        let compression = Compression::from_str(&raw)?;

        Ok(Self {
            metadata,
            endpoint,
            compression,
        })
    }
}

#[cfg(any(feature = "metrics", feature = "traces"))]
fn resource(profile: &ServiceProfile) -> Resource {
    Resource::builder()
        .with_service_name(format!("autoinfra-{}", profile.name))
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics(profile: &ServiceProfile) -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource(profile));

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();
        builder.with_reader(reader)
    };

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let honeycomb = HoneycombConfig::from_env()?;
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(honeycomb.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(honeycomb.compression)
            .with_endpoint(honeycomb.endpoint)
            .with_protocol(Protocol::Grpc)
            .with_temporality(Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "traces")]
fn init_tracer(profile: &ServiceProfile) -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource(profile));

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::SpanExporter::default();
        builder.with_span_processor(batch_processor(exporter))
    };

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let honeycomb = HoneycombConfig::from_env()?;
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(honeycomb.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(honeycomb.compression)
            .with_endpoint(honeycomb.endpoint)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;
        builder.with_span_processor(batch_processor(exporter))
    };

    Ok(builder.build())
}

#[cfg(all(feature = "traces", any(feature = "stdout", feature = "honeycomb")))]
fn batch_processor<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: opentelemetry_sdk::trace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(std::time::Duration::from_secs(5))
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}
