//! Telemetry initialization.
//!
//! Both daemons (pollers and consumer) call [`init_telemetry`] once at
//! startup. With an OTLP endpoint configured, traces, metrics, and
//! logs are exported there in addition to stderr; without one, only
//! the fmt layer is installed for local runs.

pub mod metrics;
pub mod pipeline;

use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::error::{Error, Result};

pub struct TelemetryConfig {
    /// OTLP endpoint (e.g. "http://localhost:4317"). `None` means
    /// stderr-only output.
    pub endpoint: Option<String>,
    /// Service name reported in telemetry signals, e.g.
    /// "newsflow-poll" vs "newsflow-consume".
    pub service_name: String,
    /// Default log filter when RUST_LOG is unset.
    pub log_level: String,
}

/// Keeps the OTel providers alive and shuts them down on drop, so the
/// final poll cycle's spans and counters are flushed before exit.
pub struct TelemetryGuard {
    providers: Option<OtlpProviders>,
}

struct OtlpProviders {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // Logs first: provider shutdown itself emits log records.
        if let Some(p) = self.providers.take() {
            let _ = p.logger.shutdown();
            let _ = p.meter.shutdown();
            let _ = p.tracer.shutdown();
        }
    }
}

/// Install the tracing subscriber, with OTLP export when configured.
///
/// Hold the returned guard for the life of the process. Fails if a
/// subscriber is already installed or an exporter cannot be built.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let Some(endpoint) = config.endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| Error::config(format!("failed to init tracing subscriber: {e}")))?;
        return Ok(TelemetryGuard { providers: None });
    };

    let resource = Resource::builder()
        .with_service_name(config.service_name)
        .build();
    let providers = build_otlp_providers(&endpoint, &resource)?;

    use opentelemetry::trace::TracerProvider as _;
    let tracer = providers.tracer.tracer("newsflow");
    let log_bridge =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&providers.logger);

    // OTel export plus a compact stderr layer, so daemon output stays
    // readable under systemd.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(log_bridge)
        .try_init()
        .map_err(|e| Error::config(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard {
        providers: Some(providers),
    })
}

fn build_otlp_providers(endpoint: &str, resource: &Resource) -> Result<OtlpProviders> {
    use opentelemetry_otlp::WithExportConfig as _;

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::config(format!("failed to create OTLP span exporter: {e}")))?;
    let tracer = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::config(format!("failed to create OTLP metric exporter: {e}")))?;
    let meter = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .with_resource(resource.clone())
        .build();
    opentelemetry::global::set_meter_provider(meter.clone());

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::config(format!("failed to create OTLP log exporter: {e}")))?;
    let logger = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource.clone())
        .build();

    Ok(OtlpProviders {
        tracer,
        meter,
        logger,
    })
}
