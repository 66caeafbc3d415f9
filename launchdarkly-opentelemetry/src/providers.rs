// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, InstrumentationScope, KeyValue};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_resource_detectors::{
    HostResourceDetector, OsResourceDetector, ProcessResourceDetector,
};
use opentelemetry_sdk::logs::{BatchLogProcessor, SdkLogger, SdkLoggerProvider};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::resource::ResourceDetector;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, SdkTracer, SdkTracerProvider,
};
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions as semconv;

use ld_observe::{ld_error, Error, Result, INSTRUMENTATION_NAME, INSTRUMENTATION_VERSION};
use ld_observe_sampling::{CustomSampler, SamplingConfig, TraceSampler};

use crate::http_client::GzipHttpClient;
use crate::log_exporter::SamplingLogExporter;
use crate::span_exporter::SamplingSpanExporter;

/// Span and log exports give the collector ample time before giving up.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(30);
/// Spans are batched for at most this long before an export is triggered.
const SPAN_BATCH_DELAY: Duration = Duration::from_secs(1);
/// Metrics are pushed on this cadence.
const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration captured for the telemetry providers.
///
/// This is distilled from the public plugin configuration when the plugin is
/// registered and must be installed with [`set_config`] before [`start`].
#[derive(Debug, Clone)]
pub(crate) struct OtelConfig {
    pub otlp_endpoint: String,
    pub resource_attributes: Vec<KeyValue>,
    pub head_sampler: Option<TraceSampler>,
    pub span_max_export_batch_size: usize,
    pub span_max_queue_size: usize,
    pub log_max_export_batch_size: usize,
    pub log_max_queue_size: usize,
}

/// The SDK providers currently exporting telemetry.
struct ProviderInstances {
    tracer_provider: SdkTracerProvider,
    logger_provider: SdkLoggerProvider,
    meter_provider: SdkMeterProvider,
}

/// The instruments emission goes through.
pub(crate) struct OtelInstances {
    pub tracer: SdkTracer,
    logger_provider: SdkLoggerProvider,
    logger_scope: InstrumentationScope,
    pub meter: Meter,
}

// Starting or stopping telemetry is done with this lock held. Reads of the
// instrument cell never take it.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

// Instruments are stored in an atomic cell so emission from any thread sees
// a consistent snapshot without locking, including threads spawned before
// the provider was configured. The initial value routes to providers with no
// processors, making emission before startup a silent no-op.
static INSTANCES: OnceLock<ArcSwap<OtelInstances>> = OnceLock::new();

// The currently active providers; present between `start` and `shutdown`.
static ACTIVE: OnceLock<ArcSwapOption<ProviderInstances>> = OnceLock::new();

// The currently captured configuration, stored separately from the providers
// to allow manual starting after the plugin is registered.
static CONFIG: OnceLock<ArcSwapOption<OtelConfig>> = OnceLock::new();

fn instances_cell() -> &'static ArcSwap<OtelInstances> {
    INSTANCES.get_or_init(|| ArcSwap::from_pointee(noop_instances()))
}

fn active_cell() -> &'static ArcSwapOption<ProviderInstances> {
    ACTIVE.get_or_init(ArcSwapOption::empty)
}

fn config_cell() -> &'static ArcSwapOption<OtelConfig> {
    CONFIG.get_or_init(ArcSwapOption::empty)
}

/// The export sampler shared by the span and log interposers. It outlives
/// any single provider generation so a fetched sampling configuration
/// survives a stop/start cycle.
pub(crate) fn export_sampler() -> &'static Arc<CustomSampler> {
    static SAMPLER: OnceLock<Arc<CustomSampler>> = OnceLock::new();
    SAMPLER.get_or_init(|| Arc::new(CustomSampler::new()))
}

fn instrumentation_scope() -> InstrumentationScope {
    InstrumentationScope::builder(INSTRUMENTATION_NAME)
        .with_version(INSTRUMENTATION_VERSION)
        .with_schema_url(semconv::SCHEMA_URL)
        .build()
}

fn instances_for(
    tracer_provider: &SdkTracerProvider,
    logger_provider: &SdkLoggerProvider,
    meter_provider: &SdkMeterProvider,
) -> OtelInstances {
    let scope = instrumentation_scope();
    OtelInstances {
        tracer: tracer_provider.tracer_with_scope(scope.clone()),
        logger_provider: logger_provider.clone(),
        logger_scope: scope.clone(),
        meter: meter_provider.meter_with_scope(scope),
    }
}

fn noop_instances() -> OtelInstances {
    // Providers without processors or readers accept emission and drop it.
    let tracer_provider = SdkTracerProvider::builder().build();
    let logger_provider = SdkLoggerProvider::builder().build();
    let meter_provider = SdkMeterProvider::builder().build();
    instances_for(&tracer_provider, &logger_provider, &meter_provider)
}

/// Returns the current tracer. The result should not be cached unless the
/// caller is certain telemetry has been started.
pub fn tracer() -> SdkTracer {
    instances_cell().load().tracer.clone()
}

/// Returns the current logger. The result should not be cached unless the
/// caller is certain telemetry has been started.
pub fn logger() -> SdkLogger {
    let instances = instances_cell().load();
    instances
        .logger_provider
        .logger_with_scope(instances.logger_scope.clone())
}

/// Returns the current meter. The result should not be cached unless the
/// caller is certain telemetry has been started.
pub fn meter() -> Meter {
    instances_cell().load().meter.clone()
}

/// Installs the provider configuration. Must be called before [`start`].
pub(crate) fn set_config(config: OtelConfig) {
    let _guard = WRITE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    config_cell().store(Some(Arc::new(config)));
}

/// Installs a fetched sampling configuration on the shared export sampler.
/// Invalid regex patterns are logged and their rule components will never
/// match; everything else takes effect for the next exported batch.
pub fn set_sampling_config(config: SamplingConfig) {
    let sampler = export_sampler();
    for (pattern, err) in sampler.warm_regex_cache(&config) {
        ld_error!("invalid regex {pattern:?} in sampling config: {err}");
    }
    sampler.set_config(Some(config));
}

fn otlp_endpoint_base(endpoint: &str) -> Result<&str> {
    // http means insecure transport, https means TLS. Anything else is a
    // configuration error.
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/'))
    } else {
        Err(Error::InvalidOtlpEndpoint(endpoint.to_string()))
    }
}

/// Starts the telemetry providers from the installed configuration.
///
/// Under ideal use this is called once at startup; calling it while
/// providers are already active is a no-op. [`shutdown`] should be called
/// when the application exits to ensure delivery of pending telemetry.
pub fn start() -> Result<()> {
    let _guard = WRITE_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    if active_cell().load().is_some() {
        return Ok(());
    }

    let Some(config) = config_cell().load_full() else {
        ld_error!("start called before the observability plugin was configured");
        return Err(Error::MissingConfig);
    };

    // A previous generation may still exist on the start-after-shutdown
    // path; flush and retire it before installing the replacement.
    shutdown_providers();

    let endpoint = match otlp_endpoint_base(&config.otlp_endpoint) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            ld_error!("{err}");
            return Err(err);
        }
    };

    let resource = Resource::builder()
        .with_detectors(&[
            Box::new(HostResourceDetector::default()) as Box<dyn ResourceDetector>,
            Box::new(OsResourceDetector),
            Box::new(ProcessResourceDetector),
        ])
        .with_attributes(config.resource_attributes.iter().cloned())
        .build();

    let sampler = Arc::clone(export_sampler());

    // One gzip-encoding client is shared by all three exporters.
    let http_client = GzipHttpClient::new();

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_http_client(http_client.clone())
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(format!("{endpoint}/v1/traces"))
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .map_err(|e| Error::ExporterBuild(e.to_string()))?;
    let span_processor =
        BatchSpanProcessor::builder(SamplingSpanExporter::new(span_exporter, sampler.clone()))
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_scheduled_delay(SPAN_BATCH_DELAY)
                    .with_max_export_batch_size(config.span_max_export_batch_size)
                    .with_max_queue_size(config.span_max_queue_size)
                    .build(),
            )
            .build();
    let mut tracer_provider_builder = SdkTracerProvider::builder()
        .with_span_processor(span_processor)
        .with_resource(resource.clone());
    if let Some(head_sampler) = config.head_sampler.clone() {
        tracer_provider_builder = tracer_provider_builder.with_sampler(head_sampler);
    }
    let tracer_provider = tracer_provider_builder.build();

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_http()
        .with_http_client(http_client.clone())
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(format!("{endpoint}/v1/logs"))
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .map_err(|e| Error::ExporterBuild(e.to_string()))?;
    let log_processor =
        BatchLogProcessor::builder(SamplingLogExporter::new(log_exporter, sampler))
            .with_batch_config(
                opentelemetry_sdk::logs::BatchConfigBuilder::default()
                    .with_max_export_batch_size(config.log_max_export_batch_size)
                    .with_max_queue_size(config.log_max_queue_size)
                    .build(),
            )
            .build();
    let logger_provider = SdkLoggerProvider::builder()
        .with_log_processor(log_processor)
        .with_resource(resource.clone())
        .build();

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_http_client(http_client)
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(format!("{endpoint}/v1/metrics"))
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .map_err(|e| Error::ExporterBuild(e.to_string()))?;
    let meter_provider = SdkMeterProvider::builder()
        .with_reader(
            PeriodicReader::builder(metric_exporter)
                .with_interval(METRIC_EXPORT_INTERVAL)
                .build(),
        )
        .with_resource(resource)
        .build();

    let propagator = TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]);
    global::set_text_map_propagator(propagator);

    let instances = instances_for(&tracer_provider, &logger_provider, &meter_provider);

    global::set_tracer_provider(tracer_provider.clone());
    global::set_meter_provider(meter_provider.clone());

    active_cell().store(Some(Arc::new(ProviderInstances {
        tracer_provider,
        logger_provider,
        meter_provider,
    })));
    instances_cell().store(Arc::new(instances));

    Ok(())
}

/// Flushes pending telemetry and shuts the providers down.
///
/// Safe to call from multiple threads; only the first call per generation
/// does any work.
pub fn shutdown() {
    let _guard = WRITE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    shutdown_providers();
}

fn shutdown_providers() {
    let Some(active) = active_cell().swap(None) else {
        return;
    };

    // Emission keeps working against no-op providers while the old
    // generation drains.
    instances_cell().store(Arc::new(noop_instances()));

    if let Err(err) = active.tracer_provider.force_flush() {
        ld_error!("failed to flush tracer provider: {err}");
    }
    if let Err(err) = active.tracer_provider.shutdown() {
        ld_error!("failed to shut down tracer provider: {err}");
    }

    if let Err(err) = active.logger_provider.force_flush() {
        ld_error!("failed to flush logger provider: {err}");
    }
    if let Err(err) = active.logger_provider.shutdown() {
        ld_error!("failed to shut down logger provider: {err}");
    }

    if let Err(err) = active.meter_provider.force_flush() {
        ld_error!("failed to flush meter provider: {err}");
    }
    if let Err(err) = active.meter_provider.shutdown() {
        ld_error!("failed to shut down meter provider: {err}");
    }
}
