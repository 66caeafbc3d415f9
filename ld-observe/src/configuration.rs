// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use opentelemetry::trace::SpanKind;
use tokio_util::sync::CancellationToken;

/// Default URL used to fetch the per-project sampling configuration.
pub const DEFAULT_BACKEND_URL: &str = "https://pub.observability.app.launchdarkly.com";

/// Default OTLP/HTTP endpoint telemetry is exported to.
pub const DEFAULT_OTLP_ENDPOINT: &str = "https://otel.observability.app.launchdarkly.com:4318";

/// Default maximum batch and queue sizes for the span and log batch
/// processors. The backend favors large batches, so the defaults are
/// effectively unbounded.
pub const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 1024 * 1024;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
/// Configuration for the observability plugin.
///
/// This represents the finalized configuration, captured once when the plugin
/// is constructed. Use [`ObservabilityConfig::builder`] to customize it.
pub struct ObservabilityConfig {
    // # Service tagging
    service_name: String,
    service_version: String,
    environment: String,

    // # Endpoints
    /// URL the sampling configuration is fetched from
    backend_url: String,
    /// OTLP/HTTP endpoint for traces, logs and metrics
    otlp_endpoint: String,

    // # Lifecycle
    /// When set, `start` must be called explicitly
    manual_start: bool,
    /// Enables the internal console logger at debug level
    debug: bool,
    /// Cancelling this token shuts the plugin down
    cancellation: Option<CancellationToken>,

    // # Head sampling
    /// Per-span-kind trace-id ratio rates
    sampling_rates: Vec<(SpanKind, f64)>,
    /// Fallback rate for kinds without an explicit rate
    default_sampling_rate: Option<f64>,

    // # Batching
    span_max_export_batch_size: usize,
    span_max_queue_size: usize,
    log_max_export_batch_size: usize,
    log_max_queue_size: usize,
}

impl ObservabilityConfig {
    pub fn builder() -> ObservabilityConfigBuilder {
        ObservabilityConfigBuilder {
            config: ObservabilityConfig::default(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn otlp_endpoint(&self) -> &str {
        &self.otlp_endpoint
    }

    pub fn manual_start(&self) -> bool {
        self.manual_start
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn sampling_rates(&self) -> &[(SpanKind, f64)] {
        &self.sampling_rates
    }

    pub fn default_sampling_rate(&self) -> Option<f64> {
        self.default_sampling_rate
    }

    /// True when any head sampling rate was configured.
    pub fn has_sampling_rates(&self) -> bool {
        !self.sampling_rates.is_empty() || self.default_sampling_rate.is_some()
    }

    pub fn span_max_export_batch_size(&self) -> usize {
        self.span_max_export_batch_size
    }

    pub fn span_max_queue_size(&self) -> usize {
        self.span_max_queue_size
    }

    pub fn log_max_export_batch_size(&self) -> usize {
        self.log_max_export_batch_size
    }

    pub fn log_max_queue_size(&self) -> usize {
        self.log_max_queue_size
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            service_name: String::new(),
            service_version: String::new(),
            environment: String::new(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            manual_start: false,
            debug: false,
            cancellation: None,
            sampling_rates: Vec::new(),
            default_sampling_rate: None,
            span_max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            span_max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            log_max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            log_max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

/// Builder for [`ObservabilityConfig`]
pub struct ObservabilityConfigBuilder {
    config: ObservabilityConfig,
}

impl ObservabilityConfigBuilder {
    /// Sets the `service.name` resource attribute.
    pub fn set_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.config.service_name = service_name.into();
        self
    }

    /// Sets the `service.version` resource attribute.
    pub fn set_service_version(mut self, service_version: impl Into<String>) -> Self {
        self.config.service_version = service_version.into();
        self
    }

    /// Sets the deployment environment resource attribute.
    pub fn set_environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    /// Overrides the URL the sampling configuration is fetched from.
    pub fn set_backend_url(mut self, backend_url: impl Into<String>) -> Self {
        self.config.backend_url = backend_url.into();
        self
    }

    /// Overrides the OTLP/HTTP endpoint.
    pub fn set_otlp_endpoint(mut self, otlp_endpoint: impl Into<String>) -> Self {
        self.config.otlp_endpoint = otlp_endpoint.into();
        self
    }

    /// Defers telemetry startup until `start` is called explicitly.
    pub fn set_manual_start(mut self, manual_start: bool) -> Self {
        self.config.manual_start = manual_start;
        self
    }

    /// Enables the internal console logger.
    pub fn set_debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Supplies a cancellation token; when it is cancelled the plugin shuts
    /// down and flushes pending telemetry.
    pub fn set_cancellation(mut self, token: CancellationToken) -> Self {
        self.config.cancellation = Some(token);
        self
    }

    /// Sets the head sampling rate for one span kind. `rate` is clamped
    /// between 0.0 and 1.0 inclusive.
    pub fn set_sampling_rate(mut self, kind: SpanKind, rate: f64) -> Self {
        self.config.sampling_rates.push((kind, rate.clamp(0.0, 1.0)));
        self
    }

    /// Sets the head sampling rate applied to span kinds without an explicit
    /// rate. Without it, kinds without a rate are always sampled.
    pub fn set_default_sampling_rate(mut self, rate: f64) -> Self {
        self.config.default_sampling_rate = Some(rate.clamp(0.0, 1.0));
        self
    }

    pub fn set_span_max_export_batch_size(mut self, size: usize) -> Self {
        self.config.span_max_export_batch_size = size;
        self
    }

    pub fn set_span_max_queue_size(mut self, size: usize) -> Self {
        self.config.span_max_queue_size = size;
        self
    }

    pub fn set_log_max_export_batch_size(mut self, size: usize) -> Self {
        self.config.log_max_export_batch_size = size;
        self
    }

    pub fn set_log_max_queue_size(mut self, size: usize) -> Self {
        self.config.log_max_queue_size = size;
        self
    }

    pub fn build(self) -> ObservabilityConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.backend_url(), DEFAULT_BACKEND_URL);
        assert_eq!(config.otlp_endpoint(), DEFAULT_OTLP_ENDPOINT);
        assert!(!config.manual_start());
        assert!(!config.debug());
        assert!(!config.has_sampling_rates());
        assert_eq!(
            config.span_max_export_batch_size(),
            DEFAULT_MAX_EXPORT_BATCH_SIZE
        );
        assert_eq!(config.log_max_queue_size(), DEFAULT_MAX_QUEUE_SIZE);
    }

    #[test]
    fn test_builder() {
        let config = ObservabilityConfig::builder()
            .set_service_name("checkout")
            .set_service_version("1.2.3")
            .set_environment("production")
            .set_otlp_endpoint("http://localhost:4318")
            .set_manual_start(true)
            .set_sampling_rate(SpanKind::Server, 0.5)
            .set_span_max_queue_size(2048)
            .build();

        assert_eq!(config.service_name(), "checkout");
        assert_eq!(config.service_version(), "1.2.3");
        assert_eq!(config.environment(), "production");
        assert_eq!(config.otlp_endpoint(), "http://localhost:4318");
        assert!(config.manual_start());
        assert_eq!(config.sampling_rates(), &[(SpanKind::Server, 0.5)]);
        assert_eq!(config.span_max_queue_size(), 2048);
        assert_eq!(config.backend_url(), DEFAULT_BACKEND_URL);
    }

    #[test]
    fn test_sampling_rate_clamped() {
        let config = ObservabilityConfig::builder()
            .set_sampling_rate(SpanKind::Client, 1.5)
            .set_default_sampling_rate(-0.25)
            .build();

        assert_eq!(config.sampling_rates(), &[(SpanKind::Client, 1.0)]);
        assert_eq!(config.default_sampling_rate(), Some(0.0));
    }
}
