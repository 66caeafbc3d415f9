// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::thread;

use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::{
    DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_NAME, SERVICE_VERSION, TELEMETRY_DISTRO_NAME,
    TELEMETRY_DISTRO_VERSION,
};

use ld_observe::log::{set_max_level, LogLevelFilter};
use ld_observe::{
    ld_error, ObservabilityConfig, INSTRUMENTATION_NAME, INSTRUMENTATION_VERSION,
};
use ld_observe_sampling::TraceSampler;

use crate::providers::{self, OtelConfig};
use crate::{graph, PROJECT_ID_ATTRIBUTE};

/// Metadata a host SDK hands to plugins when registering them.
#[derive(Debug, Clone)]
pub struct EnvironmentMetadata {
    /// The project SDK key; doubles as the backend project identifier.
    pub sdk_key: String,
}

/// The LaunchDarkly observability plugin.
///
/// Constructed from an [`ObservabilityConfig`] and either registered through
/// a host SDK, which calls [`ObservabilityPlugin::register`] with its
/// environment metadata, or started directly with [`pre_initialize`].
pub struct ObservabilityPlugin {
    config: ObservabilityConfig,
}

impl ObservabilityPlugin {
    pub fn new(config: ObservabilityConfig) -> Self {
        ObservabilityPlugin { config }
    }

    /// The name this plugin registers under.
    pub fn metadata(&self) -> &'static str {
        "launchdarkly-observability"
    }

    /// Registers the plugin: configures the telemetry providers, starts them
    /// unless manual start was requested, and kicks off the sampling
    /// configuration fetch.
    pub fn register(&self, metadata: &EnvironmentMetadata) {
        setup_otel(&metadata.sdk_key, self.config.clone());
    }
}

/// Initializes the observability plugin independently of a host SDK.
///
/// In most situations the plugin should be registered through the host SDK
/// instead. This function is provided for cases where the host SDK is not
/// readily available, or observability needs to come up earlier than it.
pub fn pre_initialize(sdk_key: &str, config: ObservabilityConfig) {
    setup_otel(sdk_key, config);
}

pub(crate) fn resource_attributes(sdk_key: &str, config: &ObservabilityConfig) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new(TELEMETRY_DISTRO_NAME, INSTRUMENTATION_NAME),
        KeyValue::new(TELEMETRY_DISTRO_VERSION, INSTRUMENTATION_VERSION),
        KeyValue::new(PROJECT_ID_ATTRIBUTE, sdk_key.to_string()),
    ];
    if !config.environment().is_empty() {
        attributes.push(KeyValue::new(
            DEPLOYMENT_ENVIRONMENT_NAME,
            config.environment().to_string(),
        ));
    }
    if !config.service_name().is_empty() {
        attributes.push(KeyValue::new(
            SERVICE_NAME,
            config.service_name().to_string(),
        ));
    }
    if !config.service_version().is_empty() {
        attributes.push(KeyValue::new(
            SERVICE_VERSION,
            config.service_version().to_string(),
        ));
    }
    attributes
}

fn setup_otel(sdk_key: &str, config: ObservabilityConfig) {
    if config.debug() {
        set_max_level(LogLevelFilter::Debug);
    }

    let head_sampler = config.has_sampling_rates().then(|| {
        TraceSampler::new(config.sampling_rates(), config.default_sampling_rate())
    });

    providers::set_config(OtelConfig {
        otlp_endpoint: config.otlp_endpoint().to_string(),
        resource_attributes: resource_attributes(sdk_key, &config),
        head_sampler,
        span_max_export_batch_size: config.span_max_export_batch_size(),
        span_max_queue_size: config.span_max_queue_size(),
        log_max_export_batch_size: config.log_max_export_batch_size(),
        log_max_queue_size: config.log_max_queue_size(),
    });

    if !config.manual_start() {
        if let Err(err) = providers::start() {
            ld_error!("failed to start otel: {err}");
        }
    }

    graph::spawn_sampling_config_fetch(
        config.backend_url().to_string(),
        sdk_key.to_string(),
    );

    if let Some(token) = config.cancellation().cloned() {
        spawn_cancellation_watcher(token);
    }
}

/// Waits for the supplied token on a background thread and shuts the
/// providers down when it fires.
fn spawn_cancellation_watcher(token: tokio_util::sync::CancellationToken) {
    let spawned = thread::Builder::new()
        .name("ld-observe-shutdown".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    ld_error!("failed to create shutdown watcher runtime: {err}");
                    return;
                }
            };
            runtime.block_on(token.cancelled());
            providers::shutdown();
        });

    if let Err(err) = spawned {
        ld_error!("failed to spawn shutdown watcher thread: {err}");
    }
}
