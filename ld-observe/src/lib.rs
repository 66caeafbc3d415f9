// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Base crate for the LaunchDarkly observability plugin: the immutable
//! plugin configuration, the internal leveled logger, and the error types
//! shared across the workspace.

pub mod configuration;
pub use configuration::{
    ObservabilityConfig, ObservabilityConfigBuilder, DEFAULT_BACKEND_URL,
    DEFAULT_MAX_EXPORT_BATCH_SIZE, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_OTLP_ENDPOINT,
};

mod error;
pub use error::{Error, Result};

pub mod log;

/// Name reported as the telemetry distro and used for instrumentation scopes.
pub const INSTRUMENTATION_NAME: &str = "launchdarkly-observability";

/// Version reported as the telemetry distro version.
pub const INSTRUMENTATION_VERSION: &str = env!("CARGO_PKG_VERSION");
