// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors surfaced when starting the telemetry providers.
///
/// Emission-path failures are never surfaced through this type; they are
/// logged by the internal logger and swallowed.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// `start` was called before the plugin was configured.
    #[error("ensure the plugin is configured before calling start")]
    MissingConfig,

    /// The OTLP endpoint does not start with `http://` or `https://`.
    #[error("an invalid otlp endpoint was configured: {0}")]
    InvalidOtlpEndpoint(String),

    /// An OTLP exporter could not be constructed.
    #[error("creating OTLP exporter: {0}")]
    ExporterBuild(String),
}

pub type Result<T> = std::result::Result<T, Error>;
