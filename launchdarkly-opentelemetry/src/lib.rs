// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OpenTelemetry distribution for the LaunchDarkly observability plugin.
//!
//! This crate wires the sampling engine from `ld-observe-sampling` into the
//! OpenTelemetry SDK: it owns the process-wide tracer/logger/meter cell, the
//! OTLP exporters with their sampling interposers, and the background fetch
//! of the per-project sampling configuration.
//!
//! # Usage
//! ```no_run
//! use ld_observe::ObservabilityConfig;
//! use launchdarkly_opentelemetry as ldotel;
//!
//! let config = ObservabilityConfig::builder()
//!     .set_service_name("checkout")
//!     .set_environment("production")
//!     .build();
//! ldotel::pre_initialize("my-sdk-key", config);
//!
//! let cx = ldotel::start_span(&opentelemetry::Context::current(), "charge-card", vec![]);
//! // ... do the work ...
//! ldotel::end_span(&cx);
//!
//! ldotel::shutdown();
//! ```

mod graph;
mod http_client;
mod log_exporter;
mod metrics;
mod plugin;
mod providers;
mod span_exporter;

use std::backtrace::Backtrace;
use std::borrow::Cow;

use opentelemetry::trace::{SpanKind, SpanRef, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::logs::SdkLogRecord;
use opentelemetry_semantic_conventions::attribute::{
    CODE_STACKTRACE, EXCEPTION_MESSAGE, EXCEPTION_STACKTRACE, EXCEPTION_TYPE,
};

pub use log_exporter::SamplingLogExporter;
pub use metrics::{record_count, record_histogram, record_metric};
pub use plugin::{pre_initialize, EnvironmentMetadata, ObservabilityPlugin};
pub use providers::{logger, meter, set_sampling_config, shutdown, start, tracer};
pub use span_exporter::SamplingSpanExporter;

/// Resource attribute carrying the backend project identifier.
pub const PROJECT_ID_ATTRIBUTE: &str = "highlight.project_id";

/// Name of the span created when an error is recorded outside any span.
pub const ERROR_SPAN_NAME: &str = "highlight.error";

/// Starts a new span as a child of the span in `cx` and returns a context
/// with the new span attached. End it with [`end_span`].
pub fn start_span(cx: &Context, name: impl Into<Cow<'static, str>>, tags: Vec<KeyValue>) -> Context {
    let tracer = providers::tracer();
    let span = tracer
        .span_builder(name)
        .with_attributes(tags)
        .start_with_context(&tracer, cx);
    cx.with_span(span)
}

/// Ends the span attached to `cx`, recording the call site's stack trace.
pub fn end_span(cx: &Context) {
    let span = cx.span();
    span.set_attribute(KeyValue::new(
        CODE_STACKTRACE,
        Backtrace::force_capture().to_string(),
    ));
    span.end();
}

/// Records `err` on the span attached to `cx`.
///
/// When no span in `cx` is recording, a dedicated error span is created,
/// recorded into and ended, so errors are never silently lost.
pub fn record_error<E>(cx: &Context, err: &E, tags: Vec<KeyValue>) -> Context
where
    E: std::error::Error + ?Sized,
{
    let span = cx.span();
    if span.is_recording() {
        record_span_error(&span, err, tags);
        return cx.clone();
    }
    drop(span);

    let tracer = providers::tracer();
    let error_span = tracer
        .span_builder(ERROR_SPAN_NAME)
        .with_kind(SpanKind::Internal)
        .with_attributes(tags.clone())
        .start_with_context(&tracer, cx);
    let cx = cx.with_span(error_span);
    record_span_error(&cx.span(), err, tags);
    end_span(&cx);
    cx
}

fn record_span_error<E>(span: &SpanRef<'_>, err: &E, tags: Vec<KeyValue>)
where
    E: std::error::Error + ?Sized,
{
    let mut attributes = vec![
        KeyValue::new(EXCEPTION_TYPE, std::any::type_name::<E>()),
        KeyValue::new(EXCEPTION_MESSAGE, err.to_string()),
        KeyValue::new(
            EXCEPTION_STACKTRACE,
            Backtrace::force_capture().to_string(),
        ),
    ];
    attributes.extend(tags);
    span.add_event("exception", attributes);
}

/// Creates an empty log record bound to the current logger. Fill it in and
/// emit it with [`record_log`].
pub fn new_log_record() -> SdkLogRecord {
    use opentelemetry::logs::Logger as _;
    providers::logger().create_log_record()
}

/// Emits a log record through the current logger.
pub fn record_log(record: SdkLogRecord) {
    use opentelemetry::logs::Logger as _;
    providers::logger().emit(record);
}
