// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use opentelemetry::trace::{
    SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
};
use opentelemetry::Context;
use opentelemetry_sdk::trace::ShouldSample;

// Number of span kinds carrying an explicit bound slot.
const KIND_COUNT: usize = 5;

fn kind_index(kind: &SpanKind) -> usize {
    match kind {
        SpanKind::Internal => 0,
        SpanKind::Server => 1,
        SpanKind::Client => 2,
        SpanKind::Producer => 3,
        SpanKind::Consumer => 4,
    }
}

/// Head sampler applying a trace-id ratio per span kind.
///
/// A span whose parent is sampled is always sampled, keeping traces intact.
/// Root and unsampled-parent spans are compared against the bound for their
/// kind; kinds without an explicit rate fall back to the default rate, and
/// with no default at all they are always sampled, avoiding any per-span work
/// for unconfigured kinds.
#[derive(Clone)]
pub struct TraceSampler {
    trace_id_upper_bounds: [Option<u64>; KIND_COUNT],
    fallback_bound: Option<u64>,
}

impl fmt::Debug for TraceSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceSampler")
            .field("trace_id_upper_bounds", &self.trace_id_upper_bounds)
            .field("fallback_bound", &self.fallback_bound)
            .finish()
    }
}

fn bound_for_rate(rate: f64) -> u64 {
    (rate.clamp(0.0, 1.0) * (1u64 << 63) as f64) as u64
}

impl TraceSampler {
    /// Creates a sampler keeping each span kind at the provided fraction.
    /// `default_rate` applies to kinds without an explicit rate.
    pub fn new(rates: &[(SpanKind, f64)], default_rate: Option<f64>) -> Self {
        let mut bounds = [None; KIND_COUNT];
        for (kind, rate) in rates {
            bounds[kind_index(kind)] = Some(bound_for_rate(*rate));
        }
        TraceSampler {
            trace_id_upper_bounds: bounds,
            fallback_bound: default_rate.map(bound_for_rate),
        }
    }

    fn record_and_sample(trace_state: TraceState) -> SamplingResult {
        SamplingResult {
            decision: SamplingDecision::RecordAndSample,
            attributes: Vec::new(),
            trace_state,
        }
    }

    fn sample_by_bound(
        &self,
        trace_id: TraceId,
        span_kind: &SpanKind,
        trace_state: TraceState,
    ) -> SamplingResult {
        let Some(bound) = self.trace_id_upper_bounds[kind_index(span_kind)]
            .or(self.fallback_bound)
        else {
            return Self::record_and_sample(trace_state);
        };

        // The high 64 bits of the trace id, shifted into the non-negative
        // domain, give a uniform draw to compare against the bound.
        let x = upper_64_bits(trace_id) >> 1;
        let decision = if x < bound {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        };

        SamplingResult {
            decision,
            attributes: Vec::new(),
            trace_state,
        }
    }
}

fn upper_64_bits(trace_id: TraceId) -> u64 {
    let bytes = trace_id.to_bytes();
    u64::from_be_bytes(bytes[0..8].try_into().expect("trace id is 16 bytes"))
}

impl ShouldSample for TraceSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        _name: &str,
        span_kind: &SpanKind,
        _attributes: &[opentelemetry::KeyValue],
        _links: &[opentelemetry::trace::Link],
    ) -> SamplingResult {
        if let Some(parent_ctx) = parent_context.filter(|cx| cx.has_active_span()) {
            let span = parent_ctx.span();
            let parent_span_context = span.span_context();
            let trace_state = parent_span_context.trace_state().clone();

            // A sampled parent always keeps its children.
            if parent_span_context.is_sampled() {
                return Self::record_and_sample(trace_state);
            }
            return self.sample_by_bound(trace_id, span_kind, trace_state);
        }

        self.sample_by_bound(trace_id, span_kind, TraceState::default())
    }
}
