// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sampling engine for the LaunchDarkly observability plugin.
//!
//! Two independent samplers live here. The [`TraceSampler`] is a head
//! sampler: it decides at span start whether a trace is recorded, using a
//! per-span-kind trace-id ratio. The [`CustomSampler`] is an export sampler:
//! it runs at export time against completed spans and log records, matching
//! them against remotely configured rules and admitting 1-in-N of the
//! matches.

pub(crate) mod config;
pub(crate) mod export_sampler;
pub(crate) mod match_config;
pub(crate) mod matcher;
pub(crate) mod trace_sampler;

// Re-export key public types
pub use config::{
    AttributeMatchConfig, EventMatchConfig, LogSamplingConfig, SamplingConfig, SpanSamplingConfig,
};
pub use export_sampler::{
    default_sampler, CustomSampler, ExportSampler, SamplerFn, SamplingResult,
    SAMPLING_RATIO_ATTRIBUTE,
};
pub use match_config::{MatchConfig, MatchValue};
pub use trace_sampler::TraceSampler;
