// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::RwLock;

use opentelemetry::trace::Event;
use opentelemetry::KeyValue;
use opentelemetry_sdk::logs::SdkLogRecord;
use opentelemetry_sdk::trace::SpanData;
use rand::Rng;

use crate::config::{
    AttributeMatchConfig, EventMatchConfig, LogSamplingConfig, SamplingConfig, SpanSamplingConfig,
};
use crate::matcher::Matcher;

/// Attribute recording the sampling ratio that admitted an exported item.
pub const SAMPLING_RATIO_ATTRIBUTE: &str = "launchdarkly.sampling.ratio";

/// The result of an export sampling decision.
#[derive(Debug, Clone, Default)]
pub struct SamplingResult {
    /// Whether the item should be exported.
    pub sample: bool,
    /// Additional attributes to attach to the item before export. Empty when
    /// no rule matched.
    pub attributes: Vec<KeyValue>,
}

impl SamplingResult {
    fn pass() -> Self {
        SamplingResult {
            sample: true,
            attributes: Vec::new(),
        }
    }
}

/// Decides, at export time, whether completed spans and log records are
/// shipped to the backend.
pub trait ExportSampler: Send + Sync {
    /// Samples a completed span.
    fn sample_span(&self, span: &SpanData) -> SamplingResult;
    /// Samples a log record.
    fn sample_log(&self, record: &SdkLogRecord) -> SamplingResult;
    /// True when at least one span or log rule is installed.
    fn is_sampling_enabled(&self) -> bool;
}

/// Function drawing a 1-in-`ratio` admission decision.
pub type SamplerFn = fn(i64) -> bool;

/// Default 1-in-N draw.
///
/// This function is not used for any purpose requiring cryptographic
/// security.
pub fn default_sampler(ratio: i64) -> bool {
    // A ratio of 1 means 1 in 1, which always samples; no need to draw a
    // random number. A ratio of 0 (or below) never samples.
    if ratio == 1 {
        return true;
    }
    if ratio <= 0 {
        return false;
    }

    // Any single value in [0, ratio) is drawn with probability 1 in ratio;
    // zero is in every such range.
    rand::rng().random_range(0..ratio) == 0
}

/// Export sampler driven by the remotely fetched sampling configuration.
///
/// The rule set is replaced wholesale by [`CustomSampler::set_config`];
/// in-flight sampling calls observe either the old or the new set, never a
/// mix. Matching itself takes the read side only.
pub struct CustomSampler {
    sampler: SamplerFn,
    config: RwLock<Option<SamplingConfig>>,
    matcher: Matcher,
}

impl Default for CustomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomSampler {
    pub fn new() -> Self {
        Self::with_sampler(default_sampler)
    }

    /// Creates a sampler with an injected draw function. Tests use this to
    /// force deterministic outcomes.
    pub fn with_sampler(sampler: SamplerFn) -> Self {
        CustomSampler {
            sampler,
            config: RwLock::new(None),
            matcher: Matcher::default(),
        }
    }

    /// Installs a new rule set, replacing the previous one atomically.
    pub fn set_config(&self, config: Option<SamplingConfig>) {
        *self.config.write().unwrap() = config;
    }

    /// Compiles every regex referenced by `config` into the cache, returning
    /// the patterns that failed. Each pattern is reported at most once per
    /// process, no matter how many rule sets reference it.
    pub fn warm_regex_cache(&self, config: &SamplingConfig) -> Vec<(String, regex::Error)> {
        config
            .regex_patterns()
            .into_iter()
            .filter_map(|pattern| {
                self.matcher
                    .compile_pattern(pattern)
                    .map(|err| (pattern.to_string(), err))
            })
            .collect()
    }

    /// Every entry in `configs` must match some attribute in `attributes`.
    fn matches_attributes(
        &self,
        configs: &[AttributeMatchConfig],
        attributes: &[KeyValue],
    ) -> bool {
        if configs.is_empty() {
            return true;
        }
        if attributes.is_empty() {
            return false;
        }

        configs.iter().all(|config| {
            attributes.iter().any(|attr| {
                self.matcher.matches_key(&config.key, &attr.key)
                    && self
                        .matcher
                        .matches_attribute_value(&config.attribute, &attr.value)
            })
        })
    }

    fn matches_event(&self, config: &EventMatchConfig, event: &Event) -> bool {
        if !config.name.is_empty() && !self.matcher.matches_str(&config.name, &event.name) {
            return false;
        }
        self.matches_attributes(&config.attributes, &event.attributes)
    }

    /// Every event config must be satisfied by at least one event.
    fn matches_events(&self, configs: &[EventMatchConfig], events: &[Event]) -> bool {
        configs.iter().all(|config| {
            events.iter().any(|event| self.matches_event(config, event))
        })
    }

    fn matches_span_config(&self, config: &SpanSamplingConfig, span: &SpanData) -> bool {
        if !config.name.is_empty() && !self.matcher.matches_str(&config.name, &span.name) {
            return false;
        }
        if !self.matches_attributes(&config.attributes, &span.attributes) {
            return false;
        }
        self.matches_events(&config.events, &span.events.events)
    }

    fn matches_log_config(&self, config: &LogSamplingConfig, record: &SdkLogRecord) -> bool {
        if !config.severity_text.is_empty()
            && !self
                .matcher
                .matches_str(&config.severity_text, record.severity_text().unwrap_or(""))
        {
            return false;
        }

        // The message is only tested when the body is a string.
        if !config.message.is_empty() {
            if let Some(body @ opentelemetry::logs::AnyValue::String(_)) = record.body() {
                if !self.matcher.matches_log_value(&config.message, body) {
                    return false;
                }
            }
        }

        // Every attribute config must match some attribute on the record; a
        // record without attributes cannot satisfy a non-empty config list.
        config.attributes.iter().all(|attr_config| {
            record.attributes_iter().any(|(key, value)| {
                self.matcher.matches_key(&attr_config.key, key)
                    && self.matcher.matches_log_value(&attr_config.attribute, value)
            })
        })
    }

    fn sampled(&self, ratio: i64) -> SamplingResult {
        SamplingResult {
            sample: (self.sampler)(ratio),
            attributes: vec![KeyValue::new(SAMPLING_RATIO_ATTRIBUTE, ratio)],
        }
    }
}

impl ExportSampler for CustomSampler {
    fn sample_span(&self, span: &SpanData) -> SamplingResult {
        let config = self.config.read().unwrap();

        if let Some(config) = config.as_ref() {
            for rule in &config.spans {
                if self.matches_span_config(rule, span) {
                    return self.sampled(rule.sampling_ratio);
                }
            }
        }

        // Didn't match any rule, or there were no rules: export it.
        SamplingResult::pass()
    }

    fn sample_log(&self, record: &SdkLogRecord) -> SamplingResult {
        let config = self.config.read().unwrap();

        if let Some(config) = config.as_ref() {
            for rule in &config.logs {
                if self.matches_log_config(rule, record) {
                    return self.sampled(rule.sampling_ratio);
                }
            }
        }

        SamplingResult::pass()
    }

    fn is_sampling_enabled(&self) -> bool {
        match self.config.read().unwrap().as_ref() {
            Some(config) => !config.spans.is_empty() || !config.logs.is_empty(),
            None => false,
        }
    }
}
