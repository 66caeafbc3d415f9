// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

use crate::match_config::MatchConfig;

/// Matches one attribute on a span, event or log record: `key` selects the
/// attribute, `attribute` tests its value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeMatchConfig {
    pub key: MatchConfig,
    pub attribute: MatchConfig,
}

/// Matches one event on a span by name and attributes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventMatchConfig {
    pub name: MatchConfig,
    pub attributes: Vec<AttributeMatchConfig>,
}

/// A sampling rule for spans.
///
/// A span matches when its name satisfies `name` (unless empty), every entry
/// in `attributes` matches some attribute on the span, and every entry in
/// `events` matches some event on the span.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpanSamplingConfig {
    pub name: MatchConfig,
    pub attributes: Vec<AttributeMatchConfig>,
    pub events: Vec<EventMatchConfig>,
    pub sampling_ratio: i64,
}

/// A sampling rule for log records.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogSamplingConfig {
    pub severity_text: MatchConfig,
    pub message: MatchConfig,
    pub attributes: Vec<AttributeMatchConfig>,
    pub sampling_ratio: i64,
}

/// The full per-project sampling configuration, as fetched from the backend.
/// Rules are evaluated in declaration order; the first match wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingConfig {
    pub spans: Vec<SpanSamplingConfig>,
    pub logs: Vec<LogSamplingConfig>,
}

impl SamplingConfig {
    /// All regex patterns referenced by this configuration, in rule order.
    /// Used to warm the regex cache when a configuration is installed.
    pub fn regex_patterns(&self) -> Vec<&str> {
        fn visit<'a>(config: &'a MatchConfig, patterns: &mut Vec<&'a str>) {
            if let MatchConfig::Regex(pattern) = config {
                patterns.push(pattern);
            }
        }
        fn visit_attributes<'a>(configs: &'a [AttributeMatchConfig], patterns: &mut Vec<&'a str>) {
            for config in configs {
                visit(&config.key, patterns);
                visit(&config.attribute, patterns);
            }
        }

        let mut patterns = Vec::new();
        for span in &self.spans {
            visit(&span.name, &mut patterns);
            visit_attributes(&span.attributes, &mut patterns);
            for event in &span.events {
                visit(&event.name, &mut patterns);
                visit_attributes(&event.attributes, &mut patterns);
            }
        }
        for log in &self.logs {
            visit(&log.severity_text, &mut patterns);
            visit(&log.message, &mut patterns);
            visit_attributes(&log.attributes, &mut patterns);
        }
        patterns
    }
}
