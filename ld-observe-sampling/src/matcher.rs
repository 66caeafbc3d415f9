// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use opentelemetry::logs::AnyValue;
use opentelemetry::{Array, Key, Value};
use regex::Regex;

use crate::match_config::{MatchConfig, MatchValue};

/// Process-scoped cache of compiled regex patterns.
///
/// Entries are immutable once inserted and never evicted; a new rule set
/// referencing new patterns only ever adds entries. Failed compilations are
/// cached too, so a bad pattern is compiled (and can be reported) at most
/// once per process.
#[derive(Debug, Default)]
pub(crate) struct RegexCache {
    cache: RwLock<HashMap<String, Option<Arc<Regex>>>>,
}

impl RegexCache {
    /// Returns the compiled regex for `pattern`, compiling and caching it on
    /// first use. Returns `None` when the pattern does not compile.
    fn get(&self, pattern: &str) -> Option<Arc<Regex>> {
        if let Some(entry) = self.cache.read().unwrap().get(pattern) {
            return entry.clone();
        }

        let mut cache = self.cache.write().unwrap();
        // Between dropping the read lock and acquiring the write lock another
        // thread may have compiled the same pattern.
        if let Some(entry) = cache.get(pattern) {
            return entry.clone();
        }

        let compiled = Regex::new(pattern).ok().map(Arc::new);
        cache.insert(pattern.to_string(), compiled.clone());
        compiled
    }

    /// Compiles `pattern` into the cache. Returns the compile error only when
    /// this call is the one that discovered it, so callers can report each
    /// bad pattern exactly once.
    fn compile(&self, pattern: &str) -> Option<regex::Error> {
        if self.cache.read().unwrap().contains_key(pattern) {
            return None;
        }

        let mut cache = self.cache.write().unwrap();
        if cache.contains_key(pattern) {
            return None;
        }

        match Regex::new(pattern) {
            Ok(compiled) => {
                cache.insert(pattern.to_string(), Some(Arc::new(compiled)));
                None
            }
            Err(err) => {
                cache.insert(pattern.to_string(), None);
                Some(err)
            }
        }
    }
}

/// Evaluates [`MatchConfig`] predicates against the concrete value shapes
/// that appear on spans and log records.
#[derive(Debug, Default)]
pub(crate) struct Matcher {
    regexes: RegexCache,
}

impl Matcher {
    /// Compiles `pattern` into the shared cache, reporting the error only on
    /// the first failed attempt.
    pub(crate) fn compile_pattern(&self, pattern: &str) -> Option<regex::Error> {
        self.regexes.compile(pattern)
    }

    /// Matches a span or event attribute value.
    pub(crate) fn matches_attribute_value(&self, config: &MatchConfig, value: &Value) -> bool {
        match config {
            MatchConfig::Empty => false,
            MatchConfig::Literal(expected) => literal_matches_attribute_value(value, expected),
            MatchConfig::Regex(pattern) => match value {
                Value::String(value) => self.regex_matches(pattern, value.as_str()),
                // Regexes apply to strings only; everything else never matches.
                _ => false,
            },
        }
    }

    /// Matches an attribute key. Keys compare as strings.
    pub(crate) fn matches_key(&self, config: &MatchConfig, key: &Key) -> bool {
        self.matches_str(config, key.as_str())
    }

    /// Matches a plain string, such as a span name or log severity text.
    pub(crate) fn matches_str(&self, config: &MatchConfig, value: &str) -> bool {
        match config {
            MatchConfig::Empty => false,
            MatchConfig::Literal(MatchValue::String(expected)) => expected == value,
            MatchConfig::Literal(_) => false,
            MatchConfig::Regex(pattern) => self.regex_matches(pattern, value),
        }
    }

    /// Matches a log attribute or body value.
    pub(crate) fn matches_log_value(&self, config: &MatchConfig, value: &AnyValue) -> bool {
        match config {
            MatchConfig::Empty => false,
            MatchConfig::Literal(expected) => literal_matches_log_value(value, expected),
            MatchConfig::Regex(pattern) => match value {
                AnyValue::String(value) => self.regex_matches(pattern, value.as_str()),
                _ => false,
            },
        }
    }

    fn regex_matches(&self, pattern: &str, value: &str) -> bool {
        match self.regexes.get(pattern) {
            Some(regex) => regex.is_match(value),
            // An invalid pattern never matches.
            None => false,
        }
    }
}

fn literal_matches_attribute_value(value: &Value, expected: &MatchValue) -> bool {
    match (value, expected) {
        (Value::Bool(value), MatchValue::Bool(expected)) => value == expected,
        (Value::I64(value), MatchValue::Int(expected)) => value == expected,
        (Value::F64(value), MatchValue::Float(expected)) => value == expected,
        (Value::String(value), MatchValue::String(expected)) => value.as_str() == expected,
        (Value::Array(Array::Bool(values)), MatchValue::List(expected)) => {
            values.len() == expected.len()
                && values
                    .iter()
                    .zip(expected)
                    .all(|(value, expected)| matches!(expected, MatchValue::Bool(e) if e == value))
        }
        (Value::Array(Array::I64(values)), MatchValue::List(expected)) => {
            values.len() == expected.len()
                && values
                    .iter()
                    .zip(expected)
                    .all(|(value, expected)| matches!(expected, MatchValue::Int(e) if e == value))
        }
        (Value::Array(Array::F64(values)), MatchValue::List(expected)) => {
            values.len() == expected.len()
                && values
                    .iter()
                    .zip(expected)
                    .all(|(value, expected)| matches!(expected, MatchValue::Float(e) if e == value))
        }
        (Value::Array(Array::String(values)), MatchValue::List(expected)) => {
            values.len() == expected.len()
                && values.iter().zip(expected).all(|(value, expected)| {
                    matches!(expected, MatchValue::String(e) if e == value.as_str())
                })
        }
        _ => false,
    }
}

fn literal_matches_log_value(value: &AnyValue, expected: &MatchValue) -> bool {
    match (value, expected) {
        (AnyValue::Boolean(value), MatchValue::Bool(expected)) => value == expected,
        (AnyValue::Int(value), MatchValue::Int(expected)) => value == expected,
        (AnyValue::Double(value), MatchValue::Float(expected)) => value == expected,
        (AnyValue::String(value), MatchValue::String(expected)) => value.as_str() == expected,
        (AnyValue::ListAny(values), MatchValue::List(expected)) => {
            values.len() == expected.len()
                && values
                    .iter()
                    .zip(expected)
                    .all(|(value, expected)| literal_matches_log_value(value, expected))
        }
        _ => false,
    }
}
