// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

/// A literal value a rule can match against.
///
/// Scalars compare by kind: a string never matches an integer target, and
/// floats compare by equality. Lists match element-wise against same-kind
/// targets.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<MatchValue>),
}

/// A predicate over a single value.
///
/// On the wire this is an object with optional `matchValue` and `regexValue`
/// fields; a populated `matchValue` takes precedence over `regexValue`, and
/// an object with neither deserializes to [`MatchConfig::Empty`].
///
/// `Empty` matches nothing. Rules treat an `Empty` component as "skip this
/// component" before consulting the matcher, so an all-empty rule component
/// list still matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MatchConfig {
    #[default]
    Empty,
    Literal(MatchValue),
    Regex(String),
}

impl MatchConfig {
    pub fn is_empty(&self) -> bool {
        matches!(self, MatchConfig::Empty)
    }
}

/// Wire form of a match config, straight out of the GraphQL response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MatchParts {
    match_value: Option<serde_json::Value>,
    regex_value: Option<String>,
}

fn match_value_from_json(value: serde_json::Value) -> Option<MatchValue> {
    match value {
        serde_json::Value::Bool(value) => Some(MatchValue::Bool(value)),
        serde_json::Value::Number(value) => value
            .as_i64()
            .map(MatchValue::Int)
            .or_else(|| value.as_f64().map(MatchValue::Float)),
        serde_json::Value::String(value) => Some(MatchValue::String(value)),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(match_value_from_json)
            .collect::<Option<Vec<_>>>()
            .map(MatchValue::List),
        serde_json::Value::Null | serde_json::Value::Object(_) => None,
    }
}

impl From<MatchParts> for MatchConfig {
    fn from(parts: MatchParts) -> Self {
        if let Some(value) = parts.match_value.and_then(match_value_from_json) {
            return MatchConfig::Literal(value);
        }
        match parts.regex_value {
            Some(pattern) if !pattern.is_empty() => MatchConfig::Regex(pattern),
            _ => MatchConfig::Empty,
        }
    }
}

impl<'de> Deserialize<'de> for MatchConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // The backend sends `null` for unset match configs.
        let parts = Option::<MatchParts>::deserialize(deserializer)?;
        Ok(parts.map(MatchConfig::from).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MatchConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_null_and_empty() {
        assert_eq!(parse("null"), MatchConfig::Empty);
        assert_eq!(parse("{}"), MatchConfig::Empty);
        assert_eq!(
            parse(r#"{"matchValue": null, "regexValue": null}"#),
            MatchConfig::Empty
        );
        assert_eq!(parse(r#"{"regexValue": ""}"#), MatchConfig::Empty);
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(
            parse(r#"{"matchValue": "test-span"}"#),
            MatchConfig::Literal(MatchValue::String("test-span".to_string()))
        );
        assert_eq!(
            parse(r#"{"matchValue": 42}"#),
            MatchConfig::Literal(MatchValue::Int(42))
        );
        assert_eq!(
            parse(r#"{"matchValue": 0.5}"#),
            MatchConfig::Literal(MatchValue::Float(0.5))
        );
        assert_eq!(
            parse(r#"{"matchValue": true}"#),
            MatchConfig::Literal(MatchValue::Bool(true))
        );
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse(r#"{"matchValue": [1, 2, 3]}"#),
            MatchConfig::Literal(MatchValue::List(vec![
                MatchValue::Int(1),
                MatchValue::Int(2),
                MatchValue::Int(3),
            ]))
        );
    }

    #[test]
    fn test_parse_regex() {
        assert_eq!(
            parse(r#"{"regexValue": "^GET /health"}"#),
            MatchConfig::Regex("^GET /health".to_string())
        );
    }

    #[test]
    fn test_match_value_takes_precedence() {
        assert_eq!(
            parse(r#"{"matchValue": "exact", "regexValue": ".*"}"#),
            MatchConfig::Literal(MatchValue::String("exact".to_string()))
        );
    }
}
