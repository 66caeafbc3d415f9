// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;

use opentelemetry::logs::{AnyValue, LogRecord as _};
use opentelemetry::{InstrumentationScope, Value};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{LogBatch, LogExporter, SdkLogRecord};
use opentelemetry_sdk::Resource;

use ld_observe_sampling::ExportSampler;

/// Log exporter applying the export sampler to each batch before handing the
/// survivors to the wrapped wire exporter.
pub struct SamplingLogExporter<E> {
    inner: E,
    sampler: Arc<dyn ExportSampler>,
}

impl<E> fmt::Debug for SamplingLogExporter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingLogExporter").finish()
    }
}

impl<E: LogExporter> SamplingLogExporter<E> {
    pub fn new(inner: E, sampler: Arc<impl ExportSampler + 'static>) -> Self {
        SamplingLogExporter { inner, sampler }
    }
}

/// An admitted record: either the caller's record passed through untouched,
/// or a decorated clone carrying the sampling ratio. Cloning keeps callers
/// that retain references to the original record from observing mutation.
enum Admitted<'a> {
    Original((&'a SdkLogRecord, &'a InstrumentationScope)),
    Decorated(usize),
}

fn attribute_to_any_value(value: Value) -> AnyValue {
    match value {
        Value::Bool(value) => AnyValue::Boolean(value),
        Value::I64(value) => AnyValue::Int(value),
        Value::F64(value) => AnyValue::Double(value),
        Value::String(value) => AnyValue::String(value),
        other => AnyValue::String(other.to_string().into()),
    }
}

impl<E: LogExporter> LogExporter for SamplingLogExporter<E> {
    async fn export(&self, batch: LogBatch<'_>) -> OTelSdkResult {
        let mut admitted: Vec<Admitted<'_>> = Vec::new();
        let mut decorated: Vec<(SdkLogRecord, InstrumentationScope)> = Vec::new();

        for (record, scope) in batch.iter() {
            let result = self.sampler.sample_log(record);
            if !result.sample {
                continue;
            }
            if result.attributes.is_empty() {
                admitted.push(Admitted::Original((record, scope)));
            } else {
                let mut clone = record.clone();
                for attribute in result.attributes {
                    clone.add_attribute(attribute.key, attribute_to_any_value(attribute.value));
                }
                admitted.push(Admitted::Decorated(decorated.len()));
                decorated.push((clone, scope.clone()));
            }
        }

        let batch_data: Vec<(&SdkLogRecord, &InstrumentationScope)> = admitted
            .iter()
            .map(|entry| match entry {
                Admitted::Original(pair) => *pair,
                Admitted::Decorated(index) => {
                    let (record, scope) = &decorated[*index];
                    (record, scope)
                }
            })
            .collect();

        self.inner.export(LogBatch::new(&batch_data)).await
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use opentelemetry::logs::{Logger, LoggerProvider};
    use opentelemetry::Key;
    use opentelemetry_sdk::logs::SdkLoggerProvider;

    use ld_observe_sampling::{CustomSampler, SamplingConfig, SAMPLING_RATIO_ATTRIBUTE};

    #[derive(Debug, Clone, Default)]
    struct TestLogExporter {
        exported: Arc<Mutex<Vec<SdkLogRecord>>>,
    }

    impl TestLogExporter {
        fn exported(&self) -> Vec<SdkLogRecord> {
            self.exported.lock().unwrap().clone()
        }
    }

    impl LogExporter for TestLogExporter {
        async fn export(&self, batch: LogBatch<'_>) -> OTelSdkResult {
            let mut exported = self.exported.lock().unwrap();
            for (record, _scope) in batch.iter() {
                exported.push(record.clone());
            }
            Ok(())
        }
    }

    fn never_sampler(_ratio: i64) -> bool {
        false
    }

    fn always_sampler(_ratio: i64) -> bool {
        true
    }

    fn make_record(body: &str) -> SdkLogRecord {
        let provider = SdkLoggerProvider::builder().build();
        let mut record = provider.logger("test").create_log_record();
        record.set_body(AnyValue::String(body.to_string().into()));
        record
    }

    fn message_rule(message: &str, ratio: i64) -> SamplingConfig {
        serde_json::from_str(&format!(
            r#"{{"logs": [{{"message": {{"matchValue": "{message}"}}, "samplingRatio": {ratio}}}]}}"#
        ))
        .unwrap()
    }

    fn exporter_with(
        sampler_fn: ld_observe_sampling::SamplerFn,
        config: Option<SamplingConfig>,
    ) -> (SamplingLogExporter<TestLogExporter>, TestLogExporter) {
        let inner = TestLogExporter::default();
        let sampler = Arc::new(CustomSampler::with_sampler(sampler_fn));
        sampler.set_config(config);
        (SamplingLogExporter::new(inner.clone(), sampler), inner)
    }

    async fn export(
        exporter: &SamplingLogExporter<TestLogExporter>,
        records: Vec<SdkLogRecord>,
    ) {
        let scope = InstrumentationScope::default();
        let batch_data: Vec<(SdkLogRecord, InstrumentationScope)> = records
            .into_iter()
            .map(|record| (record, scope.clone()))
            .collect();
        let batch_refs: Vec<(&SdkLogRecord, &InstrumentationScope)> = batch_data
            .iter()
            .map(|(record, scope)| (record, scope))
            .collect();
        exporter
            .export(LogBatch::new(&batch_refs))
            .await
            .unwrap();
    }

    fn ratio_attribute(record: &SdkLogRecord) -> Option<i64> {
        record.attributes_iter().find_map(|(key, value)| {
            if key == &Key::new(SAMPLING_RATIO_ATTRIBUTE) {
                match value {
                    AnyValue::Int(ratio) => Some(*ratio),
                    _ => None,
                }
            } else {
                None
            }
        })
    }

    #[tokio::test]
    async fn test_no_sampling_config_exports_everything() {
        let (exporter, inner) = exporter_with(never_sampler, None);

        export(&exporter, vec![make_record("unmatched message")]).await;

        let exported = inner.exported();
        assert_eq!(exported.len(), 1);
        assert_eq!(ratio_attribute(&exported[0]), None);
    }

    #[tokio::test]
    async fn test_matching_record_sampled_in_carries_ratio() {
        let (exporter, inner) = exporter_with(always_sampler, Some(message_rule("test message", 1)));

        export(&exporter, vec![make_record("test message")]).await;

        let exported = inner.exported();
        assert_eq!(exported.len(), 1);
        assert_eq!(ratio_attribute(&exported[0]), Some(1));
    }

    #[tokio::test]
    async fn test_matching_record_sampled_out_is_dropped() {
        let (exporter, inner) = exporter_with(never_sampler, Some(message_rule("test message", 1)));

        export(&exporter, vec![make_record("test message")]).await;

        assert!(inner.exported().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_batch_tags_only_matches() {
        let (exporter, inner) = exporter_with(always_sampler, Some(message_rule("test message", 1)));

        export(
            &exporter,
            vec![make_record("test message"), make_record("other")],
        )
        .await;

        let exported = inner.exported();
        assert_eq!(exported.len(), 2);

        let bodies_and_ratios: Vec<(Option<i64>, bool)> = exported
            .iter()
            .map(|record| {
                let is_test = matches!(
                    record.body(),
                    Some(AnyValue::String(body)) if body.as_str() == "test message"
                );
                (ratio_attribute(record), is_test)
            })
            .collect();

        assert!(bodies_and_ratios.contains(&(Some(1), true)));
        assert!(bodies_and_ratios.contains(&(None, false)));
    }

    #[tokio::test]
    async fn test_original_record_is_not_mutated() {
        let (exporter, _inner) = exporter_with(always_sampler, Some(message_rule("test message", 3)));

        let record = make_record("test message");
        export(&exporter, vec![record.clone()]).await;

        // The caller's record is untouched; only the exported clone carries
        // the ratio.
        assert_eq!(ratio_attribute(&record), None);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (exporter, inner) = exporter_with(always_sampler, Some(message_rule("x", 1)));
        export(&exporter, Vec::new()).await;
        assert!(inner.exported().is_empty());
    }
}
