// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use opentelemetry::trace::SpanId;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use opentelemetry_sdk::Resource;

use ld_observe_sampling::ExportSampler;

/// Span exporter applying the export sampler to each batch before handing
/// the survivors to the wrapped wire exporter.
///
/// Children of spans dropped by the sampler are removed from the same batch,
/// so a trace never contains a child whose parent was sampled away. This is
/// exact within one batch and best effort across batches: a span whose
/// parent was dropped in an earlier batch cannot be retracted. Callers
/// needing strict coherence should size the batch processor so parents and
/// children coalesce.
pub struct SamplingSpanExporter<E> {
    inner: E,
    sampler: Arc<dyn ExportSampler>,
}

impl<E> fmt::Debug for SamplingSpanExporter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingSpanExporter").finish()
    }
}

impl<E: SpanExporter> SamplingSpanExporter<E> {
    pub fn new(inner: E, sampler: Arc<impl ExportSampler + 'static>) -> Self {
        SamplingSpanExporter {
            inner,
            sampler,
        }
    }

    fn sample_batch(&self, batch: Vec<SpanData>) -> Vec<SpanData> {
        let mut children_by_parent: HashMap<SpanId, Vec<SpanId>> = HashMap::new();
        let mut survivors: HashMap<SpanId, SpanData> = HashMap::with_capacity(batch.len());
        let mut omitted: VecDeque<SpanId> = VecDeque::new();

        // First pass: sample every span directly, decorating admitted spans
        // with the ratio that admitted them, and index children by parent so
        // the tree can be walked without rescanning the batch.
        for span in batch {
            let span_id = span.span_context.span_id();
            if span.parent_span_id != SpanId::INVALID {
                children_by_parent
                    .entry(span.parent_span_id)
                    .or_default()
                    .push(span_id);
            }

            let result = self.sampler.sample_span(&span);
            if result.sample {
                survivors.insert(span_id, with_attributes(span, result.attributes));
            } else {
                omitted.push_back(span_id);
            }
        }

        // Remove all descendants of dropped spans, transitively. Each
        // parent's edge list is consumed once, which also bounds the walk on
        // malformed batches containing cycles.
        while let Some(span_id) = omitted.pop_front() {
            if let Some(children) = children_by_parent.remove(&span_id) {
                for child in children {
                    survivors.remove(&child);
                    omitted.push_back(child);
                }
            }
        }

        survivors.into_values().collect()
    }
}

/// Returns the span with `attributes` appended. The batch owns its spans, so
/// admitted spans without added attributes pass through untouched.
fn with_attributes(mut span: SpanData, attributes: Vec<opentelemetry::KeyValue>) -> SpanData {
    span.attributes.extend(attributes);
    span
}

impl<E: SpanExporter> SpanExporter for SamplingSpanExporter<E> {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        if !self.sampler.is_sampling_enabled() {
            return self.inner.export(batch).await;
        }
        let survivors = self.sample_batch(batch);
        self.inner.export(survivors).await
    }

    fn shutdown(&mut self) -> OTelSdkResult {
        self.inner.shutdown()
    }

    fn force_flush(&mut self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::sync::Mutex;

    use opentelemetry::trace::{SpanContext, SpanKind, Status, TraceFlags, TraceId, TraceState};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::trace::{SpanEvents, SpanLinks};

    use ld_observe_sampling::{CustomSampler, SamplingConfig, SAMPLING_RATIO_ATTRIBUTE};

    #[derive(Debug, Clone, Default)]
    struct TestSpanExporter {
        exported: Arc<Mutex<Vec<SpanData>>>,
    }

    impl TestSpanExporter {
        fn exported(&self) -> Vec<SpanData> {
            self.exported.lock().unwrap().clone()
        }
    }

    impl SpanExporter for TestSpanExporter {
        async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
            self.exported.lock().unwrap().extend(batch);
            Ok(())
        }
    }

    fn never_sampler(_ratio: i64) -> bool {
        false
    }

    fn always_sampler(_ratio: i64) -> bool {
        true
    }

    fn make_span(name: &'static str, span_id: u64, parent_span_id: u64) -> SpanData {
        let parent_span_id = if parent_span_id == 0 {
            SpanId::INVALID
        } else {
            SpanId::from(parent_span_id)
        };
        SpanData {
            span_context: SpanContext::new(
                TraceId::from(1u128),
                SpanId::from(span_id),
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            ),
            parent_span_id,
            name: Cow::Borrowed(name),
            start_time: std::time::SystemTime::now(),
            end_time: std::time::SystemTime::now(),
            attributes: vec![],
            events: SpanEvents::default(),
            links: SpanLinks::default(),
            status: Status::Unset,
            dropped_attributes_count: 0,
            span_kind: SpanKind::Internal,
            instrumentation_scope: opentelemetry::InstrumentationScope::default(),
        }
    }

    fn name_rule(name: &str, ratio: i64) -> SamplingConfig {
        serde_json::from_str(&format!(
            r#"{{"spans": [{{"name": {{"matchValue": "{name}"}}, "samplingRatio": {ratio}}}]}}"#
        ))
        .unwrap()
    }

    fn exporter_with(
        sampler_fn: ld_observe_sampling::SamplerFn,
        config: Option<SamplingConfig>,
    ) -> (SamplingSpanExporter<TestSpanExporter>, TestSpanExporter) {
        let inner = TestSpanExporter::default();
        let sampler = Arc::new(CustomSampler::with_sampler(sampler_fn));
        sampler.set_config(config);
        (SamplingSpanExporter::new(inner.clone(), sampler), inner)
    }

    fn ratio_attribute(span: &SpanData) -> Option<i64> {
        span.attributes.iter().find_map(|kv| {
            if kv.key.as_str() == SAMPLING_RATIO_ATTRIBUTE {
                match kv.value {
                    opentelemetry::Value::I64(ratio) => Some(ratio),
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

        exporter
            .export(vec![make_span("ping", 1, 0)])
            .await
            .unwrap();

        let exported = inner.exported();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].name, "ping");
        assert_eq!(ratio_attribute(&exported[0]), None);
    }

    #[tokio::test]
    async fn test_matching_span_sampled_in_carries_ratio() {
        let (exporter, inner) = exporter_with(always_sampler, Some(name_rule("test-span", 10)));

        exporter
            .export(vec![make_span("test-span", 1, 0)])
            .await
            .unwrap();

        let exported = inner.exported();
        assert_eq!(exported.len(), 1);
        assert_eq!(ratio_attribute(&exported[0]), Some(10));
    }

    #[tokio::test]
    async fn test_matching_span_sampled_out_is_dropped() {
        let (exporter, inner) = exporter_with(never_sampler, Some(name_rule("test-span", 10)));

        exporter
            .export(vec![make_span("test-span", 1, 0)])
            .await
            .unwrap();

        assert!(inner.exported().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_span_passes_without_ratio() {
        let (exporter, inner) = exporter_with(never_sampler, Some(name_rule("test-span", 10)));

        exporter
            .export(vec![make_span("other-span", 1, 0)])
            .await
            .unwrap();

        let exported = inner.exported();
        assert_eq!(exported.len(), 1);
        assert_eq!(ratio_attribute(&exported[0]), None);
    }

    #[tokio::test]
    async fn test_children_of_dropped_spans_are_removed() {
        let (exporter, inner) = exporter_with(never_sampler, Some(name_rule("parent", 10)));

        // parent matches the rule and is sampled out; child is its direct
        // child; bystander is unrelated and passes by default.
        let batch = vec![
            make_span("parent", 1, 0),
            make_span("child", 2, 1),
            make_span("bystander", 3, 0),
        ];
        exporter.export(batch).await.unwrap();

        let exported = inner.exported();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].name, "bystander");
    }

    #[tokio::test]
    async fn test_orphan_removal_is_transitive() {
        let (exporter, inner) = exporter_with(never_sampler, Some(name_rule("root", 10)));

        let batch = vec![
            make_span("root", 1, 0),
            make_span("child", 2, 1),
            make_span("grandchild", 3, 2),
            make_span("great-grandchild", 4, 3),
            make_span("other-root", 5, 0),
        ];
        exporter.export(batch).await.unwrap();

        let exported = inner.exported();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].name, "other-root");
    }

    #[tokio::test]
    async fn test_mixed_ratios_first_match_wins() {
        let config: SamplingConfig = serde_json::from_str(
            r#"{"spans": [
                {"name": {"matchValue": "a"}, "samplingRatio": 10},
                {"name": {"regexValue": "."}, "samplingRatio": 20}
            ]}"#,
        )
        .unwrap();
        let (exporter, inner) = exporter_with(always_sampler, Some(config));

        exporter
            .export(vec![make_span("a", 1, 0), make_span("b", 2, 0)])
            .await
            .unwrap();

        let exported = inner.exported();
        assert_eq!(exported.len(), 2);
        let ratio_of = |name: &str| {
            exported
                .iter()
                .find(|span| span.name == name)
                .and_then(ratio_attribute)
        };
        assert_eq!(ratio_of("a"), Some(10));
        assert_eq!(ratio_of("b"), Some(20));
    }

    #[tokio::test]
    async fn test_input_spans_are_not_mutated_when_unmatched() {
        let (exporter, inner) = exporter_with(always_sampler, Some(name_rule("matched", 5)));

        let mut unmatched = make_span("unmatched", 1, 0);
        unmatched.attributes = vec![KeyValue::new("kept", true)];
        exporter.export(vec![unmatched]).await.unwrap();

        let exported = inner.exported();
        assert_eq!(exported[0].attributes, vec![KeyValue::new("kept", true)]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (exporter, inner) = exporter_with(always_sampler, Some(name_rule("x", 1)));
        exporter.export(Vec::new()).await.unwrap();
        assert!(inner.exported().is_empty());
    }

    #[tokio::test]
    async fn test_cyclic_parent_ids_terminate() {
        // Malformed input: two spans claiming each other as parents, both
        // dropped. The walk must terminate and drop both.
        let config: SamplingConfig = serde_json::from_str(
            r#"{"spans": [{"name": {"regexValue": "^loop"}, "samplingRatio": 0}]}"#,
        )
        .unwrap();
        let (exporter, inner) = exporter_with(never_sampler, Some(config));

        let batch = vec![make_span("loop-a", 1, 2), make_span("loop-b", 2, 1)];
        exporter.export(batch).await.unwrap();

        assert!(inner.exported().is_empty());
    }
}
