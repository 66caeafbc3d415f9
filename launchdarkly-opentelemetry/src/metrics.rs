// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use opentelemetry::metrics::{Counter, Gauge, Histogram};
use opentelemetry::KeyValue;

use crate::providers;

// Instrument handles are created through the active meter on first use and
// retained for the process lifetime. Lookups take the read side; only the
// first recording of a new name takes the write side.
static F64_GAUGES: OnceLock<RwLock<HashMap<String, Gauge<f64>>>> = OnceLock::new();
static F64_HISTOGRAMS: OnceLock<RwLock<HashMap<String, Histogram<f64>>>> = OnceLock::new();
static U64_COUNTERS: OnceLock<RwLock<HashMap<String, Counter<u64>>>> = OnceLock::new();

fn gauges() -> &'static RwLock<HashMap<String, Gauge<f64>>> {
    F64_GAUGES.get_or_init(|| RwLock::new(HashMap::new()))
}

fn histograms() -> &'static RwLock<HashMap<String, Histogram<f64>>> {
    F64_HISTOGRAMS.get_or_init(|| RwLock::new(HashMap::new()))
}

fn counters() -> &'static RwLock<HashMap<String, Counter<u64>>> {
    U64_COUNTERS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Records a gauge value. The backend graphs these in the context of the
/// active session and trace.
pub fn record_metric(name: &str, value: f64, tags: &[KeyValue]) {
    let gauge = lookup(gauges(), name, || {
        providers::meter().f64_gauge(name.to_string()).build()
    });
    gauge.record(value, tags);
}

/// Records a histogram sample, such as the latency of a database query.
pub fn record_histogram(name: &str, value: f64, tags: &[KeyValue]) {
    let histogram = lookup(histograms(), name, || {
        providers::meter().f64_histogram(name.to_string()).build()
    });
    histogram.record(value, tags);
}

/// Adds to a monotonic counter.
pub fn record_count(name: &str, value: u64, tags: &[KeyValue]) {
    let counter = lookup(counters(), name, || {
        providers::meter().u64_counter(name.to_string()).build()
    });
    counter.add(value, tags);
}

fn lookup<T: Clone>(
    registry: &RwLock<HashMap<String, T>>,
    name: &str,
    create: impl FnOnce() -> T,
) -> T {
    if let Some(instrument) = registry.read().unwrap().get(name) {
        return instrument.clone();
    }

    let mut registry = registry.write().unwrap();
    // Another thread may have created the instrument while the read lock was
    // released.
    registry
        .entry(name.to_string())
        .or_insert_with(create)
        .clone()
}
