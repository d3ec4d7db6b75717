// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Labelled metric families on top of a `metrics` recorder.
//!
//! The registry is handed a recorder explicitly instead of relying on the
//! process-global one, so tests can assert against a debugging recorder and
//! several registries can coexist. Registering the same name twice on one
//! registry is an error.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use metrics::{Counter, Histogram, Key, KeyName, Label, Level, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("metric {0:?} is already registered")]
    AlreadyRegistered(String),
    #[error("metric {name:?} expects {expected} label values, got {got}")]
    LabelCount {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("failed to build metrics exporter: {0}")]
    Exporter(String),
}

type SharedRecorder = Arc<dyn Recorder + Send + Sync>;

/// A set of metric names bound to one recorder.
#[derive(Clone)]
pub struct MetricsRegistry {
    recorder: SharedRecorder,
    registered: Arc<Mutex<HashSet<String>>>,
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    pub fn new(recorder: impl Recorder + Send + Sync + 'static) -> Self {
        Self {
            recorder: Arc::new(recorder),
            registered: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// A registry rendering Prometheus text exposition through the returned
    /// handle. `buckets` sets explicit histogram buckets per metric name.
    pub fn prometheus(buckets: &[(&str, &[f64])]) -> Result<(Self, PrometheusHandle), MetricsError> {
        let mut builder = PrometheusBuilder::new();
        for (name, values) in buckets {
            builder = builder
                .set_buckets_for_metric(Matcher::Full((*name).to_string()), values)
                .map_err(|e| MetricsError::Exporter(e.to_string()))?;
        }
        let recorder = builder.build_recorder();
        let handle = recorder.handle();
        Ok((Self::new(recorder), handle))
    }

    fn claim(&self, name: &str) -> Result<(), MetricsError> {
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !registered.insert(name.to_string()) {
            return Err(MetricsError::AlreadyRegistered(name.to_string()));
        }
        Ok(())
    }

    /// Register a counter family.
    pub fn counter_vec(
        &self,
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Result<CounterVec, MetricsError> {
        self.claim(name)?;
        self.recorder
            .describe_counter(KeyName::from(name), None, SharedString::from(help));
        Ok(CounterVec(Family {
            recorder: self.recorder.clone(),
            name,
            labels,
        }))
    }

    /// Register a histogram family.
    pub fn histogram_vec(
        &self,
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Result<HistogramVec, MetricsError> {
        self.claim(name)?;
        self.recorder
            .describe_histogram(KeyName::from(name), None, SharedString::from(help));
        Ok(HistogramVec(Family {
            recorder: self.recorder.clone(),
            name,
            labels,
        }))
    }
}

#[derive(Clone)]
struct Family {
    recorder: SharedRecorder,
    name: &'static str,
    labels: &'static [&'static str],
}

impl Family {
    fn key(&self, values: &[&str]) -> Result<Key, MetricsError> {
        if values.len() != self.labels.len() {
            return Err(MetricsError::LabelCount {
                name: self.name.to_string(),
                expected: self.labels.len(),
                got: values.len(),
            });
        }
        let labels: Vec<Label> = self
            .labels
            .iter()
            .zip(values)
            .map(|(key, value)| Label::new(*key, value.to_string()))
            .collect();
        Ok(Key::from_parts(self.name, labels))
    }

    fn metadata() -> Metadata<'static> {
        Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
    }
}

/// A counter family keyed by label values.
#[derive(Clone)]
pub struct CounterVec(Family);

impl CounterVec {
    pub fn with_label_values(&self, values: &[&str]) -> Result<Counter, MetricsError> {
        let key = self.0.key(values)?;
        Ok(self.0.recorder.register_counter(&key, &Family::metadata()))
    }
}

/// A histogram family keyed by label values.
#[derive(Clone)]
pub struct HistogramVec(Family);

impl HistogramVec {
    pub fn with_label_values(&self, values: &[&str]) -> Result<Histogram, MetricsError> {
        let key = self.0.key(values)?;
        Ok(self.0.recorder.register_histogram(&key, &Family::metadata()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = MetricsRegistry::new(DebuggingRecorder::new());
        registry.counter_vec("jobs_total", "Jobs.", &["queue"]).unwrap();

        let err = registry
            .histogram_vec("jobs_total", "Jobs.", &["queue"])
            .err()
            .unwrap();
        assert_eq!(err, MetricsError::AlreadyRegistered("jobs_total".to_string()));
    }

    #[test]
    fn clones_share_registered_names() {
        let registry = MetricsRegistry::new(DebuggingRecorder::new());
        registry.counter_vec("a_total", "A.", &[]).unwrap();
        assert!(registry.clone().counter_vec("a_total", "A.", &[]).is_err());
    }

    #[test]
    fn label_count_is_checked() {
        let registry = MetricsRegistry::new(DebuggingRecorder::new());
        let counter = registry.counter_vec("c_total", "C.", &["a", "b"]).unwrap();
        assert!(matches!(
            counter.with_label_values(&["only-one"]),
            Err(MetricsError::LabelCount { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn counter_records_through_recorder() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let registry = MetricsRegistry::new(recorder);

        let counter = registry.counter_vec("c_total", "C.", &["service"]).unwrap();
        counter.with_label_values(&["demo.Greeter"]).unwrap().increment(2);

        let entries = snapshotter.snapshot().into_vec();
        let (key, _, _, value) = entries.first().unwrap();
        assert_eq!(key.key().name(), "c_total");
        assert_eq!(
            key.key().labels().next().map(|l| (l.key(), l.value())),
            Some(("service", "demo.Greeter"))
        );
        assert_eq!(value, &DebugValue::Counter(2));
    }

    #[test]
    fn prometheus_registry_renders_text() {
        let buckets = [5.0, 10.0];
        let (registry, handle) = MetricsRegistry::prometheus(&[("h_ms", &buckets[..])]).unwrap();
        let histogram = registry.histogram_vec("h_ms", "H.", &["method"]).unwrap();
        histogram.with_label_values(&["Hello"]).unwrap().record(7.0);

        let rendered = handle.render();
        assert!(rendered.contains("h_ms_bucket{method=\"Hello\",le=\"10\"} 1"));
    }
}
