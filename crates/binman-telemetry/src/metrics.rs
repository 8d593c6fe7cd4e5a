//! Prometheus-backed metrics registry.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Collectors are thread-safe, so one handle is shared by every repository run.

use std::fmt;
use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across release pipelines.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    release_info: IntGaugeVec,
    actions_total: IntCounterVec,
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

/// Labels recorded when a pipeline checks the status of a release.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseObservation<'a> {
    /// `true` when the release was queried as "latest" rather than by tag.
    pub latest: bool,
    /// Configured source identifier (e.g. `github.com`).
    pub source: &'a str,
    /// Tracked repository (`org/project`).
    pub repo: &'a str,
    /// Resolved version tag.
    pub version: &'a str,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let release_info = register(
            &registry,
            "binman_release_info",
            IntGaugeVec::new(
                Opts::new(
                    "binman_release_info",
                    "Releases observed by the status check",
                ),
                &["latest", "source", "repo", "version"],
            ),
        )?;
        let actions_total = register(
            &registry,
            "binman_actions_total",
            IntCounterVec::new(
                Opts::new(
                    "binman_actions_total",
                    "Release pipeline actions executed by outcome",
                ),
                &["action", "status"],
            ),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                release_info,
                actions_total,
            }),
        })
    }

    /// Record that a release was observed by the status check.
    pub fn observe_release(&self, observation: ReleaseObservation<'_>) {
        let latest = if observation.latest { "true" } else { "false" };
        self.inner
            .release_info
            .with_label_values(&[
                latest,
                observation.source,
                observation.repo,
                observation.version,
            ])
            .set(1);
    }

    /// Increment the pipeline action counter.
    pub fn inc_action(&self, action: &str, status: &str) {
        self.inner
            .actions_total
            .with_label_values(&[action, status])
            .inc();
    }

    /// Current value of the action counter for the given labels.
    #[must_use]
    pub fn action_count(&self, action: &str, status: &str) -> u64 {
        self.inner
            .actions_total
            .with_label_values(&[action, status])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn register<C>(
    registry: &Registry,
    metric: &'static str,
    collector: prometheus::Result<C>,
) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    let collector = collector.map_err(|source| TelemetryError::Metric { metric, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::Metric { metric, source })?;
    Ok(collector)
}
