//! Cache metrics export.
//!
//! The cache only keeps counters; this module samples them and publishes the
//! values through the `metrics` facade under the `rebac.cache.` prefix.

use crate::error::{Result, TelemetryError};
use auth_identity::{CacheMetrics, InMemoryCache};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const METRIC_PREFIX: &str = "rebac.cache";

/// Install a global Prometheus recorder and return the render handle.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::RecorderError(e.to_string()))?;
    info!("Prometheus metrics recorder installed");
    Ok(handle)
}

pub struct CacheMetricsExporter {
    cache: InMemoryCache,
}

impl CacheMetricsExporter {
    pub fn new(cache: InMemoryCache) -> Self {
        Self { cache }
    }

    /// Sample the cache once. Returns `false` when the cache has metrics
    /// disabled.
    pub fn sample(&self) -> bool {
        match self.cache.metrics() {
            Some(snapshot) => {
                record(&snapshot);
                true
            }
            None => false,
        }
    }

    /// Sample on a fixed interval until the returned task is aborted.
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if !self.sample() {
                    debug!("Cache metrics disabled, sampler stopping");
                    break;
                }
            }
        })
    }
}

/// Publish one snapshot. Counters are set to their absolute values.
pub fn record(snapshot: &CacheMetrics) {
    let counters = [
        ("hits", snapshot.hits),
        ("miss", snapshot.misses),
        ("cost_added", snapshot.cost_added),
        ("cost_evicted", snapshot.cost_evicted),
        ("gets_dropped", snapshot.gets_dropped),
        ("gets_kept", snapshot.gets_kept),
        ("keys_added", snapshot.keys_added),
        ("keys_evicted", snapshot.keys_evicted),
        ("keys_updated", snapshot.keys_updated),
        ("sets_dropped", snapshot.sets_dropped),
        ("sets_rejected", snapshot.sets_rejected),
    ];
    for (name, value) in counters {
        counter!(format!("{}.{}", METRIC_PREFIX, name)).absolute(value);
    }
    gauge!(format!("{}.ratio", METRIC_PREFIX)).set(snapshot.ratio);
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_identity::CacheConfig;

    #[test]
    fn test_record_renders_prometheus_names() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let snapshot = CacheMetrics {
            hits: 3,
            misses: 1,
            ratio: 0.75,
            keys_added: 2,
            ..CacheMetrics::default()
        };
        metrics::with_local_recorder(&recorder, || record(&snapshot));

        let rendered = handle.render();
        assert!(rendered.contains("rebac_cache_hits 3"), "{}", rendered);
        assert!(rendered.contains("rebac_cache_miss 1"), "{}", rendered);
        assert!(rendered.contains("rebac_cache_keys_added 2"), "{}", rendered);
        assert!(rendered.contains("rebac_cache_ratio 0.75"), "{}", rendered);
    }

    #[tokio::test]
    async fn test_sample_skips_disabled_cache() {
        let exporter = CacheMetricsExporter::new(InMemoryCache::new(CacheConfig {
            metrics: false,
            ..CacheConfig::default()
        }));
        assert!(!exporter.sample());

        let exporter = CacheMetricsExporter::new(InMemoryCache::new(CacheConfig::default()));
        assert!(exporter.sample());
    }
}
