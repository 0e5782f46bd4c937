//! Replication and repair metrics with Prometheus text export

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Snapshot of coordinator counters
#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    /// Write calls entering the coordinator
    pub writes: u64,

    /// Writes rejected by the durable store
    pub durable_write_failures: u64,

    /// Writes that reached durable but failed on the cache
    pub cache_write_failures: u64,

    /// Reads answered by the durable store after a cache error
    pub read_fallbacks: u64,

    /// Enforcement decisions answered by the durable store after a cache error
    pub enforce_fallbacks: u64,

    /// Enforcement results
    pub allowed_decisions: u64,
    pub denied_decisions: u64,

    /// Resync lifecycle
    pub resyncs_started: u64,
    pub resyncs_completed: u64,
    pub resyncs_failed: u64,
    pub resyncs_coalesced: u64,

    /// Duration of the most recent successful resync
    pub last_resync_ms: f64,

    /// Average duration of successful resyncs
    pub avg_resync_ms: f64,
}

impl SyncMetrics {
    /// Fraction of enforcement calls that needed the durable store
    pub fn enforce_fallback_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.enforce_fallbacks as f64 / total as f64
        }
    }
}

/// Metrics collector shared by the coordinator
pub struct MetricsCollector {
    metrics: Arc<RwLock<SyncMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(SyncMetrics::default())),
        }
    }

    pub async fn record_write(&self) {
        self.metrics.write().await.writes += 1;
    }

    pub async fn record_durable_write_failure(&self) {
        self.metrics.write().await.durable_write_failures += 1;
    }

    pub async fn record_cache_write_failure(&self) {
        self.metrics.write().await.cache_write_failures += 1;
    }

    pub async fn record_read_fallback(&self) {
        self.metrics.write().await.read_fallbacks += 1;
    }

    pub async fn record_enforce_fallback(&self) {
        self.metrics.write().await.enforce_fallbacks += 1;
    }

    pub async fn record_decision(&self, allowed: bool) {
        let mut metrics = self.metrics.write().await;
        if allowed {
            metrics.allowed_decisions += 1;
        } else {
            metrics.denied_decisions += 1;
        }
    }

    pub async fn record_resync_started(&self) {
        self.metrics.write().await.resyncs_started += 1;
    }

    pub async fn record_resync_completed(&self, duration: Duration) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let mut metrics = self.metrics.write().await;

        metrics.resyncs_completed += 1;
        metrics.last_resync_ms = duration_ms;

        // Running mean over completed resyncs
        let n = metrics.resyncs_completed as f64;
        metrics.avg_resync_ms += (duration_ms - metrics.avg_resync_ms) / n;
    }

    pub async fn record_resync_failed(&self) {
        self.metrics.write().await.resyncs_failed += 1;
    }

    pub async fn record_resync_coalesced(&self) {
        self.metrics.write().await.resyncs_coalesced += 1;
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> SyncMetrics {
        self.metrics.read().await.clone()
    }

    /// Reset all metrics
    pub async fn reset(&self) {
        *self.metrics.write().await = SyncMetrics::default();
    }

    /// Export metrics in Prometheus format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP authsync_writes_total Write operations received
# TYPE authsync_writes_total counter
authsync_writes_total {}

# HELP authsync_durable_write_failures_total Writes rejected by the durable store
# TYPE authsync_durable_write_failures_total counter
authsync_durable_write_failures_total {}

# HELP authsync_cache_write_failures_total Writes that failed on the cache after durable success
# TYPE authsync_cache_write_failures_total counter
authsync_cache_write_failures_total {}

# HELP authsync_fallbacks_total Requests answered by the durable store after a cache error
# TYPE authsync_fallbacks_total counter
authsync_fallbacks_total{{path="read"}} {}
authsync_fallbacks_total{{path="enforce"}} {}

# HELP authsync_decisions_total Enforcement decisions
# TYPE authsync_decisions_total counter
authsync_decisions_total{{result="allow"}} {}
authsync_decisions_total{{result="deny"}} {}

# HELP authsync_resyncs_total Cache rebuilds by outcome
# TYPE authsync_resyncs_total counter
authsync_resyncs_total{{outcome="started"}} {}
authsync_resyncs_total{{outcome="completed"}} {}
authsync_resyncs_total{{outcome="failed"}} {}
authsync_resyncs_total{{outcome="coalesced"}} {}

# HELP authsync_resync_seconds Duration of cache rebuilds
# TYPE authsync_resync_seconds gauge
authsync_resync_seconds{{stat="last"}} {}
authsync_resync_seconds{{stat="avg"}} {}
"#,
            metrics.writes,
            metrics.durable_write_failures,
            metrics.cache_write_failures,
            metrics.read_fallbacks,
            metrics.enforce_fallbacks,
            metrics.allowed_decisions,
            metrics.denied_decisions,
            metrics.resyncs_started,
            metrics.resyncs_completed,
            metrics.resyncs_failed,
            metrics.resyncs_coalesced,
            metrics.last_resync_ms / 1000.0,
            metrics.avg_resync_ms / 1000.0,
        )
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
