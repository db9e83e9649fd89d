//! Prometheus metrics for the image pipeline

use crate::error::WorkerError;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder.
///
/// Call once at startup. Later calls are no-ops.
pub fn init_metrics() -> Result<(), WorkerError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| WorkerError::Metrics(e.to_string()))?;
        info!("Prometheus metrics initialized");
        Ok::<_, WorkerError>(handle)
    })?;
    Ok(())
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Metric recorder for one consumer, labelled by queue and processor
#[derive(Clone, Debug)]
pub struct PipelineMetrics {
    queue: String,
    processor: String,
}

impl PipelineMetrics {
    pub fn new(queue: impl Into<String>, processor: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            processor: processor.into(),
        }
    }

    pub fn delivery_received(&self) {
        counter!(
            "image_pipeline_deliveries_received_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone()
        )
        .increment(1);
    }

    pub fn acked(&self, duration: Duration) {
        counter!(
            "image_pipeline_deliveries_settled_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone(),
            "outcome" => "acked"
        )
        .increment(1);

        histogram!(
            "image_pipeline_processing_duration_seconds",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone()
        )
        .record(duration.as_secs_f64());
    }

    pub fn retried(&self, attempt: u32) {
        counter!(
            "image_pipeline_deliveries_settled_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone(),
            "outcome" => "retried"
        )
        .increment(1);

        histogram!(
            "image_pipeline_retry_attempt",
            "queue" => self.queue.clone()
        )
        .record(f64::from(attempt));
    }

    /// `reason` is an error category or `"decode"`
    pub fn dead_lettered(&self, reason: &'static str) {
        counter!(
            "image_pipeline_deliveries_settled_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone(),
            "outcome" => "dead_lettered"
        )
        .increment(1);

        counter!(
            "image_pipeline_dead_letters_total",
            "queue" => self.queue.clone(),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn retry_publish_failed(&self) {
        counter!(
            "image_pipeline_retry_publish_failures_total",
            "queue" => self.queue.clone()
        )
        .increment(1);
    }

    pub fn settle_failed(&self) {
        counter!(
            "image_pipeline_settle_failures_total",
            "queue" => self.queue.clone()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = PipelineMetrics::new("image_processing", "image_compressor");
        metrics.delivery_received();
        metrics.acked(Duration::from_millis(5));
        metrics.retried(1);
        metrics.dead_lettered("decode");
        metrics.settle_failed();
    }

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        PipelineMetrics::new("image_processing", "test").delivery_received();
        assert!(render_metrics().contains("image_pipeline_deliveries_received_total"));
    }
}
