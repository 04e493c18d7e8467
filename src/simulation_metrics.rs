use std::fs::File;
use std::io::{BufWriter, Write};
use log::info;
use serde::Serialize;
use crate::errors::SimulationError;
use crate::widget_load_aggregator::AggregatorStats;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metrics {
    pub timestamp: f64,
    pub requests_added: u64,
    pub flush_cycles: u64,
    pub calls_issued: u64,
    pub groups_skipped: u64,
    pub responses_delivered: u64,
    pub failed_responses: u64,
    /// Time from `add` until the widget got its response.
    pub load_latency_p50: Option<f64>,
    pub load_latency_p95: Option<f64>,
}

/// Returns the `q`-th quantile of the samples (nearest rank), reorders `samples`.
pub fn percentile(samples: &mut [f64], q: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let rank = ((q * samples.len() as f64).ceil() as usize).clamp(1, samples.len()) - 1;
    Some(*order_stat::kth_by(samples, rank, |a, b| a.total_cmp(b)))
}

impl Metrics {
    pub fn new(timestamp: f64, stats: AggregatorStats, load_latencies: &mut [f64]) -> Self {
        Self {
            timestamp,
            requests_added: stats.requests_added,
            flush_cycles: stats.flush_cycles,
            calls_issued: stats.calls_issued,
            groups_skipped: stats.groups_skipped,
            responses_delivered: stats.responses_delivered,
            failed_responses: stats.failed_responses,
            load_latency_p50: percentile(load_latencies, 0.5),
            load_latency_p95: percentile(load_latencies, 0.95),
        }
    }

    /// Widget requests per issued call.
    pub fn batching_ratio(&self) -> Option<f64> {
        if self.calls_issued == 0 {
            return None;
        }
        Some(self.requests_added as f64 / self.calls_issued as f64)
    }
}

pub trait MetricsLogger {
    fn snapshot_period(&self) -> f64;
    fn log_metrics(&mut self, metrics: Metrics);
    fn save_log(&mut self, path: &str) -> Result<(), SimulationError>;
}

pub struct EmptyMetricsLogger {}

impl MetricsLogger for EmptyMetricsLogger {
    fn snapshot_period(&self) -> f64 {
        -1.0
    }

    fn log_metrics(&mut self, _metrics: Metrics) {}

    fn save_log(&mut self, _path: &str) -> Result<(), SimulationError> {
        Ok(())
    }
}

pub struct StdoutMetricsLogger {
    snapshot_period: f64,
}

impl StdoutMetricsLogger {
    pub fn new(snapshot_period: f64) -> Self {
        Self {
            snapshot_period
        }
    }
}

fn format_latency(latency: Option<f64>) -> String {
    latency.map(|value| format!("{:.3}", value)).unwrap_or_else(|| "-".to_string())
}

impl MetricsLogger for StdoutMetricsLogger {
    fn snapshot_period(&self) -> f64 {
        self.snapshot_period
    }

    fn log_metrics(&mut self, metrics: Metrics) {
        info!("Time: {}, requests added: {}, flush cycles: {}, calls issued: {}, groups skipped: {}, \
         responses delivered: {}, failed responses: {}, load latency p50: {}, p95: {}",
              metrics.timestamp, metrics.requests_added, metrics.flush_cycles, metrics.calls_issued,
              metrics.groups_skipped, metrics.responses_delivered, metrics.failed_responses,
              format_latency(metrics.load_latency_p50), format_latency(metrics.load_latency_p95))
    }

    fn save_log(&mut self, _path: &str) -> Result<(), SimulationError> {
        Ok(())
    }
}

pub struct FileMetricsLogger {
    snapshot_period: f64,
    metrics_history: Vec<Metrics>,
}

impl FileMetricsLogger {
    pub fn new(snapshot_period: f64) -> Self {
        Self {
            snapshot_period,
            metrics_history: Vec::default(),
        }
    }
}

impl MetricsLogger for FileMetricsLogger {
    fn snapshot_period(&self) -> f64 {
        self.snapshot_period
    }

    fn log_metrics(&mut self, metrics: Metrics) {
        self.metrics_history.push(metrics);
    }

    fn save_log(&mut self, path: &str) -> Result<(), SimulationError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &self.metrics_history)?;
        writer.flush()?;
        Ok(())
    }
}

/// Writes one CSV row per snapshot.
pub struct CsvMetricsLogger {
    snapshot_period: f64,
    metrics_history: Vec<Metrics>,
}

impl CsvMetricsLogger {
    pub fn new(snapshot_period: f64) -> Self {
        Self {
            snapshot_period,
            metrics_history: Vec::default(),
        }
    }
}

impl MetricsLogger for CsvMetricsLogger {
    fn snapshot_period(&self) -> f64 {
        self.snapshot_period
    }

    fn log_metrics(&mut self, metrics: Metrics) {
        self.metrics_history.push(metrics);
    }

    fn save_log(&mut self, path: &str) -> Result<(), SimulationError> {
        let mut writer = csv::Writer::from_path(path)?;
        for metrics in self.metrics_history.iter() {
            writer.serialize(metrics)?;
        }
        writer.flush()?;
        Ok(())
    }
}
