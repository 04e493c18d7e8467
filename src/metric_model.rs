//! Metric value models of host components.

use dyn_clone::{clone_trait_object, DynClone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// A metric model is a function, which defines the value of a metric at the moment.
/// Models may keep a cursor, so sampling takes `&mut self`.
pub trait MetricModel: DynClone {
    fn get_value(&mut self, time: f64) -> f64;
}

clone_trait_object!(MetricModel);

#[derive(Clone)]
pub struct ConstantMetricModel {
    value: f64,
}

impl ConstantMetricModel {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl MetricModel for ConstantMetricModel {
    fn get_value(&mut self, _time: f64) -> f64 {
        self.value
    }
}

/// Linear growth from `start_value` to `end_value` during `increase_time`, then flat.
#[derive(Clone)]
pub struct IncreaseMetricModel {
    increase_time: f64,
    start_value: f64,
    end_value: f64,
}

impl IncreaseMetricModel {
    pub fn new(increase_time: f64, start_value: f64, end_value: f64) -> Self {
        Self { increase_time, start_value, end_value }
    }
}

impl MetricModel for IncreaseMetricModel {
    fn get_value(&mut self, time: f64) -> f64 {
        if self.increase_time <= 0.0 {
            return self.end_value;
        }
        self.start_value + (time / self.increase_time).clamp(0.0, 1.0) *
            (self.end_value - self.start_value)
    }
}

/// Linear decay from `start_value` to `end_value` during `decrease_time`, then flat.
#[derive(Clone)]
pub struct DecreaseMetricModel {
    decrease_time: f64,
    start_value: f64,
    end_value: f64,
}

impl DecreaseMetricModel {
    pub fn new(decrease_time: f64, start_value: f64, end_value: f64) -> Self {
        Self { decrease_time, start_value, end_value }
    }
}

impl MetricModel for DecreaseMetricModel {
    fn get_value(&mut self, time: f64) -> f64 {
        if self.decrease_time <= 0.0 {
            return self.end_value;
        }
        self.start_value - (time / self.decrease_time).clamp(0.0, 1.0) *
            (self.start_value - self.end_value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: f64,
    pub value: f64,
}

/// Step function over recorded snapshots. Before the first snapshot the first value is used.
#[derive(Clone, Default)]
pub struct TraceMetricModel {
    history: Vec<MetricSnapshot>,
    now_ptr: usize,
}

impl TraceMetricModel {
    pub fn new(mut history: Vec<MetricSnapshot>) -> Self {
        history.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self { history, now_ptr: 0 }
    }

    fn seek(&self, from: usize, time: f64) -> usize {
        let mut ptr = from;
        while ptr + 1 < self.history.len() && self.history[ptr + 1].timestamp <= time {
            ptr += 1;
        }
        ptr
    }
}

impl MetricModel for TraceMetricModel {
    fn get_value(&mut self, time: f64) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        // graph requests sample backwards in time, restart the scan then
        if self.history[self.now_ptr].timestamp > time {
            self.now_ptr = 0;
        }
        self.now_ptr = self.seek(self.now_ptr, time);
        self.history[self.now_ptr].value
    }
}

/// Uniform jitter of `amplitude` around `value`, reproducible through `seed`.
#[derive(Clone)]
pub struct NoiseMetricModel {
    value: f64,
    amplitude: f64,
    rng: StdRng,
}

impl NoiseMetricModel {
    pub fn new(value: f64, amplitude: f64, seed: u64) -> Self {
        Self { value, amplitude: amplitude.abs(), rng: StdRng::seed_from_u64(seed) }
    }
}

impl MetricModel for NoiseMetricModel {
    fn get_value(&mut self, _time: f64) -> f64 {
        if self.amplitude == 0.0 {
            return self.value;
        }
        self.value + self.rng.gen_range(-1.0_f64..=1.0) * self.amplitude
    }
}

/// Metric model as written in the YAML config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum MetricModelConfig {
    Const { value: f64 },
    Increase { increase_time: f64, start: f64, end: f64 },
    Decrease { decrease_time: f64, start: f64, end: f64 },
    Trace { snapshots: Vec<MetricSnapshot> },
    Noise { value: f64, amplitude: f64, seed: Option<u64> },
}

impl MetricModelConfig {
    /// Checks that every number of the model is finite.
    pub fn validate(&self) -> Result<(), String> {
        let numbers = match self {
            MetricModelConfig::Const { value } => vec![("value", *value)],
            MetricModelConfig::Increase { increase_time, start, end } =>
                vec![("increase_time", *increase_time), ("start", *start), ("end", *end)],
            MetricModelConfig::Decrease { decrease_time, start, end } =>
                vec![("decrease_time", *decrease_time), ("start", *start), ("end", *end)],
            MetricModelConfig::Trace { snapshots } => snapshots.iter()
                .flat_map(|snapshot| [("timestamp", snapshot.timestamp), ("value", snapshot.value)])
                .collect(),
            MetricModelConfig::Noise { value, amplitude, .. } => vec![("value", *value), ("amplitude", *amplitude)],
        };
        match numbers.into_iter().find(|(_, number)| !number.is_finite()) {
            Some((name, number)) => Err(format!("{} must be finite, got {}", name, number)),
            None => Ok(()),
        }
    }

    pub fn build(&self) -> Box<dyn MetricModel> {
        match self {
            MetricModelConfig::Const { value } => Box::new(ConstantMetricModel::new(*value)),
            MetricModelConfig::Increase { increase_time, start, end } =>
                Box::new(IncreaseMetricModel::new(*increase_time, *start, *end)),
            MetricModelConfig::Decrease { decrease_time, start, end } =>
                Box::new(DecreaseMetricModel::new(*decrease_time, *start, *end)),
            MetricModelConfig::Trace { snapshots } => Box::new(TraceMetricModel::new(snapshots.clone())),
            MetricModelConfig::Noise { value, amplitude, seed } =>
                Box::new(NoiseMetricModel::new(*value, *amplitude, seed.unwrap_or(42))),
        }
    }
}
