//! Simulation configuration.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::errors::ConfigError;
use crate::api_server::MAX_SERIES_POINTS;
use crate::metric_model::MetricModelConfig;
use crate::widget_request::WidgetKind;

/// Holds configuration of a single host running a component.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host name.
    pub name: String,
    /// Properties of the host component, matched by host component criteria.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Metric models of this host, replacing the component-wide models with the same path.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricModelConfig>,
}

impl HostConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            properties: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_metric(mut self, metric_path: &str, model: MetricModelConfig) -> Self {
        self.metrics.insert(metric_path.to_string(), model);
        self
    }
}

/// Holds configuration of a service component deployed on a set of hosts.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub service_name: String,
    pub component_name: String,
    pub hosts: Vec<HostConfig>,
    /// Metric path (without aggregate suffix) to its value model.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricModelConfig>,
}

/// A metric a widget displays.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct WidgetMetric {
    pub name: String,
    pub metric_path: String,
    pub service_name: String,
    pub component_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_component_criteria: Option<String>,
}

impl WidgetMetric {
    pub fn new(name: &str, metric_path: &str, service_name: &str, component_name: &str) -> Self {
        Self {
            name: name.to_string(),
            metric_path: metric_path.to_string(),
            service_name: service_name.to_string(),
            component_name: component_name.to_string(),
            host_component_criteria: None,
        }
    }

    pub fn with_criteria(mut self, criteria: &str) -> Self {
        self.host_component_criteria = Some(criteria.to_string());
        self
    }
}

/// A value template like `${a + b}`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct WidgetValueTemplate {
    pub name: String,
    pub value: String,
}

impl WidgetValueTemplate {
    pub fn new(name: &str, value: &str) -> Self {
        Self { name: name.to_string(), value: value.to_string() }
    }
}

/// Holds a widget definition.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct WidgetDefinition {
    pub widget_name: String,
    pub widget_type: WidgetKind,
    #[serde(default)]
    pub metrics: Vec<WidgetMetric>,
    #[serde(default)]
    pub values: Vec<WidgetValueTemplate>,
    /// Render time (in simulation time, seconds from submission).
    #[serde(default)]
    pub render_delay: f64,
}

impl WidgetDefinition {
    pub fn new(widget_name: &str, widget_type: WidgetKind) -> Self {
        Self {
            widget_name: widget_name.to_string(),
            widget_type,
            metrics: Vec::new(),
            values: Vec::new(),
            render_delay: 0.0,
        }
    }

    pub fn with_metric(mut self, metric: WidgetMetric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn with_value(mut self, name: &str, value: &str) -> Self {
        self.values.push(WidgetValueTemplate::new(name, value));
        self
    }

    pub fn with_render_delay(mut self, render_delay: f64) -> Self {
        self.render_delay = render_delay;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.render_delay.is_finite() || self.render_delay < 0.0 {
            return Err(format!("render_delay of widget {} must be a finite non-negative number, got {}",
                               self.widget_name, self.render_delay));
        }
        Ok(())
    }
}

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub message_delay: Option<f64>,
    pub api_processing_time: Option<f64>,
    pub aggregator_delay: Option<f64>,
    pub widget_refresh_interval: Option<f64>,
    pub graph_time_range: Option<f64>,
    pub graph_step: Option<f64>,
    pub separately_grouped_kinds: Option<Vec<WidgetKind>>,
    pub components: Option<Vec<ComponentConfig>>,
    pub widgets: Option<Vec<WidgetDefinition>>,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Message delay in seconds for communications between the browser and the API server.
    pub message_delay: f64,
    /// Time the API server spends answering a metrics request.
    pub api_processing_time: f64,
    /// Debounce delay of the widget load aggregator.
    pub aggregator_delay: f64,
    /// Widgets reload their metrics with this period, non-positive disables refresh.
    pub widget_refresh_interval: f64,
    /// Time range requested by graph widgets.
    pub graph_time_range: f64,
    /// Step of the series requested by graph widgets.
    pub graph_step: f64,
    /// Widget kinds which get their own request group.
    pub separately_grouped_kinds: Vec<WidgetKind>,
    /// Deployed service components.
    pub components: Vec<ComponentConfig>,
    /// Widgets rendered at the start of the simulation.
    pub widgets: Vec<WidgetDefinition>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            message_delay: 0.05,
            api_processing_time: 0.1,
            aggregator_delay: 0.5,
            widget_refresh_interval: 15.0,
            graph_time_range: 3600.0,
            graph_step: 15.0,
            separately_grouped_kinds: vec![WidgetKind::Graph],
            components: Vec::default(),
            widgets: Vec::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_yaml(file_name, &content)
    }

    pub fn from_yaml(file_name: &str, content: &str) -> Result<Self, ConfigError> {
        let raw: RawSimulationConfig = serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            path: file_name.to_string(),
            source,
        })?;
        let default = Self::default();

        let config = Self {
            message_delay: raw.message_delay.unwrap_or(default.message_delay),
            api_processing_time: raw.api_processing_time.unwrap_or(default.api_processing_time),
            aggregator_delay: raw.aggregator_delay.unwrap_or(default.aggregator_delay),
            widget_refresh_interval: raw.widget_refresh_interval.unwrap_or(default.widget_refresh_interval),
            graph_time_range: raw.graph_time_range.unwrap_or(default.graph_time_range),
            graph_step: raw.graph_step.unwrap_or(default.graph_step),
            separately_grouped_kinds: raw.separately_grouped_kinds.unwrap_or(default.separately_grouped_kinds),
            components: raw.components.unwrap_or_default(),
            widgets: raw.widgets.unwrap_or_default(),
        };
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: file_name.to_string(),
            reason,
        })?;
        Ok(config)
    }

    /// Checks delays, graph settings and metric models, so the simulation never sees
    /// a negative delay, a non-finite number or an oversized graph series.
    pub fn validate(&self) -> Result<(), String> {
        for (name, delay) in [("message_delay", self.message_delay),
                              ("api_processing_time", self.api_processing_time),
                              ("aggregator_delay", self.aggregator_delay),
                              ("graph_time_range", self.graph_time_range)] {
            if !delay.is_finite() || delay < 0.0 {
                return Err(format!("{} must be a finite non-negative number, got {}", name, delay));
            }
        }
        if !self.widget_refresh_interval.is_finite() {
            return Err(format!("widget_refresh_interval must be finite, got {}", self.widget_refresh_interval));
        }
        if !self.graph_step.is_finite() || self.graph_step <= 0.0 {
            return Err(format!("graph_step must be a finite positive number, got {}", self.graph_step));
        }
        if self.graph_time_range / self.graph_step >= MAX_SERIES_POINTS as f64 {
            return Err(format!("graph_time_range / graph_step must be below {}", MAX_SERIES_POINTS));
        }

        for component in self.components.iter() {
            let host_metrics = component.hosts.iter().flat_map(|host| host.metrics.iter());
            for (path, model) in component.metrics.iter().chain(host_metrics) {
                model.validate().map_err(|reason| format!("metric {} of {}: {}",
                                                          path, component.component_name, reason))?;
            }
        }
        for widget in self.widgets.iter() {
            widget.validate()?;
        }
        Ok(())
    }
}
