//! Representation of cluster hosts and the components running on them

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use crate::errors::ApiError;
use crate::metric_model::MetricModel;

/// Host component state (for imitation of stopped components)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HostComponentState {
    Started,
    Installed,
}

impl Display for HostComponentState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            HostComponentState::Started => write!(f, "STARTED"),
            HostComponentState::Installed => write!(f, "INSTALLED"),
        }
    }
}

#[derive(Clone)]
pub struct HostComponent {
    pub service_name: String,
    pub component_name: String,
    pub host_name: String,
    pub state: HostComponentState,
    properties: BTreeMap<String, String>,
    metrics: BTreeMap<String, Box<dyn MetricModel>>,
}

impl HostComponent {
    pub fn new(
        service_name: &str,
        component_name: &str,
        host_name: &str,
        properties: BTreeMap<String, String>,
        metrics: BTreeMap<String, Box<dyn MetricModel>>,
    ) -> Self {
        Self {
            service_name: service_name.to_string(),
            component_name: component_name.to_string(),
            host_name: host_name.to_string(),
            state: HostComponentState::Started,
            properties,
            metrics,
        }
    }

    pub fn is_started(&self) -> bool {
        self.state == HostComponentState::Started
    }

    pub fn has_metric(&self, metric_path: &str) -> bool {
        self.metrics.contains_key(metric_path)
    }

    /// Current value of the metric, stopped components report nothing.
    pub fn metric_value(&mut self, metric_path: &str, time: f64) -> Option<f64> {
        if !self.is_started() {
            return None;
        }
        self.metrics.get_mut(metric_path).map(|model| model.get_value(time))
    }

    /// Property lookup, including the `HostRoles/*` built-ins.
    pub fn property(&self, key: &str) -> Option<String> {
        match key {
            "HostRoles/host_name" => Some(self.host_name.clone()),
            "HostRoles/component_name" => Some(self.component_name.clone()),
            "HostRoles/service_name" => Some(self.service_name.clone()),
            "HostRoles/state" => Some(self.state.to_string()),
            _ => self.properties.get(key).cloned(),
        }
    }

    /// Checks `key=value&key=value` criteria against the component properties.
    pub fn matches_criteria(&self, criteria: &str) -> Result<bool, ApiError> {
        for predicate in criteria.split('&').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = predicate
                .split_once('=')
                .ok_or_else(|| ApiError::InvalidCriteria(criteria.to_string()))?;
            if self.property(key.trim()).as_deref() != Some(value.trim()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn host_roles(&self) -> serde_json::Value {
        serde_json::json!({
            "host_name": self.host_name,
            "component_name": self.component_name,
            "service_name": self.service_name,
            "state": self.state.to_string(),
        })
    }
}

pub struct Host {
    pub name: String,
    pub components: Vec<HostComponent>,
}

impl Host {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            components: Vec::new(),
        }
    }

    pub fn add_component(&mut self, component: HostComponent) {
        self.components.push(component);
    }

    pub fn component_mut(&mut self, component_name: &str) -> Option<&mut HostComponent> {
        self.components.iter_mut().find(|c| c.component_name == component_name)
    }
}
