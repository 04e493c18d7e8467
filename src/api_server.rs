//! Representation of the cluster management REST API serving widget metrics

use std::collections::BTreeMap;
use std::rc::Rc;
use dslab_core::{cast, Event, EventHandler, SimulationContext};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{json, Map, Value};
use crate::errors::ApiError;
use crate::events::api_server::{HostComponentStateChanged, MetricsRequest, MetricsResponse};
use crate::host::{Host, HostComponent, HostComponentState};
use crate::simulation_config::{ComponentConfig, SimulationConfig};
use crate::widget_request::{RequestData, StartCall};

/// Data of a widget metrics AJAX call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    #[serde(skip)]
    pub call: StartCall,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    pub component_name: String,
    pub metric_paths: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_component_criteria: Option<String>,
}

impl MetricsQuery {
    pub fn new(call: StartCall, data: &RequestData) -> Self {
        let metric_paths = data.metric_paths.join(",");
        match call {
            StartCall::ServiceComponentMetrics => Self {
                call,
                service_name: data.service_name.clone(),
                component_name: data.component_name.clone(),
                metric_paths,
                host_component_criteria: None,
            },
            StartCall::HostComponentMetrics => Self {
                call,
                service_name: None,
                component_name: data.component_name.clone(),
                metric_paths,
                host_component_criteria: data.host_component_criteria.clone(),
            },
        }
    }

    /// REST call name, e.g. `widgets.serviceComponent.metrics.get`.
    pub fn name(&self) -> &'static str {
        self.call.call_name()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunction {
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "sum" => Some(AggregateFunction::Sum),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let result = match self {
            AggregateFunction::Sum => values.iter().sum(),
            AggregateFunction::Avg => values.iter().sum::<f64>() / values.len() as f64,
            AggregateFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggregateFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(result)
    }
}

/// Longest series a temporal metric path may ask for.
pub const MAX_SERIES_POINTS: usize = 10_000;

/// `[start,end,step]` suffix of a temporal metric path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemporalRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl TemporalRange {
    /// Finite bounds, a positive step that still advances time at `end`, `start <= end`
    /// and fewer than [`MAX_SERIES_POINTS`] steps.
    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.step.is_finite()
            && self.step > 0.0 && self.start <= self.end
            && self.end + self.step > self.end
            && (self.end - self.start) / self.step < MAX_SERIES_POINTS as f64
    }

    pub fn timestamps(&self) -> Vec<f64> {
        if !self.is_valid() {
            return Vec::new();
        }
        let count = ((self.end - self.start) / self.step).floor() as usize + 1;
        (0..count).map(|i| self.start + i as f64 * self.step).collect()
    }
}

/// Parsed metric path of a request.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricPathSpec {
    /// Path the metric is registered under.
    pub metric_path: String,
    /// Path the value is reported under (keeps the aggregate suffix).
    pub response_path: String,
    pub aggregate: Option<AggregateFunction>,
    pub range: Option<TemporalRange>,
}

impl MetricPathSpec {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let raw = raw.trim();
        let invalid = || ApiError::InvalidMetricPath(raw.to_string());

        let (path, range) = match raw.strip_suffix(']') {
            Some(stripped) => {
                let open = stripped.rfind('[').ok_or_else(invalid)?;
                let bounds = stripped[open + 1..]
                    .split(',')
                    .map(|bound| bound.trim().parse::<f64>())
                    .collect::<Result<Vec<f64>, _>>()
                    .map_err(|_| invalid())?;
                if bounds.len() != 3 {
                    return Err(invalid());
                }
                let range = TemporalRange { start: bounds[0], end: bounds[1], step: bounds[2] };
                if !range.is_valid() {
                    return Err(invalid());
                }
                (&stripped[..open], Some(range))
            }
            None => (raw, None),
        };
        if path.is_empty() {
            return Err(invalid());
        }

        let (metric_path, aggregate) = match path.rsplit_once("._") {
            Some((base, suffix)) => match AggregateFunction::from_suffix(suffix) {
                Some(aggregate) => (base, Some(aggregate)),
                None => (path, None),
            },
            None => (path, None),
        };

        Ok(Self {
            metric_path: metric_path.to_string(),
            response_path: path.to_string(),
            aggregate,
            range,
        })
    }
}

/// Splits the comma joined `metricPaths`, keeping temporal ranges intact.
pub fn split_metric_paths(metric_paths: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in metric_paths.chars() {
        match c {
            '[' => { depth += 1; current.push(c); }
            ']' => { depth = depth.saturating_sub(1); current.push(c); }
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    paths.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        paths.push(current.trim().to_string());
    }
    paths
}

/// Inserts `value` into nested objects following the `/` separated path.
pub fn insert_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };
    let mut node = root;
    for segment in parents {
        let entry = node.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        node = match entry.as_object_mut() {
            Some(object) => object,
            None => return,
        };
    }
    node.insert(leaf.to_string(), value);
}

/// Looks a `/` separated path up in nested objects.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |node, segment| node.get(segment))
}

pub struct APIServer {
    pub id: u32,
    hosts: BTreeMap<String, Host>,

    served_requests: u64,
    failed_requests: u64,

    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl APIServer {
    pub fn new(ctx: SimulationContext, sim_config: Rc<SimulationConfig>) -> Self {
        let mut api_server = Self {
            id: ctx.id(),
            hosts: BTreeMap::default(),
            served_requests: 0,
            failed_requests: 0,
            ctx,
            sim_config: sim_config.clone(),
        };
        for component in sim_config.components.iter() {
            api_server.add_component(component);
        }
        api_server
    }

    /// Deploy a service component on its hosts
    pub fn add_component(&mut self, config: &ComponentConfig) {
        for host_config in config.hosts.iter() {
            let metrics = config.metrics.iter()
                .chain(host_config.metrics.iter())
                .map(|(path, model)| (path.clone(), model.build()))
                .collect();
            let component = HostComponent::new(&config.service_name, &config.component_name,
                                               &host_config.name, host_config.properties.clone(), metrics);
            self.hosts
                .entry(host_config.name.clone())
                .or_insert_with(|| Host::new(&host_config.name))
                .add_component(component);
        }
    }

    /// Start or stop a host component, returns false if there is no such host component
    pub fn set_host_component_state(&mut self, host_name: &str, component_name: &str,
                                    state: HostComponentState) -> bool {
        match self.hosts.get_mut(host_name).and_then(|host| host.component_mut(component_name)) {
            Some(component) => {
                component.state = state;
                true
            }
            None => false,
        }
    }

    pub fn host_component_state(&self, host_name: &str, component_name: &str) -> Option<HostComponentState> {
        self.hosts.get(host_name)?
            .components.iter()
            .find(|component| component.component_name == component_name)
            .map(|component| component.state)
    }

    pub fn host_names(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }

    pub fn served_requests(&self) -> u64 {
        self.served_requests
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed_requests
    }

    pub fn handle_query(&mut self, query: &MetricsQuery) -> Result<Value, ApiError> {
        let specs = split_metric_paths(&query.metric_paths)
            .iter()
            .map(|path| MetricPathSpec::parse(path))
            .collect::<Result<Vec<_>, _>>()?;
        match query.call {
            StartCall::ServiceComponentMetrics => self.service_component_metrics(query, &specs),
            StartCall::HostComponentMetrics => self.host_component_metrics(query, &specs),
        }
    }

    fn service_component_metrics(&mut self, query: &MetricsQuery, specs: &[MetricPathSpec]) -> Result<Value, ApiError> {
        let time = self.ctx.time();
        let mut components: Vec<&mut HostComponent> = self.hosts.values_mut()
            .flat_map(|host| host.components.iter_mut())
            .filter(|component| component.component_name == query.component_name &&
                query.service_name.as_ref().map_or(true, |service| *service == component.service_name))
            .collect();
        if components.is_empty() {
            return Err(ApiError::ComponentNotFound {
                service_name: query.service_name.clone(),
                component_name: query.component_name.clone(),
            });
        }

        let mut root = Map::new();
        let started = components.iter().filter(|component| component.is_started()).count();
        root.insert("ServiceComponentInfo".to_string(), json!({
            "service_name": components[0].service_name,
            "component_name": query.component_name,
            "started_count": started,
            "total_count": components.len(),
        }));

        for spec in specs {
            if !components.iter().any(|component| component.has_metric(&spec.metric_path)) {
                continue;
            }
            let aggregate = spec.aggregate.unwrap_or(AggregateFunction::Avg);
            let mut sample = |at: f64| {
                let values: Vec<f64> = components.iter_mut()
                    .filter_map(|component| component.metric_value(&spec.metric_path, at))
                    .collect();
                aggregate.apply(&values)
            };
            let value = match spec.range {
                None => sample(time).map(|value| json!(value)),
                Some(range) => {
                    let series: Vec<Value> = range.timestamps().into_iter()
                        .filter_map(|at| sample(at).map(|value| json!([value, at])))
                        .collect();
                    if series.is_empty() { None } else { Some(Value::Array(series)) }
                }
            };
            if let Some(value) = value {
                insert_path(&mut root, &spec.response_path, value);
            }
        }
        Ok(Value::Object(root))
    }

    fn host_component_metrics(&mut self, query: &MetricsQuery, specs: &[MetricPathSpec]) -> Result<Value, ApiError> {
        let time = self.ctx.time();
        let criteria = query.host_component_criteria.as_deref().unwrap_or("");

        let mut target: Option<&mut HostComponent> = None;
        'search: for host in self.hosts.values_mut() {
            for component in host.components.iter_mut() {
                if component.component_name == query.component_name && component.matches_criteria(criteria)? {
                    target = Some(component);
                    break 'search;
                }
            }
        }
        let Some(component) = target else {
            return Ok(json!({ "items": [] }));
        };

        let mut item = Map::new();
        item.insert("HostRoles".to_string(), component.host_roles());
        for spec in specs {
            let value = match spec.range {
                None => component.metric_value(&spec.metric_path, time).map(|value| json!(value)),
                Some(range) => {
                    let series: Vec<Value> = range.timestamps().into_iter()
                        .filter_map(|at| component.metric_value(&spec.metric_path, at).map(|value| json!([value, at])))
                        .collect();
                    if series.is_empty() { None } else { Some(Value::Array(series)) }
                }
            };
            if let Some(value) = value {
                insert_path(&mut item, &spec.response_path, value);
            }
        }
        Ok(json!({ "items": [Value::Object(item)] }))
    }
}

impl EventHandler for APIServer {
    fn on(&mut self, event: Event) {
        let request_id = event.id;
        cast!(match event.data {
            MetricsRequest { query, reply_to } => {
                debug!("[{:.3}] {} {}", self.ctx.time(), query.name(), query.metric_paths);
                let result = self.handle_query(&query);
                self.served_requests += 1;
                if let Err(error) = &result {
                    self.failed_requests += 1;
                    warn!("[{:.3}] {} failed: {}", self.ctx.time(), query.name(), error);
                }
                self.ctx.emit(MetricsResponse { request_id, result }, reply_to,
                              self.sim_config.api_processing_time + self.sim_config.message_delay);
            }
            HostComponentStateChanged { host_name, component_name, state } => {
                if !self.set_host_component_state(&host_name, &component_name, state) {
                    warn!("[{:.3}] unknown host component {} on {}", self.ctx.time(), component_name, host_name);
                }
            }
        })
    }
}
