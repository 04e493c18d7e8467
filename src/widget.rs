//! Dashboard widget: loads its metrics through the aggregator and computes its values.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use dslab_core::{cast, Event, EventHandler, SimulationContext};
use log::{debug, warn};
use serde_json::Value;
use crate::api_server::{lookup_path, MetricsQuery};
use crate::errors::ApiError;
use crate::events::api_server::MetricsRequest;
use crate::events::widget::{WidgetDestroy, WidgetRefresh, WidgetRender};
use crate::expression::{calculate_value, evaluate_series, extract_expressions};
use crate::simulation_config::{SimulationConfig, WidgetDefinition};
use crate::widget_load_aggregator::WidgetLoadAggregator;
use crate::widget_request::{CallHandle, MetricsFetcher, RequestData, StartCall, WidgetKind, WidgetRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetState {
    PreRender,
    InDom,
    Destroyed,
}

pub struct Widget {
    pub id: u32,
    definition: WidgetDefinition,
    state: WidgetState,

    /// Metric name to the data found in responses.
    metric_data: BTreeMap<String, Value>,
    values: BTreeMap<String, String>,
    series: BTreeMap<String, Vec<[f64; 2]>>,

    pending_requests: usize,
    is_loaded: bool,
    load_count: u64,
    failed_loads: u64,

    aggregator: Rc<RefCell<WidgetLoadAggregator>>,
    aggregator_id: u32,
    api_server_id: u32,
    this: Weak<RefCell<Widget>>,

    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Widget {
    /// Creates the widget and schedules its render after `definition.render_delay`.
    pub fn new(definition: WidgetDefinition, aggregator: Rc<RefCell<WidgetLoadAggregator>>, api_server_id: u32,
               ctx: SimulationContext, sim_config: Rc<SimulationConfig>) -> Rc<RefCell<Self>> {
        let aggregator_id = aggregator.borrow().id;
        ctx.emit_self(WidgetRender {}, definition.render_delay);

        Rc::new_cyclic(|this| RefCell::new(Self {
            id: ctx.id(),
            definition,
            state: WidgetState::PreRender,
            metric_data: BTreeMap::new(),
            values: BTreeMap::new(),
            series: BTreeMap::new(),
            pending_requests: 0,
            is_loaded: false,
            load_count: 0,
            failed_loads: 0,
            aggregator,
            aggregator_id,
            api_server_id,
            this: this.clone(),
            ctx,
            sim_config,
        }))
    }

    pub fn definition(&self) -> &WidgetDefinition {
        &self.definition
    }

    pub fn state(&self) -> WidgetState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn load_count(&self) -> u64 {
        self.load_count
    }

    pub fn failed_loads(&self) -> u64 {
        self.failed_loads
    }

    pub fn pending_requests(&self) -> usize {
        self.pending_requests
    }

    pub fn metric_data(&self, metric_name: &str) -> Option<&Value> {
        self.metric_data.get(metric_name)
    }

    pub fn value(&self, value_name: &str) -> Option<&str> {
        self.values.get(value_name).map(String::as_str)
    }

    pub fn series(&self, value_name: &str) -> Option<&[[f64; 2]]> {
        self.series.get(value_name).map(Vec::as_slice)
    }

    /// Metrics of the widget grouped by `<service>_<component>[_<criteria>]`.
    pub fn get_request_data(&self) -> BTreeMap<String, RequestData> {
        let mut requests = BTreeMap::<String, RequestData>::new();
        for metric in self.definition.metrics.iter() {
            let mut key = format!("{}_{}", metric.service_name, metric.component_name);
            if let Some(criteria) = &metric.host_component_criteria {
                key = format!("{}_{}", key, criteria);
            }
            let data = requests.entry(key).or_insert_with(|| {
                let data = RequestData::new(&metric.component_name, Vec::new()).with_service(&metric.service_name);
                match &metric.host_component_criteria {
                    Some(criteria) => data.with_criteria(criteria),
                    None => data,
                }
            });
            if !data.metric_paths.contains(&metric.metric_path) {
                data.metric_paths.push(metric.metric_path.clone());
            }
        }
        requests
    }

    /// Hand every request of the widget to the aggregator
    pub fn load_metrics(&mut self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let context: Rc<RefCell<dyn MetricsFetcher>> = this;
        let requests = self.get_request_data();
        if requests.is_empty() {
            self.finish_loading();
            return;
        }

        let now = self.ctx.time();
        self.pending_requests += requests.len();
        for (_, mut data) in requests {
            let call = match data.host_component_criteria {
                Some(_) => StartCall::HostComponentMetrics,
                None => StartCall::ServiceComponentMetrics,
            };
            if self.definition.widget_type == WidgetKind::Graph {
                let start = (now - self.sim_config.graph_time_range).max(0.0);
                data.metric_paths = data.metric_paths.iter()
                    .map(|path| format!("{}[{},{},{}]", path, start, now, self.sim_config.graph_step))
                    .collect();
            }
            self.aggregator.borrow_mut().add(WidgetRequest::new(call, data, context.clone()));
        }
    }

    pub fn calculate_values(&mut self) {
        self.values.clear();
        self.series.clear();
        for template in self.definition.values.iter() {
            if self.definition.widget_type == WidgetKind::Graph {
                let series = extract_expressions(&template.value)
                    .first()
                    .map(|expression| evaluate_series(expression, &self.metric_data))
                    .unwrap_or_default();
                self.series.insert(template.name.clone(), series);
            } else {
                self.values.insert(template.name.clone(), calculate_value(&template.value, &self.metric_data));
            }
        }
    }

    fn finish_loading(&mut self) {
        self.calculate_values();
        self.is_loaded = true;
        self.load_count += 1;
    }

    fn schedule_refresh(&self) {
        if self.sim_config.widget_refresh_interval > 0.0 {
            self.ctx.emit_self(WidgetRefresh {}, self.sim_config.widget_refresh_interval);
        }
    }
}

impl MetricsFetcher for Widget {
    fn widget_kind(&self) -> WidgetKind {
        self.definition.widget_type
    }

    fn is_destroyed(&self) -> bool {
        self.state == WidgetState::Destroyed
    }

    fn start_call(&mut self, call: StartCall, data: &RequestData) -> CallHandle {
        let query = MetricsQuery::new(call, data);
        let request_id = self.ctx.emit(MetricsRequest { query, reply_to: self.aggregator_id },
                                       self.api_server_id, self.sim_config.message_delay);
        CallHandle::new(request_id)
    }

    fn metrics_loaded(&mut self, call: StartCall, response: &Value) {
        let (root, component_name) = match call {
            StartCall::ServiceComponentMetrics => (
                Some(response),
                response.pointer("/ServiceComponentInfo/component_name").and_then(Value::as_str),
            ),
            StartCall::HostComponentMetrics => {
                let item = response.pointer("/items/0");
                (item, item.and_then(|item| item.pointer("/HostRoles/component_name")).and_then(Value::as_str))
            }
        };
        let Some(root) = root else {
            return;
        };
        let host_call = call == StartCall::HostComponentMetrics;
        for metric in self.definition.metrics.iter() {
            if metric.host_component_criteria.is_some() != host_call
                || component_name.map_or(false, |name| name != metric.component_name) {
                continue;
            }
            if let Some(data) = lookup_path(root, &metric.metric_path) {
                self.metric_data.insert(metric.name.clone(), data.clone());
            }
        }
    }

    fn metrics_load_failed(&mut self, call: StartCall, error: &ApiError) {
        warn!("[{:.3}] widget {} failed to load metrics with {}: {}", self.ctx.time(),
              self.definition.widget_name, call, error);
        self.failed_loads += 1;
    }

    fn metrics_load_complete(&mut self) {
        self.pending_requests = self.pending_requests.saturating_sub(1);
        if self.pending_requests == 0 {
            self.finish_loading();
        }
    }
}

impl EventHandler for Widget {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            WidgetRender {} => {
                if self.state == WidgetState::PreRender {
                    self.state = WidgetState::InDom;
                    self.load_metrics();
                    self.schedule_refresh();
                }
            }
            WidgetRefresh {} => {
                if self.state == WidgetState::InDom {
                    if self.pending_requests == 0 {
                        self.load_metrics();
                    } else {
                        debug!("[{:.3}] widget {} is still loading, refresh skipped", self.ctx.time(),
                               self.definition.widget_name);
                    }
                    self.schedule_refresh();
                }
            }
            WidgetDestroy {} => {
                self.state = WidgetState::Destroyed;
            }
        })
    }
}
