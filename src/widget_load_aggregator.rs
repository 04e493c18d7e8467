//! Batches metric requests of widgets rendered within a short window.
//!
//! Widgets call [`WidgetLoadAggregator::add`] while they render or refresh. The first
//! request of a cycle schedules a [`FlushWidgetRequests`] self-event, later requests
//! ride along with it. On flush the buffered requests are merged by call, component
//! and (for separately grouped widget kinds) widget kind, and every group is sent as
//! a single call through one of its widgets. The response is handed to every widget
//! of the group.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::mem;
use std::rc::Rc;
use dslab_core::{cast, Event, EventHandler, SimulationContext};
use log::{debug, warn};
use crate::errors::SimulationError;
use crate::events::aggregator::FlushWidgetRequests;
use crate::events::api_server::MetricsResponse;
use crate::events::logger::MetricsSnapshot;
use crate::simulation_config::SimulationConfig;
use crate::simulation_metrics::{Metrics, MetricsLogger};
use crate::widget_request::{RequestData, StartCall, WidgetKind, WidgetRequest};

/// Key of a request group, displayed as `<startCallName>_<component>[_<kind>]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub start_call: StartCall,
    pub component_name: String,
    pub kind: Option<WidgetKind>,
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}_{}", self.start_call, self.component_name)?;
        if let Some(kind) = self.kind {
            write!(f, "_{}", kind)?;
        }
        Ok(())
    }
}

/// Requests folded into one call.
#[derive(Clone)]
pub struct RequestGroup {
    pub start_call: StartCall,
    pub data: RequestData,
    pub sub_requests: Vec<WidgetRequest>,
    criteria_conflict: bool,
}

impl RequestGroup {
    fn new(request: &WidgetRequest) -> Self {
        let mut data = request.data.clone();
        data.metric_paths.clear();
        let mut group = Self {
            start_call: request.start_call,
            data,
            sub_requests: Vec::new(),
            criteria_conflict: false,
        };
        group.fold(request);
        group
    }

    fn fold(&mut self, request: &WidgetRequest) {
        for path in request.data.metric_paths.iter() {
            if !self.data.metric_paths.contains(path) {
                self.data.metric_paths.push(path.clone());
            }
        }
        // the first member's criteria win
        if self.data.host_component_criteria != request.data.host_component_criteria {
            self.criteria_conflict = true;
        }
        self.sub_requests.push(request.clone());
    }

    /// Whether members asked for different host component criteria.
    pub fn has_criteria_conflict(&self) -> bool {
        self.criteria_conflict
    }
}

/// Groups requests by call, component and separately grouped widget kind.
/// Metric paths are merged in first-seen order without duplicates.
pub fn group_requests(requests: &[WidgetRequest], separate_kinds: &[WidgetKind]) -> BTreeMap<GroupKey, RequestGroup> {
    let mut groups = BTreeMap::<GroupKey, RequestGroup>::new();
    for request in requests {
        let kind = request.context.borrow().widget_kind();
        let key = GroupKey {
            start_call: request.start_call,
            component_name: request.data.component_name.clone(),
            kind: separate_kinds.contains(&kind).then_some(kind),
        };
        match groups.get_mut(&key) {
            Some(group) => group.fold(request),
            None => {
                groups.insert(key, RequestGroup::new(request));
            }
        }
    }
    groups
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub requests_added: u64,
    pub flush_cycles: u64,
    pub calls_issued: u64,
    pub groups_skipped: u64,
    pub responses_delivered: u64,
    pub failed_responses: u64,
}

pub struct WidgetLoadAggregator {
    pub id: u32,
    requests: Vec<WidgetRequest>,
    timer: Option<u64>,
    in_flight: HashMap<u64, RequestGroup>,

    stats: AggregatorStats,
    load_latencies: Vec<f64>,
    metrics_logger: Box<dyn MetricsLogger>,

    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl WidgetLoadAggregator {
    pub fn new(ctx: SimulationContext, sim_config: Rc<SimulationConfig>,
               metrics_logger: Box<dyn MetricsLogger>) -> Self {
        if metrics_logger.snapshot_period() > 0.0 {
            ctx.emit_self(MetricsSnapshot {}, metrics_logger.snapshot_period());
        }

        Self {
            id: ctx.id(),
            requests: Vec::new(),
            timer: None,
            in_flight: HashMap::new(),
            stats: AggregatorStats::default(),
            load_latencies: Vec::new(),
            metrics_logger,
            ctx,
            sim_config,
        }
    }

    /// Buffer the request, the first request of a cycle schedules the flush
    pub fn add(&mut self, mut request: WidgetRequest) {
        request.added_at = self.ctx.time();
        self.requests.push(request);
        self.stats.requests_added += 1;
        if self.timer.is_none() {
            self.timer = Some(self.ctx.emit_self(FlushWidgetRequests {}, self.sim_config.aggregator_delay));
        }
    }

    pub fn pending_requests(&self) -> &[WidgetRequest] {
        &self.requests
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.timer.is_some()
    }

    pub fn in_flight_calls(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    pub fn flush(&mut self) {
        let requests = mem::take(&mut self.requests);
        self.timer = None;
        self.stats.flush_cycles += 1;
        let groups = group_requests(&requests, &self.sim_config.separately_grouped_kinds);
        self.run_requests(groups);
    }

    /// Issue one call per group through a widget which is still alive
    pub fn run_requests(&mut self, groups: BTreeMap<GroupKey, RequestGroup>) {
        for (key, group) in groups {
            if group.has_criteria_conflict() {
                warn!("[{:.3}] group {} folds requests with different host component criteria",
                      self.ctx.time(), key);
            }
            let representative = group.sub_requests.iter()
                .find(|request| !request.context.borrow().is_destroyed());
            let Some(representative) = representative else {
                debug!("[{:.3}] skip group {}, all widgets are destroyed", self.ctx.time(), key);
                self.stats.groups_skipped += 1;
                continue;
            };
            let handle = representative.context.borrow_mut().start_call(group.start_call, &group.data);
            debug!("[{:.3}] group {} of {} requests sent as call {}", self.ctx.time(), key,
                   group.sub_requests.len(), handle.request_id);
            self.stats.calls_issued += 1;
            self.in_flight.insert(handle.request_id, group);
        }
    }

    /// Hand the response of a call to every live widget of its group
    pub fn complete_call(&mut self, response: MetricsResponse) {
        let Some(group) = self.in_flight.remove(&response.request_id) else {
            debug!("[{:.3}] response to unknown call {}", self.ctx.time(), response.request_id);
            return;
        };
        if response.result.is_err() {
            self.stats.failed_responses += 1;
        }
        for request in group.sub_requests.iter() {
            let mut context = request.context.borrow_mut();
            if context.is_destroyed() {
                continue;
            }
            match &response.result {
                Ok(payload) => context.metrics_loaded(group.start_call, payload),
                Err(error) => context.metrics_load_failed(group.start_call, error),
            }
            context.metrics_load_complete();
            self.stats.responses_delivered += 1;
            self.load_latencies.push(self.ctx.time() - request.added_at);
        }
    }

    pub fn log_metrics(&mut self) {
        let metrics = Metrics::new(self.ctx.time(), self.stats, &mut self.load_latencies);
        self.metrics_logger.log_metrics(metrics);
    }

    pub fn finish_and_save_log_metrics(&mut self, path: &str) -> Result<(), SimulationError> {
        self.log_metrics();
        self.metrics_logger.save_log(path)
    }
}

impl EventHandler for WidgetLoadAggregator {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            FlushWidgetRequests {} => {
                self.flush();
            }
            MetricsResponse { request_id, result } => {
                self.complete_call(MetricsResponse { request_id, result });
            }
            MetricsSnapshot {} => {
                self.log_metrics();

                if self.metrics_logger.snapshot_period() > 0.0 {
                    self.ctx.emit_self(MetricsSnapshot {}, self.metrics_logger.snapshot_period());
                }
            }
        })
    }
}
