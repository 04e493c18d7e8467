//! Metric requests issued by widgets and the capability the aggregator dispatches through.

use std::cell::RefCell;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use serde::{Deserialize, Serialize};
use crate::errors::ApiError;

/// Widget type, as declared by the widget definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WidgetKind {
    Graph,
    Number,
    Gauge,
    Template,
}

impl Display for WidgetKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            WidgetKind::Graph => write!(f, "graph"),
            WidgetKind::Number => write!(f, "number"),
            WidgetKind::Gauge => write!(f, "gauge"),
            WidgetKind::Template => write!(f, "template"),
        }
    }
}

/// Remote operation a request should be sent with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StartCall {
    ServiceComponentMetrics,
    HostComponentMetrics,
}

impl StartCall {
    /// Name of the widget method the call used to be looked up by.
    pub fn method_name(&self) -> &'static str {
        match self {
            StartCall::ServiceComponentMetrics => "getServiceComponentMetrics",
            StartCall::HostComponentMetrics => "getHostComponentMetrics",
        }
    }

    /// Name of the REST call issued for this operation.
    pub fn call_name(&self) -> &'static str {
        match self {
            StartCall::ServiceComponentMetrics => "widgets.serviceComponent.metrics.get",
            StartCall::HostComponentMetrics => "widgets.hostComponent.metrics.get",
        }
    }
}

impl Display for StartCall {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.method_name())
    }
}

/// Payload of a metric request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    pub component_name: String,
    pub metric_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_component_criteria: Option<String>,
}

impl RequestData {
    pub fn new(component_name: &str, metric_paths: Vec<String>) -> Self {
        Self {
            service_name: None,
            component_name: component_name.to_string(),
            metric_paths,
            host_component_criteria: None,
        }
    }

    pub fn with_service(mut self, service_name: &str) -> Self {
        self.service_name = Some(service_name.to_string());
        self
    }

    pub fn with_criteria(mut self, criteria: &str) -> Self {
        self.host_component_criteria = Some(criteria.to_string());
        self
    }
}

/// Handle of an issued call. The response event carries the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallHandle {
    pub request_id: u64,
}

impl CallHandle {
    pub fn new(request_id: u64) -> Self {
        Self { request_id }
    }
}

/// What the aggregator needs from a widget.
pub trait MetricsFetcher {
    fn widget_kind(&self) -> WidgetKind;

    /// Lifecycle flag, checked at dispatch and at fan-out time.
    fn is_destroyed(&self) -> bool;

    /// Issues the remote call for `data`.
    fn start_call(&mut self, call: StartCall, data: &RequestData) -> CallHandle;

    fn metrics_loaded(&mut self, call: StartCall, response: &serde_json::Value);

    fn metrics_load_failed(&mut self, _call: StartCall, _error: &ApiError) {}

    /// Called once per delivered response, after success or failure.
    fn metrics_load_complete(&mut self);
}

/// A single widget request waiting for the next flush.
#[derive(Clone)]
pub struct WidgetRequest {
    pub start_call: StartCall,
    pub data: RequestData,
    pub context: Rc<RefCell<dyn MetricsFetcher>>,
    pub added_at: f64,
}

impl WidgetRequest {
    pub fn new(start_call: StartCall, data: RequestData, context: Rc<RefCell<dyn MetricsFetcher>>) -> Self {
        Self {
            start_call,
            data,
            context,
            added_at: 0.0,
        }
    }
}
