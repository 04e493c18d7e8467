use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use dslab_core::context::SimulationContext;
use dslab_core::simulation::Simulation;
use sugars::{rc, refcell};
use crate::api_server::APIServer;
use crate::errors::SimulationError;
use crate::events::api_server::HostComponentStateChanged;
use crate::events::widget::WidgetDestroy;
use crate::host::HostComponentState;
use crate::layout_reader::WidgetLayout;
use crate::simulation_config::{SimulationConfig, WidgetDefinition};
use crate::simulation_metrics::MetricsLogger;
use crate::widget::Widget;
use crate::widget_load_aggregator::WidgetLoadAggregator;

/// A dashboard page: widgets, the request aggregator and the API server behind it.
pub struct DashboardSimulation {
    aggregator: Rc<RefCell<WidgetLoadAggregator>>,
    api_server: Rc<RefCell<APIServer>>,
    widgets: BTreeMap<u32, Rc<RefCell<Widget>>>,

    sim: Simulation,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,

    last_widget_id: u64,
}

impl DashboardSimulation {
    /// Creates a simulation with specified config, widgets of the config are rendered right away.
    pub fn new(mut sim: Simulation, sim_config: SimulationConfig, metrics_logger: Box<dyn MetricsLogger>) -> Self {
        let sim_config = rc!(sim_config);

        let api_server = rc!(refcell!(
            APIServer::new(sim.create_context("api_server"), sim_config.clone())
        ));
        sim.add_handler("api_server", api_server.clone());

        let aggregator = rc!(refcell!(
            WidgetLoadAggregator::new(sim.create_context("aggregator"), sim_config.clone(), metrics_logger)
        ));
        sim.add_handler("aggregator", aggregator.clone());

        let ctx = sim.create_context("simulation");
        let mut sim = Self {
            aggregator,
            api_server,
            widgets: BTreeMap::new(),
            sim,
            ctx,
            sim_config,
            last_widget_id: 0,
        };

        for definition in sim.sim_config.widgets.clone() {
            sim.add_widget(definition);
        }

        sim
    }

    /// Add a widget to the page, return its id
    pub fn add_widget(&mut self, definition: WidgetDefinition) -> u32 {
        self.last_widget_id += 1;
        let name = format!("widget_{}", self.last_widget_id);
        let widget_ctx = self.sim.create_context(&name);
        let widget = Widget::new(definition, self.aggregator.clone(), self.api_server.borrow().id,
                                 widget_ctx, self.sim_config.clone());
        let id = widget.borrow().id;
        self.sim.add_handler(name, widget.clone());
        self.widgets.insert(id, widget);
        id
    }

    /// Add every widget of the layout, return their ids
    pub fn add_layout(&mut self, layout: &WidgetLayout) -> Vec<u32> {
        layout.widgets.iter()
            .map(|definition| self.add_widget(definition.clone()))
            .collect()
    }

    pub fn destroy_widget(&self, widget_id: u32, delay: f64) {
        self.ctx.emit(WidgetDestroy {}, widget_id, delay);
    }

    pub fn stop_host_component(&self, host_name: &str, component_name: &str, delay: f64) {
        self.change_host_component_state(host_name, component_name, HostComponentState::Installed, delay);
    }

    pub fn start_host_component(&self, host_name: &str, component_name: &str, delay: f64) {
        self.change_host_component_state(host_name, component_name, HostComponentState::Started, delay);
    }

    fn change_host_component_state(&self, host_name: &str, component_name: &str,
                                   state: HostComponentState, delay: f64) {
        self.ctx.emit(HostComponentStateChanged {
            host_name: host_name.to_string(),
            component_name: component_name.to_string(),
            state,
        }, self.api_server.borrow().id, self.sim_config.message_delay + delay);
    }

    pub fn widget(&self, widget_id: u32) -> Option<Rc<RefCell<Widget>>> {
        self.widgets.get(&widget_id).cloned()
    }

    pub fn widget_ids(&self) -> Vec<u32> {
        self.widgets.keys().copied().collect()
    }

    pub fn aggregator(&self) -> Rc<RefCell<WidgetLoadAggregator>> {
        self.aggregator.clone()
    }

    pub fn api_server(&self) -> Rc<RefCell<APIServer>> {
        self.api_server.clone()
    }

    /// Performs the specified number of steps through the simulation (see dslab-core docs).
    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) {
        self.sim.step_until_no_events();
    }

    /// Steps through the simulation with duration limit (see dslab-core docs).
    pub fn step_for_duration(&mut self, time: f64) {
        self.sim.step_for_duration(time);
    }

    /// Steps through the simulation until the specified time (see dslab-core docs).
    pub fn step_until_time(&mut self, time: f64) {
        self.sim.step_until_time(time);
    }

    /// Returns the total number of created events.
    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }

    /// Returns the current simulation time.
    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    /// Logs the final metrics snapshot and saves the metrics log.
    pub fn finish_simulation(&mut self, path: &str) -> Result<(), SimulationError> {
        self.aggregator.borrow_mut().finish_and_save_log_metrics(path)
    }
}
