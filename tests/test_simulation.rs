use dslab_core::Simulation;
use widget_load_simulator::errors::ConfigError;
use widget_load_simulator::host::HostComponentState;
use widget_load_simulator::layout_reader::WidgetLayout;
use widget_load_simulator::simulation::DashboardSimulation;
use widget_load_simulator::simulation_config::{SimulationConfig, WidgetDefinition, WidgetMetric};
use widget_load_simulator::simulation_metrics::{EmptyMetricsLogger, FileMetricsLogger};
use widget_load_simulator::widget::WidgetState;
use widget_load_simulator::widget_request::WidgetKind;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn get_config() -> SimulationConfig {
    SimulationConfig::from_file(&name_wrapper("config.yaml")).unwrap()
}

fn get_default_simulation() -> DashboardSimulation {
    DashboardSimulation::new(Simulation::new(42), get_config(), Box::new(EmptyMetricsLogger {}))
}

fn region_server_metric(name: &str, metric_path: &str) -> WidgetMetric {
    WidgetMetric::new(name, metric_path, "HBASE", "HBASE_REGIONSERVER")
}

fn requests_widget(widget_name: &str) -> WidgetDefinition {
    WidgetDefinition::new(widget_name, WidgetKind::Number)
        .with_metric(region_server_metric("requests", "metrics/hbase/regionserver/requests"))
        .with_metric(region_server_metric("regions", "metrics/hbase/regionserver/regions"))
        .with_value("Total", "${requests + regions}")
        .with_value("Ratio", "${regions / requests}")
}

#[test]
fn test_widgets_rendered_together_share_one_call() {
    let mut dashboard_sim = get_default_simulation();
    let widget_1 = dashboard_sim.add_widget(requests_widget("first"));
    let widget_2 = dashboard_sim.add_widget(requests_widget("second"));
    let widget_3 = dashboard_sim.add_widget(WidgetDefinition::new("third", WidgetKind::Gauge)
        .with_metric(region_server_metric("requests", "metrics/hbase/regionserver/requests"))
        .with_value("Requests", "${requests}"));
    dashboard_sim.step_until_no_events();

    assert_eq!(dashboard_sim.api_server().borrow().served_requests(), 1);
    assert_eq!(dashboard_sim.aggregator().borrow().stats().calls_issued, 1);
    assert_eq!(dashboard_sim.aggregator().borrow().stats().requests_added, 3);
    for widget_id in [widget_1, widget_2] {
        let widget = dashboard_sim.widget(widget_id).unwrap();
        let widget = widget.borrow();
        assert!(widget.is_loaded());
        assert_eq!(widget.value("Total"), Some("14"));
        assert_eq!(widget.value("Ratio"), Some("0.40"));
    }
    let widget = dashboard_sim.widget(widget_3).unwrap();
    assert_eq!(widget.borrow().value("Requests"), Some("10"));
    assert!((dashboard_sim.current_time() - 0.7).abs() < 1e-9);
}

#[test]
fn test_widgets_rendered_apart_use_separate_calls() {
    let mut dashboard_sim = get_default_simulation();
    dashboard_sim.add_widget(requests_widget("first"));
    dashboard_sim.add_widget(requests_widget("second").with_render_delay(5.0));
    dashboard_sim.step_until_no_events();

    assert_eq!(dashboard_sim.api_server().borrow().served_requests(), 2);
    assert_eq!(dashboard_sim.aggregator().borrow().stats().flush_cycles, 2);
}

#[test]
fn test_graph_widgets_get_own_call() {
    let mut dashboard_sim = get_default_simulation();
    dashboard_sim.add_widget(requests_widget("numbers"));
    let graph_id = dashboard_sim.add_widget(WidgetDefinition::new("cpu", WidgetKind::Graph)
        .with_metric(region_server_metric("cpu_user", "metrics/cpu/cpu_user"))
        .with_value("CPU", "${cpu_user}")
        .with_render_delay(0.0));
    dashboard_sim.step_until_no_events();

    assert_eq!(dashboard_sim.api_server().borrow().served_requests(), 2);
    let graph = dashboard_sim.widget(graph_id).unwrap();
    assert!(graph.borrow().is_loaded());
    assert_eq!(graph.borrow().series("CPU").map(|series| series.len()), Some(1));
}

#[test]
fn test_graph_series() {
    let mut dashboard_sim = get_default_simulation();
    let graph_id = dashboard_sim.add_widget(WidgetDefinition::new("cpu", WidgetKind::Graph)
        .with_metric(region_server_metric("cpu_user", "metrics/cpu/cpu_user"))
        .with_value("CPU", "${cpu_user * 2}")
        .with_render_delay(100.0));
    dashboard_sim.step_until_no_events();

    let graph = dashboard_sim.widget(graph_id).unwrap();
    let graph = graph.borrow();
    let series = graph.series("CPU").unwrap();
    let expected = [[40.0, 40.0], [55.0, 55.0], [70.0, 70.0], [85.0, 85.0], [100.0, 100.0]];
    assert_eq!(series.len(), expected.len());
    for (point, expected) in series.iter().zip(expected.iter()) {
        assert!((point[0] - expected[0]).abs() < 1e-9);
        assert_eq!(point[1], expected[1]);
    }
}

#[test]
fn test_host_component_criteria() {
    let mut dashboard_sim = get_default_simulation();
    let widget_id = dashboard_sim.add_widget(WidgetDefinition::new("active", WidgetKind::Number)
        .with_metric(region_server_metric("requests", "metrics/hbase/regionserver/requests")
            .with_criteria("HostRoles/ha_state=STANDBY"))
        .with_value("Requests", "${requests}"));
    dashboard_sim.step_until_no_events();

    let widget = dashboard_sim.widget(widget_id).unwrap();
    assert_eq!(widget.borrow().value("Requests"), Some("10"));
    assert_eq!(dashboard_sim.api_server().borrow().served_requests(), 1);
}

fn queue_widget(widget_name: &str, criteria: &str) -> WidgetDefinition {
    WidgetDefinition::new(widget_name, WidgetKind::Number)
        .with_metric(region_server_metric("queue", "metrics/hbase/regionserver/queue").with_criteria(criteria))
        .with_value("Queue", "${queue}")
}

#[test]
fn test_merged_criteria_follow_first_widget() {
    let mut dashboard_sim = get_default_simulation();
    let active = dashboard_sim.add_widget(queue_widget("active", "HostRoles/ha_state=ACTIVE"));
    let standby = dashboard_sim.add_widget(queue_widget("standby", "HostRoles/ha_state=STANDBY"));
    dashboard_sim.step_until_no_events();

    assert_eq!(dashboard_sim.api_server().borrow().served_requests(), 1);
    // host1 reports 1, host2 overrides the metric with 2
    assert_eq!(dashboard_sim.widget(active).unwrap().borrow().value("Queue"), Some("1"));
    assert_eq!(dashboard_sim.widget(standby).unwrap().borrow().value("Queue"), Some("1"));

    let mut dashboard_sim = get_default_simulation();
    let standby = dashboard_sim.add_widget(queue_widget("standby", "HostRoles/ha_state=STANDBY"));
    dashboard_sim.step_until_no_events();
    assert_eq!(dashboard_sim.widget(standby).unwrap().borrow().value("Queue"), Some("2"));
}

#[test]
fn test_stopped_components_report_nothing() {
    let mut dashboard_sim = get_default_simulation();
    dashboard_sim.stop_host_component("host1", "HBASE_REGIONSERVER", 0.0);
    dashboard_sim.stop_host_component("host2", "HBASE_REGIONSERVER", 0.0);
    let widget_id = dashboard_sim.add_widget(requests_widget("stopped").with_render_delay(1.0));
    dashboard_sim.step_until_no_events();

    assert_eq!(dashboard_sim.api_server().borrow().host_component_state("host1", "HBASE_REGIONSERVER"),
               Some(HostComponentState::Installed));
    let widget = dashboard_sim.widget(widget_id).unwrap();
    assert!(widget.borrow().is_loaded());
    assert_eq!(widget.borrow().value("Total"), Some("n/a"));

    dashboard_sim.start_host_component("host1", "HBASE_REGIONSERVER", 0.0);
    dashboard_sim.step_until_no_events();
    assert_eq!(dashboard_sim.api_server().borrow().host_component_state("host1", "HBASE_REGIONSERVER"),
               Some(HostComponentState::Started));
}

#[test]
fn test_unknown_component() {
    let mut dashboard_sim = get_default_simulation();
    let widget_id = dashboard_sim.add_widget(WidgetDefinition::new("unknown", WidgetKind::Number)
        .with_metric(WidgetMetric::new("value", "metrics/value", "YARN", "RESOURCEMANAGER"))
        .with_value("Value", "${value}"));
    dashboard_sim.step_until_no_events();

    let widget = dashboard_sim.widget(widget_id).unwrap();
    assert!(widget.borrow().is_loaded());
    assert_eq!(widget.borrow().failed_loads(), 1);
    assert_eq!(widget.borrow().value("Value"), Some("n/a"));
    assert_eq!(dashboard_sim.api_server().borrow().failed_requests(), 1);
    assert_eq!(dashboard_sim.aggregator().borrow().stats().failed_responses, 1);
}

#[test]
fn test_widget_destroyed_before_flush() {
    let mut dashboard_sim = get_default_simulation();
    let widget_id = dashboard_sim.add_widget(requests_widget("short-lived"));
    dashboard_sim.destroy_widget(widget_id, 0.2);
    dashboard_sim.step_until_no_events();

    let widget = dashboard_sim.widget(widget_id).unwrap();
    assert_eq!(widget.borrow().state(), WidgetState::Destroyed);
    assert!(!widget.borrow().is_loaded());
    assert_eq!(dashboard_sim.api_server().borrow().served_requests(), 0);
    assert_eq!(dashboard_sim.aggregator().borrow().stats().groups_skipped, 1);
}

#[test]
fn test_widget_refresh() {
    let mut config = get_config();
    config.widget_refresh_interval = 15.0;
    let mut dashboard_sim = DashboardSimulation::new(Simulation::new(42), config, Box::new(EmptyMetricsLogger {}));
    let widget_1 = dashboard_sim.add_widget(requests_widget("first"));
    dashboard_sim.add_widget(requests_widget("second"));
    dashboard_sim.step_for_duration(40.0);

    assert_eq!(dashboard_sim.widget(widget_1).unwrap().borrow().load_count(), 3);
    assert_eq!(dashboard_sim.api_server().borrow().served_requests(), 3);

    dashboard_sim.destroy_widget(widget_1, 0.0);
    dashboard_sim.step_for_duration(15.0);
    assert_eq!(dashboard_sim.widget(widget_1).unwrap().borrow().load_count(), 3);
}

#[test]
fn test_layout() {
    let mut dashboard_sim = get_default_simulation();
    let layout = WidgetLayout::from_file(&name_wrapper("layout.json")).unwrap();
    assert_eq!(layout.layout_name, "default_hbase_dashboard");
    let widget_ids = dashboard_sim.add_layout(&layout);
    assert_eq!(widget_ids.len(), 3);
    dashboard_sim.step_until_no_events();

    // one call for HBASE_REGIONSERVER, one for NAMENODE
    assert_eq!(dashboard_sim.api_server().borrow().served_requests(), 2);
    let heap = dashboard_sim.widget(widget_ids[2]).unwrap();
    assert_eq!(heap.borrow().value("Heap"), Some("512 of 1024 MB"));
    let ratio = dashboard_sim.widget(widget_ids[1]).unwrap();
    assert_eq!(ratio.borrow().value("Ratio"), Some("0.40"));
}

#[test]
fn test_layout_from_json() {
    let layout = WidgetLayout::from_json("inline", r#"{
        "layout_name": "custom",
        "widgets": [{"widget_name": "w", "widget_type": "NUMBER", "render_delay": 2.5}]
    }"#).unwrap();
    assert_eq!(layout.section_name, "");
    assert_eq!(layout.widgets[0].render_delay, 2.5);
    assert_eq!(layout.widgets[0].widget_type, WidgetKind::Number);

    assert!(matches!(WidgetLayout::from_json("inline", r#"{"widgets": []}"#), Err(ConfigError::Json { .. })));
    assert!(matches!(WidgetLayout::from_json("inline", r#"{
        "layout_name": "custom",
        "widgets": [{"widget_name": "w", "widget_type": "NUMBER", "render_delay": -1}]
    }"#), Err(ConfigError::Invalid { .. })));
    assert!(matches!(WidgetLayout::from_file(&name_wrapper("missing.json")), Err(ConfigError::Io { .. })));
}

#[test]
fn test_metrics_log() {
    let mut dashboard_sim = DashboardSimulation::new(Simulation::new(42), get_config(),
                                                     Box::new(FileMetricsLogger::new(10.)));
    dashboard_sim.add_widget(requests_widget("first"));
    dashboard_sim.add_widget(requests_widget("second"));
    dashboard_sim.step_for_duration(25.0);

    let path = std::env::temp_dir().join("widget_load_simulator_metrics.json");
    let path = path.to_str().unwrap();
    dashboard_sim.finish_simulation(path).unwrap();

    let content = std::fs::read_to_string(path).unwrap();
    let log: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
    assert!(log.len() >= 2);
    let last = log.last().unwrap();
    assert_eq!(last["requests_added"], 2);
    assert_eq!(last["calls_issued"], 1);
    assert_eq!(last["responses_delivered"], 2);
    assert!((last["load_latency_p50"].as_f64().unwrap() - 0.7).abs() < 1e-9);
}
