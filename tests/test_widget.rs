use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use dslab_core::Simulation;
use serde_json::{json, Value};
use sugars::{rc, refcell};
use widget_load_simulator::errors::ExpressionError;
use widget_load_simulator::expression::{calculate_value, compute_expression, evaluate, evaluate_series,
                                        extract_expressions, referenced_metrics};
use widget_load_simulator::simulation_config::{SimulationConfig, WidgetDefinition, WidgetMetric};
use widget_load_simulator::simulation_metrics::EmptyMetricsLogger;
use widget_load_simulator::widget::{Widget, WidgetState};
use widget_load_simulator::widget_load_aggregator::WidgetLoadAggregator;
use widget_load_simulator::widget_request::{MetricsFetcher, StartCall, WidgetKind};

fn metrics(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries.iter().map(|(name, value)| (name.to_string(), value.clone())).collect()
}

#[test]
fn test_extract_expressions() {
    assert!(extract_expressions("").is_empty());
    assert!(extract_expressions("text").is_empty());
    assert_eq!(extract_expressions("text${a}"), vec!["a"]);
    assert_eq!(extract_expressions("text${a} - ${a.b}"), vec!["a", "a.b"]);
    assert_eq!(extract_expressions("${o.a-(b+4)/cc*tt}"), vec!["o.a-(b+4)/cc*tt"]);
    assert_eq!(extract_expressions("${a} and ${a}"), vec!["a", "a"]);
    assert_eq!(extract_expressions("${b}${a}${b}"), vec!["b", "a", "b"]);
}

#[test]
fn test_compute_expression() {
    let expressions = vec!["e.m1".to_string()];
    assert_eq!(compute_expression(&expressions, &BTreeMap::new()),
               BTreeMap::from([("${e.m1}".to_string(), "".to_string())]));

    let not_a_number = metrics(&[("e.m1", json!("a+1"))]);
    assert_eq!(compute_expression(&expressions, &not_a_number)["${e.m1}"], "");

    let expressions = vec!["e.m1+e.m1".to_string()];
    let data = metrics(&[("e.m1", json!(1))]);
    assert_eq!(compute_expression(&expressions, &data)["${e.m1+e.m1}"], "2");
}

#[test]
fn test_evaluate() {
    let lookup = |name: &str| match name {
        "a" => Ok(6.0),
        "b" => Ok(2.0),
        _ => Err(ExpressionError::MissingMetric(name.to_string())),
    };
    assert_eq!(evaluate("a + b * 2", lookup), Ok(10.0));
    assert_eq!(evaluate("(a + b) * 2", lookup), Ok(16.0));
    assert_eq!(evaluate("-a / b", lookup), Ok(-3.0));
    assert_eq!(evaluate("a / (b - 2)", lookup), Err(ExpressionError::NotFinite));
    assert_eq!(evaluate("a +", lookup), Err(ExpressionError::UnexpectedEnd));
    assert_eq!(evaluate("a b", lookup), Err(ExpressionError::TrailingInput));
    assert_eq!(evaluate("c", lookup), Err(ExpressionError::MissingMetric("c".to_string())));
    assert_eq!(referenced_metrics("a + b * a + 4"), Ok(vec!["a".to_string(), "b".to_string()]));
}

#[test]
fn test_calculate_value() {
    let data = metrics(&[("a", json!(3)), ("b", json!(4.5)), ("text", json!("n"))]);
    assert_eq!(calculate_value("${a}", &data), "3");
    assert_eq!(calculate_value("${b}", &data), "4.50");
    assert_eq!(calculate_value("${a / b}", &data), "0.67");
    assert_eq!(calculate_value("${a} of ${a + b} MB", &data), "3 of 7.50 MB");
    assert_eq!(calculate_value("${missing}", &data), "n/a");
    assert_eq!(calculate_value("${text}", &data), "n/a");
    assert_eq!(calculate_value("${a / 0}", &data), "n/a");
    assert_eq!(calculate_value("plain", &data), "plain");
    assert_eq!(calculate_value("${a} and ${a}", &data), "3 and 3");
}

#[test]
fn test_evaluate_series() {
    let data = metrics(&[
        ("used", json!([[1.0, 10.0], [2.0, 20.0], [null, 30.0]])),
        ("total", json!([[4.0, 10.0], [8.0, 20.0], [4.0, 30.0]])),
        ("scale", json!(100)),
    ]);
    assert_eq!(evaluate_series("used / total * scale", &data), vec![[25.0, 10.0], [25.0, 20.0]]);
    assert!(evaluate_series("missing", &data).is_empty());
}

fn get_widget(definition: WidgetDefinition, sim_config: SimulationConfig) -> (Simulation, Rc<RefCell<Widget>>) {
    let mut sim = Simulation::new(42);
    let sim_config = rc!(sim_config);
    let aggregator = rc!(refcell!(WidgetLoadAggregator::new(sim.create_context("aggregator"),
        sim_config.clone(), Box::new(EmptyMetricsLogger {}))));
    sim.add_handler("aggregator", aggregator.clone());
    let widget = Widget::new(definition, aggregator, 0, sim.create_context("widget"), sim_config);
    sim.add_handler("widget", widget.clone());
    (sim, widget)
}

#[test]
fn test_get_request_data() {
    let definition = WidgetDefinition::new("w", WidgetKind::Number)
        .with_metric(WidgetMetric::new("m1", "metrics/a", "HDFS", "NAMENODE"))
        .with_metric(WidgetMetric::new("m2", "metrics/b", "HDFS", "NAMENODE"))
        .with_metric(WidgetMetric::new("m3", "metrics/a", "HDFS", "NAMENODE"))
        .with_metric(WidgetMetric::new("m4", "metrics/c", "HDFS", "DATANODE"))
        .with_metric(WidgetMetric::new("m5", "metrics/d", "HDFS", "NAMENODE").with_criteria("HostRoles/ha_state=ACTIVE"));
    let (_sim, widget) = get_widget(definition, SimulationConfig::default());

    let requests = widget.borrow().get_request_data();
    let keys: Vec<&String> = requests.keys().collect();
    assert_eq!(keys, vec!["HDFS_DATANODE", "HDFS_NAMENODE", "HDFS_NAMENODE_HostRoles/ha_state=ACTIVE"]);
    assert_eq!(requests["HDFS_NAMENODE"].metric_paths, vec!["metrics/a", "metrics/b"]);
    assert_eq!(requests["HDFS_NAMENODE"].service_name.as_deref(), Some("HDFS"));
    assert_eq!(requests["HDFS_NAMENODE_HostRoles/ha_state=ACTIVE"].host_component_criteria.as_deref(),
               Some("HostRoles/ha_state=ACTIVE"));
}

#[test]
fn test_widget_lifecycle() {
    let definition = WidgetDefinition::new("w", WidgetKind::Number)
        .with_metric(WidgetMetric::new("m1", "metrics/a", "HDFS", "NAMENODE"))
        .with_value("Value", "${m1 * 2}")
        .with_render_delay(1.0);
    let mut sim_config = SimulationConfig::default();
    sim_config.widget_refresh_interval = 0.0;
    let (mut sim, widget) = get_widget(definition, sim_config);
    assert_eq!(widget.borrow().state(), WidgetState::PreRender);

    sim.step_until_time(1.2);
    assert_eq!(widget.borrow().state(), WidgetState::InDom);
    assert_eq!(widget.borrow().pending_requests(), 1);

    widget.borrow_mut().metrics_loaded(StartCall::ServiceComponentMetrics, &json!({
        "ServiceComponentInfo": {"component_name": "NAMENODE"},
        "metrics": {"a": 21}
    }));
    widget.borrow_mut().metrics_load_complete();
    assert!(widget.borrow().is_loaded());
    assert_eq!(widget.borrow().value("Value"), Some("42"));
    assert_eq!(widget.borrow().metric_data("m1"), Some(&json!(21)));
}

#[test]
fn test_responses_of_other_components_are_ignored() {
    let definition = WidgetDefinition::new("w", WidgetKind::Number)
        .with_metric(WidgetMetric::new("m1", "metrics/a", "HDFS", "NAMENODE"))
        .with_metric(WidgetMetric::new("m2", "metrics/a", "HDFS", "DATANODE"));
    let (_sim, widget) = get_widget(definition, SimulationConfig::default());

    widget.borrow_mut().metrics_loaded(StartCall::ServiceComponentMetrics, &json!({
        "ServiceComponentInfo": {"component_name": "DATANODE"},
        "metrics": {"a": 5}
    }));
    assert_eq!(widget.borrow().metric_data("m1"), None);
    assert_eq!(widget.borrow().metric_data("m2"), Some(&json!(5)));

    // host calls only feed metrics with criteria
    widget.borrow_mut().metrics_loaded(StartCall::HostComponentMetrics, &json!({
        "items": [{"HostRoles": {"component_name": "NAMENODE"}, "metrics": {"a": 7}}]
    }));
    assert_eq!(widget.borrow().metric_data("m1"), None);
}
