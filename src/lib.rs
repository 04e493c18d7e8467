pub mod api_server;
pub mod errors;
pub mod events;
pub mod expression;
pub mod host;
pub mod layout_reader;
pub mod metric_model;
pub mod simulation;
pub mod simulation_config;
pub mod simulation_metrics;
pub mod widget;
pub mod widget_load_aggregator;
pub mod widget_request;
