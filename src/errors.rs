//! Error types shared across the simulator.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while loading the simulation config or a widget layout.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse YAML from file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("can't parse JSON from file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config in file {path}: {reason}")]
    Invalid {
        path: String,
        reason: String,
    },
}

/// Errors returned by the API server. They travel inside response events,
/// so they must stay serializable and cloneable.
#[derive(Clone, Debug, PartialEq, Error, Serialize)]
pub enum ApiError {
    #[error("component {component_name} of service {service_name:?} not found")]
    ComponentNotFound {
        service_name: Option<String>,
        component_name: String,
    },
    #[error("invalid host component criteria: {0}")]
    InvalidCriteria(String),
    #[error("invalid metric path: {0}")]
    InvalidMetricPath(String),
}

/// Errors raised while evaluating a widget value expression.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ExpressionError {
    #[error("unexpected character '{0}' in expression")]
    UnexpectedCharacter(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token after the end of expression")]
    TrailingInput,
    #[error("metric {0} has no data")]
    MissingMetric(String),
    #[error("metric {0} is not a number")]
    NotANumber(String),
    #[error("expression result is not finite")]
    NotFinite,
}

/// Errors raised while saving simulation results.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
