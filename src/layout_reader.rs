use serde::{Deserialize, Serialize};
use crate::errors::ConfigError;
use crate::simulation_config::WidgetDefinition;

/// Widgets of a dashboard section, as stored in a JSON layout file.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct WidgetLayout {
    pub layout_name: String,
    #[serde(default)]
    pub section_name: String,
    #[serde(default)]
    pub widgets: Vec<WidgetDefinition>,
}

impl WidgetLayout {
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_json(file_name, &content)
    }

    pub fn from_json(file_name: &str, content: &str) -> Result<Self, ConfigError> {
        let layout: Self = serde_json::from_str(content).map_err(|source| ConfigError::Json {
            path: file_name.to_string(),
            source,
        })?;
        for widget in layout.widgets.iter() {
            widget.validate().map_err(|reason| ConfigError::Invalid {
                path: file_name.to_string(),
                reason,
            })?;
        }
        Ok(layout)
    }
}
