//! Project models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Project {
    pub fn description_display(&self) -> &str {
        self.description.as_deref().filter(|d| !d.is_empty()).unwrap_or("-")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct ProjectCreateRequest {
    pub name: String,
    pub description: String,
}

impl ProjectCreateRequest {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name is required.".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("Description is required.".to_string());
        }
        Ok(())
    }
}
