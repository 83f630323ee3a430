//! Semantic filters over the criteria index

use serde::{Deserialize, Serialize};

use crate::device_type::Interaction;

/// What a caller is looking for; every set field must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<Interaction>,
}

impl FilterCriteria {
    pub fn function(function_id: &str) -> Self {
        Self {
            function_id: Some(function_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_aspect(mut self, aspect_id: &str) -> Self {
        self.aspect_id = Some(aspect_id.to_string());
        self
    }

    pub fn with_device_class(mut self, device_class_id: &str) -> Self {
        self.device_class_id = Some(device_class_id.to_string());
        self
    }

    pub fn with_interaction(mut self, interaction: Interaction) -> Self {
        self.interaction = Some(interaction);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.function_id.is_none()
            && self.device_class_id.is_none()
            && self.aspect_id.is_none()
            && self.interaction.is_none()
    }
}

/// How far a query reaches beyond exact matches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Also match rows whose aspect is an ancestor of the filter aspect
    #[serde(default)]
    pub include_ancestors: bool,
    /// Also match rows whose aspect is a descendant of the filter aspect
    #[serde(default)]
    pub include_descendants: bool,
    /// Also return rows of service-group views
    #[serde(default)]
    pub include_modified: bool,
}

impl QueryOptions {
    pub fn with_descendants() -> Self {
        Self {
            include_descendants: true,
            ..Default::default()
        }
    }

    pub fn expands_aspect(&self) -> bool {
        self.include_ancestors || self.include_descendants
    }
}
