//! Device-type description: services and their typed content-variable trees

use serde::{Deserialize, Serialize};

/// How a service exchanges data with its device
///
/// Unknown interaction strings are kept verbatim instead of being rejected;
/// validation happens before a device type reaches this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Interaction {
    /// Device answers explicit requests
    Request,
    /// Device pushes events on its own
    Event,
    /// Device supports both
    EventAndRequest,
    /// Anything else, preserved as-is
    Other(String),
}

impl Interaction {
    pub const REQUEST: &'static str = "request";
    pub const EVENT: &'static str = "event";
    pub const EVENT_AND_REQUEST: &'static str = "event+request";

    pub fn as_str(&self) -> &str {
        match self {
            Self::Request => Self::REQUEST,
            Self::Event => Self::EVENT,
            Self::EventAndRequest => Self::EVENT_AND_REQUEST,
            Self::Other(s) => s,
        }
    }

    /// Interaction values a filter for `self` accepts.
    ///
    /// Filtering by `request` or `event` also matches `event+request`.
    pub fn filter_values(&self) -> Vec<Interaction> {
        match self {
            Self::Request | Self::Event => vec![self.clone(), Self::EventAndRequest],
            other => vec![other.clone()],
        }
    }

    /// Check whether a row tagged with `row` satisfies a filter for `self`
    pub fn matches_filter(&self, row: &Interaction) -> bool {
        self.filter_values().contains(row)
    }
}

impl Default for Interaction {
    fn default() -> Self {
        Self::Request
    }
}

impl From<String> for Interaction {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::REQUEST => Self::Request,
            Self::EVENT => Self::Event,
            Self::EVENT_AND_REQUEST => Self::EventAndRequest,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Interaction {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Interaction> for String {
    fn from(value: Interaction) -> Self {
        match value {
            Interaction::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A node of a service's input/output schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentVariable {
    pub id: String,
    pub name: String,
    /// Value type tag (e.g. "https://schema.org/Float")
    #[serde(rename = "type", default)]
    pub value_type: String,
    #[serde(default)]
    pub is_void: bool,
    #[serde(default)]
    pub characteristic_id: String,
    #[serde(default)]
    pub function_id: String,
    #[serde(default)]
    pub aspect_id: String,
    /// Fixed value, if the schema pins one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub sub_content_variables: Vec<ContentVariable>,
}

impl ContentVariable {
    pub fn is_leaf(&self) -> bool {
        self.sub_content_variables.is_empty()
    }
}

/// One input or output message of a service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub content_variable: ContentVariable,
    #[serde(default)]
    pub serialization: String,
    #[serde(default)]
    pub protocol_segment_id: String,
}

/// A service offered by a device type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub local_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interaction: Interaction,
    #[serde(default)]
    pub protocol_id: String,
    #[serde(default)]
    pub inputs: Vec<Content>,
    #[serde(default)]
    pub outputs: Vec<Content>,
    /// Service-group this service belongs to; empty when unassigned
    #[serde(default)]
    pub service_group_key: String,
}

/// Named partition of a device type's services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceGroup {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A catalogued device type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceType {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub device_class_id: String,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub service_groups: Vec<ServiceGroup>,
}

impl DeviceType {
    /// Distinct service-group keys used by services, in first-seen order
    pub fn service_group_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for service in &self.services {
            let key = service.service_group_key.as_str();
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}
