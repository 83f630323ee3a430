//! Criteria extraction from device-type content-variable trees
//!
//! Every device type is flattened into [`DeviceTypeCriteria`] rows, one per
//! content variable that either carries a function consistent with its
//! direction or is a configurable input leaf. Rows are extracted once for the
//! whole device type and once more per service group, under a composite id
//! (see [`crate::idmodifier`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::device_type::{ContentVariable, DeviceType, Interaction, Service};
use crate::function::{is_controlling_function, is_namespaced};
use crate::idmodifier;

/// Storage field names of [`DeviceTypeCriteria`]
///
/// Must stay in sync with the serde names of the struct fields.
pub mod fields {
    pub const PURE_DEVICE_TYPE_ID: &str = "pure_device_type_id";
    pub const DEVICE_TYPE_ID: &str = "device_type_id";
    pub const IS_ID_MODIFIED: &str = "is_id_modified";
    pub const SERVICE_ID: &str = "service_id";
    pub const CONTENT_VARIABLE_ID: &str = "content_variable_id";
    pub const CONTENT_VARIABLE_PATH: &str = "content_variable_path";
    pub const FUNCTION_ID: &str = "function_id";
    pub const IS_CONTROLLING_FUNCTION: &str = "is_controlling_function";
    pub const INTERACTION: &str = "interaction";
    pub const DEVICE_CLASS_ID: &str = "device_class_id";
    pub const ASPECT_ID: &str = "aspect_id";
    pub const CHARACTERISTIC_ID: &str = "characteristic_id";
    pub const IS_VOID: &str = "is_void";
    pub const VALUE: &str = "value";
    pub const TYPE: &str = "type";
    pub const IS_LEAF: &str = "is_leaf";
    pub const IS_INPUT: &str = "is_input";

    pub const ALL: [&str; 17] = [
        PURE_DEVICE_TYPE_ID,
        DEVICE_TYPE_ID,
        IS_ID_MODIFIED,
        SERVICE_ID,
        CONTENT_VARIABLE_ID,
        CONTENT_VARIABLE_PATH,
        FUNCTION_ID,
        IS_CONTROLLING_FUNCTION,
        INTERACTION,
        DEVICE_CLASS_ID,
        ASPECT_ID,
        CHARACTERISTIC_ID,
        IS_VOID,
        VALUE,
        TYPE,
        IS_LEAF,
        IS_INPUT,
    ];
}

/// One flattened, queryable content-variable occurrence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTypeCriteria {
    /// Id of the catalogued device type
    pub pure_device_type_id: String,
    /// Equal to `pure_device_type_id` unless this row belongs to a service-group view
    pub device_type_id: String,
    pub is_id_modified: bool,
    pub service_id: String,
    pub content_variable_id: String,
    /// Dot-joined variable names from the service's root variable
    pub content_variable_path: String,
    pub function_id: String,
    pub is_controlling_function: bool,
    pub interaction: Interaction,
    pub device_class_id: String,
    pub aspect_id: String,
    pub characteristic_id: String,
    pub is_void: bool,
    pub value: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub value_type: String,
    pub is_leaf: bool,
    pub is_input: bool,
}

/// Extract all criteria rows of a device type.
///
/// Runs one pass over every service under the pure id, plus one pass per
/// distinct service-group key over that group's services and all unassigned
/// services, under the group's composite id.
pub fn extract_criteria(device_type: &DeviceType) -> Vec<DeviceTypeCriteria> {
    let mut unassigned: Vec<&Service> = Vec::new();
    let mut grouped: HashMap<&str, Vec<&Service>> = HashMap::new();
    for service in &device_type.services {
        if service.service_group_key.is_empty() {
            unassigned.push(service);
        } else {
            grouped
                .entry(service.service_group_key.as_str())
                .or_default()
                .push(service);
        }
    }

    let mut result = extract_criteria_for_id(
        &device_type.id,
        &device_type.id,
        &device_type.device_class_id,
        device_type.services.iter(),
    );

    for key in device_type.service_group_keys() {
        let view_id = idmodifier::service_group_view_id(&device_type.id, key);
        let group = grouped.get(key).map(Vec::as_slice).unwrap_or_default();
        debug!(
            device_type = %device_type.id,
            service_group = %key,
            services = unassigned.len() + group.len(),
            "Extracting service-group view"
        );
        result.extend(extract_criteria_for_id(
            &device_type.id,
            &view_id,
            &device_type.device_class_id,
            unassigned.iter().chain(group).copied(),
        ));
    }

    result
}

/// Extract criteria rows for the given services under one device-type id
pub fn extract_criteria_for_id<'a>(
    pure_device_type_id: &str,
    device_type_id: &str,
    device_class_id: &str,
    services: impl IntoIterator<Item = &'a Service>,
) -> Vec<DeviceTypeCriteria> {
    let mut rows = Vec::new();
    for service in services {
        let context = RowContext {
            pure_device_type_id,
            device_type_id,
            device_class_id,
            service,
        };
        for content in &service.inputs {
            let mut path = Vec::new();
            walk(&context, &content.content_variable, true, &mut path, &mut rows);
        }
        for content in &service.outputs {
            let mut path = Vec::new();
            walk(&context, &content.content_variable, false, &mut path, &mut rows);
        }
    }
    rows
}

struct RowContext<'a> {
    pure_device_type_id: &'a str,
    device_type_id: &'a str,
    device_class_id: &'a str,
    service: &'a Service,
}

fn walk<'v>(
    context: &RowContext<'_>,
    variable: &'v ContentVariable,
    is_input: bool,
    path: &mut Vec<&'v str>,
    rows: &mut Vec<DeviceTypeCriteria>,
) {
    path.push(variable.name.as_str());

    let is_leaf = variable.is_leaf();
    let is_controlling = is_controlling_function(&variable.function_id);
    // Legacy ids outside the URN namespace are accepted in both directions.
    let direction_matches = variable.function_id.is_empty()
        || !is_namespaced(&variable.function_id)
        || is_controlling == is_input;
    let is_configurable_candidate = is_leaf && is_input;

    if direction_matches || is_configurable_candidate {
        rows.push(DeviceTypeCriteria {
            pure_device_type_id: context.pure_device_type_id.to_string(),
            device_type_id: context.device_type_id.to_string(),
            is_id_modified: context.pure_device_type_id != context.device_type_id,
            service_id: context.service.id.clone(),
            content_variable_id: variable.id.clone(),
            content_variable_path: path.join("."),
            function_id: variable.function_id.clone(),
            is_controlling_function: is_controlling,
            interaction: context.service.interaction.clone(),
            device_class_id: context.device_class_id.to_string(),
            aspect_id: variable.aspect_id.clone(),
            characteristic_id: variable.characteristic_id.clone(),
            is_void: variable.is_void,
            value: variable.value.clone(),
            value_type: variable.value_type.clone(),
            is_leaf,
            is_input,
        });
    }

    for sub in &variable.sub_content_variables {
        walk(context, sub, is_input, path, rows);
    }

    path.pop();
}
