//! Collection names and secondary indexes, set up once at startup

use devcat_core::aspect::fields as aspect_fields;
use devcat_core::criteria::fields as criteria_fields;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::store::{DocumentStore, StoreError};

/// Fields of criteria rows that queries filter on
pub const CRITERIA_INDEXES: [&str; 9] = [
    criteria_fields::PURE_DEVICE_TYPE_ID,
    criteria_fields::DEVICE_TYPE_ID,
    criteria_fields::SERVICE_ID,
    criteria_fields::CONTENT_VARIABLE_ID,
    criteria_fields::FUNCTION_ID,
    criteria_fields::DEVICE_CLASS_ID,
    criteria_fields::ASPECT_ID,
    criteria_fields::CHARACTERISTIC_ID,
    criteria_fields::IS_ID_MODIFIED,
];

/// Fields of aspect nodes that queries filter on
pub const ASPECT_INDEXES: [&str; 4] = [
    aspect_fields::ID,
    aspect_fields::ROOT_ID,
    aspect_fields::ANCESTOR_IDS,
    aspect_fields::DESCENDANT_IDS,
];

/// Names of the collections used by devcat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionNames {
    #[serde(default = "default_criteria")]
    pub criteria: String,
    #[serde(default = "default_aspect_nodes")]
    pub aspect_nodes: String,
}

fn default_criteria() -> String {
    "device_type_criteria".to_string()
}

fn default_aspect_nodes() -> String {
    "aspect_nodes".to_string()
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            criteria: default_criteria(),
            aspect_nodes: default_aspect_nodes(),
        }
    }
}

/// Immutable storage layout shared by repositories and services
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub collections: CollectionNames,
    /// Deadline applied to every request-scoped operation
    pub request_timeout: Duration,
}

impl IndexConfig {
    /// Create all secondary indexes and return the resulting configuration
    pub async fn init(
        store: &dyn DocumentStore,
        collections: CollectionNames,
        request_timeout: Duration,
    ) -> Result<Arc<Self>, StoreError> {
        for field in CRITERIA_INDEXES {
            store.ensure_index(&collections.criteria, field).await?;
        }
        for field in ASPECT_INDEXES {
            store.ensure_index(&collections.aspect_nodes, field).await?;
        }
        info!(
            criteria = %collections.criteria,
            aspect_nodes = %collections.aspect_nodes,
            "Storage indexes ready"
        );
        Ok(Arc::new(Self {
            collections,
            request_timeout,
        }))
    }
}
