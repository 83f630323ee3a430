//! Criteria row persistence

use devcat_core::criteria::fields;
use devcat_core::DeviceTypeCriteria;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::index::IndexConfig;
use crate::store::{Document, DocumentStore, Filter, StoreError};

/// Taxonomy reference held by a criteria row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CriteriaField {
    Function,
    DeviceClass,
    Aspect,
    Characteristic,
}

impl CriteriaField {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Function => fields::FUNCTION_ID,
            Self::DeviceClass => fields::DEVICE_CLASS_ID,
            Self::Aspect => fields::ASPECT_ID,
            Self::Characteristic => fields::CHARACTERISTIC_ID,
        }
    }
}

impl std::str::FromStr for CriteriaField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(Self::Function),
            "device-class" => Ok(Self::DeviceClass),
            "aspect" => Ok(Self::Aspect),
            "characteristic" => Ok(Self::Characteristic),
            other => Err(StoreError::InvalidFilter(format!(
                "unknown reference kind: {}",
                other
            ))),
        }
    }
}

/// Reads and writes [`DeviceTypeCriteria`] documents
#[derive(Clone)]
pub struct CriteriaRepository {
    store: Arc<dyn DocumentStore>,
    config: Arc<IndexConfig>,
}

impl CriteriaRepository {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<IndexConfig>) -> Self {
        Self { store, config }
    }

    fn collection(&self) -> &str {
        &self.config.collections.criteria
    }

    /// Replace every row of a device type (all of its views) with `rows`.
    ///
    /// Returns the number of removed rows.
    pub async fn replace_device_type(
        &self,
        pure_device_type_id: &str,
        rows: &[DeviceTypeCriteria],
    ) -> Result<usize, StoreError> {
        let documents = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let key = format!("{}/{:06}", pure_device_type_id, i);
                serde_json::to_value(row)
                    .map(|doc| (key, doc))
                    .map_err(StoreError::Encode)
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.store
            .replace_where(self.collection(), &device_type_filter(pure_device_type_id), documents)
            .await
    }

    /// Remove every row of a device type; returns the number removed
    pub async fn remove_device_type(&self, pure_device_type_id: &str) -> Result<usize, StoreError> {
        self.store
            .delete_many(self.collection(), &device_type_filter(pure_device_type_id))
            .await
    }

    pub async fn find(
        &self,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<DeviceTypeCriteria>, StoreError> {
        let documents = self.store.find(self.collection(), filter, limit).await?;
        documents.into_iter().map(decode).collect()
    }

    /// Distinct non-empty string values of `field` over matching rows
    pub async fn distinct(
        &self,
        field: &'static str,
        filter: &Filter,
    ) -> Result<Vec<String>, StoreError> {
        let values = self.store.distinct(self.collection(), field, filter).await?;
        Ok(values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect())
    }
}

fn device_type_filter(pure_device_type_id: &str) -> Filter {
    Filter::new().equals(fields::PURE_DEVICE_TYPE_ID, pure_device_type_id)
}

fn decode(document: Document) -> Result<DeviceTypeCriteria, StoreError> {
    serde_json::from_value(document).map_err(StoreError::Decode)
}
