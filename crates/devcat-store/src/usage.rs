//! Reference-use checks before taxonomy deletes
//!
//! A single referencing criteria row is enough to block a delete, so every
//! check stops at the first match.

use devcat_core::criteria::fields;
use devcat_core::DeviceTypeCriteria;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::criteria::{CriteriaField, CriteriaRepository};
use crate::index::IndexConfig;
use crate::query::exclude_modified;
use crate::store::{within, DocumentStore, Filter, StoreError};

/// Where a taxonomy entry is referenced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLocation {
    pub device_type_id: String,
    pub service_id: String,
    pub content_variable_id: String,
    pub content_variable_path: String,
}

impl From<DeviceTypeCriteria> for UsageLocation {
    fn from(row: DeviceTypeCriteria) -> Self {
        Self {
            device_type_id: row.pure_device_type_id,
            service_id: row.service_id,
            content_variable_id: row.content_variable_id,
            content_variable_path: row.content_variable_path,
        }
    }
}

/// Result of a reference check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub used: bool,
    /// Proof of use; empty when unused
    pub locations: Vec<UsageLocation>,
}

impl Usage {
    fn from_rows(rows: Vec<DeviceTypeCriteria>) -> Self {
        let locations: Vec<UsageLocation> = rows.into_iter().map(Into::into).collect();
        Self {
            used: !locations.is_empty(),
            locations,
        }
    }
}

#[derive(Clone)]
pub struct ReferenceChecker {
    criteria: CriteriaRepository,
    config: Arc<IndexConfig>,
}

impl ReferenceChecker {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<IndexConfig>) -> Self {
        Self {
            criteria: CriteriaRepository::new(store, config.clone()),
            config,
        }
    }

    /// Check whether any device type references the entry `id`
    pub async fn is_used(&self, kind: CriteriaField, id: &str) -> Result<Usage, StoreError> {
        let filter = exclude_modified(Filter::new().equals(kind.field(), id), false);
        self.first_match(filter).await
    }

    /// Check whether any device type uses one of a concept's characteristics
    pub async fn is_concept_used(
        &self,
        characteristic_ids: &[String],
    ) -> Result<Usage, StoreError> {
        if characteristic_ids.is_empty() {
            return Ok(Usage::default());
        }
        let filter = exclude_modified(
            Filter::new().one_of(fields::CHARACTERISTIC_ID, characteristic_ids.iter().cloned()),
            false,
        );
        self.first_match(filter).await
    }

    async fn first_match(&self, filter: Filter) -> Result<Usage, StoreError> {
        let rows = within(self.config.request_timeout, self.criteria.find(&filter, Some(1))).await?;
        Ok(Usage::from_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::index::CollectionNames;
    use crate::memory::MemoryStore;
    use devcat_core::{Content, ContentVariable, DeviceType, Service};
    use std::time::Duration;

    fn device_type(id: &str) -> DeviceType {
        let variable = ContentVariable {
            id: format!("{}-v", id),
            name: "value".to_string(),
            aspect_id: "aid".to_string(),
            characteristic_id: "celsius".to_string(),
            function_id: "urn:infai:ses:controlling-function:setTemperature".to_string(),
            ..Default::default()
        };
        DeviceType {
            id: id.to_string(),
            device_class_id: "dc".to_string(),
            services: vec![Service {
                id: format!("{}-s", id),
                inputs: vec![Content {
                    id: format!("{}-c", id),
                    content_variable: variable,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    async fn setup() -> (Catalog, ReferenceChecker) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let config =
            IndexConfig::init(store.as_ref(), CollectionNames::default(), Duration::from_secs(1))
                .await
                .unwrap();
        (
            Catalog::new(store.clone(), config.clone()),
            ReferenceChecker::new(store, config),
        )
    }

    #[tokio::test]
    async fn test_usage_follows_device_types() {
        let (catalog, checker) = setup().await;
        catalog.upsert_device_type(&device_type("dt1")).await.unwrap();

        let usage = checker.is_used(CriteriaField::Aspect, "aid").await.unwrap();
        assert!(usage.used);
        assert_eq!(
            usage.locations,
            vec![UsageLocation {
                device_type_id: "dt1".to_string(),
                service_id: "dt1-s".to_string(),
                content_variable_id: "dt1-v".to_string(),
                content_variable_path: "value".to_string(),
            }]
        );
        assert!(checker.is_used(CriteriaField::DeviceClass, "dc").await.unwrap().used);
        assert!(!checker.is_used(CriteriaField::Function, "other").await.unwrap().used);

        catalog.delete_device_type("dt1").await.unwrap();
        let usage = checker.is_used(CriteriaField::Aspect, "aid").await.unwrap();
        assert_eq!(usage, Usage::default());
    }

    #[tokio::test]
    async fn test_single_location_is_enough() {
        let (catalog, checker) = setup().await;
        catalog.upsert_device_type(&device_type("dt1")).await.unwrap();
        catalog.upsert_device_type(&device_type("dt2")).await.unwrap();

        let usage = checker.is_used(CriteriaField::Aspect, "aid").await.unwrap();
        assert_eq!(usage.locations.len(), 1);

        catalog.delete_device_type("dt1").await.unwrap();
        let usage = checker.is_used(CriteriaField::Aspect, "aid").await.unwrap();
        assert_eq!(usage.locations[0].device_type_id, "dt2");
    }

    #[tokio::test]
    async fn test_concept_usage() {
        let (catalog, checker) = setup().await;
        catalog.upsert_device_type(&device_type("dt1")).await.unwrap();

        let used = checker
            .is_concept_used(&["kelvin".to_string(), "celsius".to_string()])
            .await
            .unwrap();
        assert!(used.used);
        assert!(!checker.is_concept_used(&[]).await.unwrap().used);
        assert!(!checker
            .is_concept_used(&["kelvin".to_string()])
            .await
            .unwrap()
            .used);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("device-class".parse::<CriteriaField>().unwrap(), CriteriaField::DeviceClass);
        assert!(matches!(
            "concept".parse::<CriteriaField>(),
            Err(StoreError::InvalidFilter(_))
        ));
    }
}
