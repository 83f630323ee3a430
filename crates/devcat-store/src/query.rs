//! Criteria query engine
//!
//! Translates semantic filters into store filters over criteria rows. Aspect
//! ids are expanded through the closure table when ancestor or descendant
//! matching is requested. Rows of service-group views are excluded unless
//! the caller asks for them.

use devcat_core::criteria::fields;
use devcat_core::function::FunctionKind;
use devcat_core::{AspectNode, DeviceTypeCriteria, FilterCriteria, QueryOptions};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aspect::AspectRepository;
use crate::criteria::{CriteriaField, CriteriaRepository};
use crate::index::IndexConfig;
use crate::store::{within, DocumentStore, Filter, StoreError};

#[derive(Clone)]
pub struct QueryEngine {
    criteria: CriteriaRepository,
    aspects: AspectRepository,
    config: Arc<IndexConfig>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<IndexConfig>) -> Self {
        Self {
            criteria: CriteriaRepository::new(store.clone(), config.clone()),
            aspects: AspectRepository::new(store, config.clone()),
            config,
        }
    }

    /// Build the store filter for a semantic filter
    pub async fn build_filter(
        &self,
        criteria: &FilterCriteria,
        options: QueryOptions,
    ) -> Result<Filter, StoreError> {
        let mut filter = Filter::new();
        if let Some(device_class_id) = &criteria.device_class_id {
            filter = filter.equals(fields::DEVICE_CLASS_ID, device_class_id.as_str());
        }
        if let Some(function_id) = &criteria.function_id {
            filter = filter.equals(fields::FUNCTION_ID, function_id.as_str());
        }
        if let Some(aspect_id) = &criteria.aspect_id {
            if options.expands_aspect() {
                let ids = self
                    .aspects
                    .expand(aspect_id, options.include_ancestors, options.include_descendants)
                    .await?;
                filter = filter.one_of(fields::ASPECT_ID, ids);
            } else {
                filter = filter.equals(fields::ASPECT_ID, aspect_id.as_str());
            }
        }
        if let Some(interaction) = &criteria.interaction {
            let values = interaction.filter_values().into_iter().map(String::from);
            filter = filter.one_of(fields::INTERACTION, values);
        }
        Ok(exclude_modified(filter, options.include_modified))
    }

    /// Criteria rows matching a semantic filter
    pub async fn find_criteria(
        &self,
        criteria: &FilterCriteria,
        options: QueryOptions,
    ) -> Result<Vec<DeviceTypeCriteria>, StoreError> {
        within(self.config.request_timeout, async {
            let filter = self.build_filter(criteria, options).await?;
            debug!(filter = ?filter, "Finding criteria");
            self.criteria.find(&filter, None).await
        })
        .await
    }

    /// Distinct device-type ids matching a semantic filter
    pub async fn device_type_ids(
        &self,
        criteria: &FilterCriteria,
        options: QueryOptions,
    ) -> Result<Vec<String>, StoreError> {
        within(self.config.request_timeout, async {
            let filter = self.build_filter(criteria, options).await?;
            self.criteria.distinct(fields::DEVICE_TYPE_ID, &filter).await
        })
        .await
    }

    /// Input leaves of a service a user may configure
    pub async fn configurable_candidates(
        &self,
        service_id: &str,
    ) -> Result<Vec<DeviceTypeCriteria>, StoreError> {
        let filter = Filter::new()
            .equals(fields::SERVICE_ID, service_id)
            .equals(fields::IS_LEAF, true)
            .equals(fields::IS_INPUT, true)
            .not_equals(fields::IS_VOID, true);
        within(self.config.request_timeout, async {
            self.criteria.find(&exclude_modified(filter, false), None).await
        })
        .await
    }

    /// Rows referencing one taxonomy entry
    pub async fn criteria_by(
        &self,
        field: CriteriaField,
        id: &str,
        include_modified: bool,
    ) -> Result<Vec<DeviceTypeCriteria>, StoreError> {
        let filter = exclude_modified(Filter::new().equals(field.field(), id), include_modified);
        within(self.config.request_timeout, self.criteria.find(&filter, None)).await
    }

    /// Functions of one kind used together with an aspect
    pub async fn function_ids_for_aspect(
        &self,
        aspect_id: &str,
        kind: FunctionKind,
        options: QueryOptions,
    ) -> Result<Vec<String>, StoreError> {
        within(self.config.request_timeout, async {
            let criteria = FilterCriteria::default().with_aspect(aspect_id);
            let filter = self
                .build_filter(&criteria, options)
                .await?
                .equals(fields::IS_CONTROLLING_FUNCTION, kind == FunctionKind::Controlling);
            let ids = self.criteria.distinct(fields::FUNCTION_ID, &filter).await?;
            Ok(ids
                .into_iter()
                .filter(|id| FunctionKind::of(id) == Some(kind))
                .collect())
        })
        .await
    }

    /// Aspects a function is used with
    pub async fn aspect_ids_for_function(
        &self,
        function_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.distinct_for_function(fields::ASPECT_ID, function_id).await
    }

    /// Device classes a function is used with
    pub async fn device_class_ids_for_function(
        &self,
        function_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.distinct_for_function(fields::DEVICE_CLASS_ID, function_id).await
    }

    async fn distinct_for_function(
        &self,
        field: &'static str,
        function_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let filter = Filter::new().equals(fields::FUNCTION_ID, function_id);
        let filter = exclude_modified(filter, false);
        within(self.config.request_timeout, self.criteria.distinct(field, &filter)).await
    }

    /// Aspect nodes used with at least one function of the given kind
    pub async fn aspect_nodes_with_function_kind(
        &self,
        kind: FunctionKind,
    ) -> Result<Vec<AspectNode>, StoreError> {
        within(self.config.request_timeout, async {
            let controlling = kind == FunctionKind::Controlling;
            let filter = exclude_modified(
                Filter::new().equals(fields::IS_CONTROLLING_FUNCTION, controlling),
                false,
            );
            let rows = self.criteria.find(&filter, None).await?;
            let mut aspect_ids: Vec<&str> = Vec::new();
            for row in &rows {
                if !row.aspect_id.is_empty()
                    && FunctionKind::of(&row.function_id) == Some(kind)
                    && !aspect_ids.contains(&row.aspect_id.as_str())
                {
                    aspect_ids.push(&row.aspect_id);
                }
            }

            let mut nodes = Vec::new();
            for id in aspect_ids {
                match self.aspects.get(id).await? {
                    Some(node) => nodes.push(node),
                    None => warn!(aspect = %id, "Referenced aspect missing from closure table"),
                }
            }
            Ok(nodes)
        })
        .await
    }

    /// Closure-table lookup under the request deadline
    pub async fn aspect_node(&self, id: &str) -> Result<Option<AspectNode>, StoreError> {
        within(self.config.request_timeout, self.aspects.get(id)).await
    }

    pub async fn aspect_tree(&self, root_id: &str) -> Result<Vec<AspectNode>, StoreError> {
        within(self.config.request_timeout, self.aspects.list_tree(root_id)).await
    }

    pub async fn expand_aspect(
        &self,
        aspect_id: &str,
        include_ancestors: bool,
        include_descendants: bool,
    ) -> Result<Vec<String>, StoreError> {
        within(
            self.config.request_timeout,
            self.aspects.expand(aspect_id, include_ancestors, include_descendants),
        )
        .await
    }
}

/// Drop rows of service-group views unless explicitly wanted
pub fn exclude_modified(filter: Filter, include_modified: bool) -> Filter {
    if include_modified {
        filter
    } else {
        filter.not_equals(fields::IS_ID_MODIFIED, Value::Bool(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::index::CollectionNames;
    use crate::memory::MemoryStore;
    use devcat_core::{Aspect, Content, ContentVariable, DeviceType, Interaction, Service};
    use std::time::Duration;

    const SET_ON: &str = "urn:infai:ses:controlling-function:setOn";
    const GET_TEMP: &str = "urn:infai:ses:measuring-function:getTemperature";
    const GET_HUMIDITY: &str = "urn:infai:ses:measuring-function:getHumidity";

    fn variable(id: &str, function_id: &str, aspect_id: &str) -> ContentVariable {
        ContentVariable {
            id: id.to_string(),
            name: id.to_string(),
            function_id: function_id.to_string(),
            aspect_id: aspect_id.to_string(),
            ..Default::default()
        }
    }

    fn content(variable: ContentVariable) -> Content {
        Content {
            id: format!("c-{}", variable.id),
            content_variable: variable,
            ..Default::default()
        }
    }

    fn thermostat() -> DeviceType {
        DeviceType {
            id: "thermostat".to_string(),
            device_class_id: "dc-thermostat".to_string(),
            services: vec![
                Service {
                    id: "s-set".to_string(),
                    interaction: Interaction::Request,
                    inputs: vec![content(variable("on", SET_ON, "room_air"))],
                    ..Default::default()
                },
                Service {
                    id: "s-temp".to_string(),
                    interaction: Interaction::EventAndRequest,
                    outputs: vec![content(variable("temp", GET_TEMP, "room_air"))],
                    service_group_key: "sensors".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn weather_station() -> DeviceType {
        DeviceType {
            id: "weather".to_string(),
            device_class_id: "dc-weather".to_string(),
            services: vec![Service {
                id: "s-hum".to_string(),
                interaction: Interaction::Event,
                outputs: vec![content(variable("hum", GET_HUMIDITY, "outside_air"))],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn air() -> Aspect {
        Aspect::new(
            "air",
            vec![
                Aspect::new("inside_air", vec![Aspect::new("room_air", vec![])]),
                Aspect::new("outside_air", vec![]),
            ],
        )
    }

    async fn setup() -> (Catalog, QueryEngine) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let config =
            IndexConfig::init(store.as_ref(), CollectionNames::default(), Duration::from_secs(1))
                .await
                .unwrap();
        let catalog = Catalog::new(store.clone(), config.clone());
        catalog.upsert_aspect_tree(&air()).await.unwrap();
        catalog.upsert_device_type(&thermostat()).await.unwrap();
        catalog.upsert_device_type(&weather_station()).await.unwrap();
        (catalog, QueryEngine::new(store, config))
    }

    #[tokio::test]
    async fn test_function_filter_excludes_views() {
        let (_, engine) = setup().await;
        let filter = FilterCriteria::function(GET_TEMP);

        let rows = engine.find_criteria(&filter, QueryOptions::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device_type_id, "thermostat");

        let options = QueryOptions {
            include_modified: true,
            ..Default::default()
        };
        let ids = engine.device_type_ids(&filter, options).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"thermostat".to_string()));
        assert!(ids
            .iter()
            .any(|id| devcat_core::idmodifier::pure_id(id) == "thermostat" && id != "thermostat"));
    }

    #[tokio::test]
    async fn test_aspect_expansion() {
        let (_, engine) = setup().await;
        let filter = FilterCriteria::default().with_aspect("air");

        let exact = engine.device_type_ids(&filter, QueryOptions::default()).await.unwrap();
        assert!(exact.is_empty());

        let mut expanded = engine
            .device_type_ids(&filter, QueryOptions::with_descendants())
            .await
            .unwrap();
        expanded.sort();
        assert_eq!(expanded, vec!["thermostat", "weather"]);

        let inside = FilterCriteria::default().with_aspect("inside_air");
        let ids = engine
            .device_type_ids(&inside, QueryOptions::with_descendants())
            .await
            .unwrap();
        assert_eq!(ids, vec!["thermostat"]);

        let unknown = FilterCriteria::default().with_aspect("water");
        let ids = engine
            .device_type_ids(&unknown, QueryOptions::with_descendants())
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_interaction_filter() {
        let (_, engine) = setup().await;
        let request = FilterCriteria::default().with_interaction(Interaction::Request);
        let mut services: Vec<_> = engine
            .find_criteria(&request, QueryOptions::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.service_id)
            .collect();
        services.sort();
        assert_eq!(services, vec!["s-set", "s-temp"]);

        let event = FilterCriteria::default()
            .with_interaction(Interaction::Event)
            .with_device_class("dc-weather");
        let rows = engine.find_criteria(&event, QueryOptions::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].service_id, "s-hum");
    }

    #[tokio::test]
    async fn test_function_aggregations() {
        let (_, engine) = setup().await;

        let options = QueryOptions::with_descendants();
        let measuring = engine
            .function_ids_for_aspect("air", FunctionKind::Measuring, options)
            .await
            .unwrap();
        assert_eq!(measuring.len(), 2);
        assert!(measuring.contains(&GET_TEMP.to_string()));
        assert!(measuring.contains(&GET_HUMIDITY.to_string()));

        let controlling = engine
            .function_ids_for_aspect("room_air", FunctionKind::Controlling, QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(controlling, vec![SET_ON]);

        assert_eq!(engine.aspect_ids_for_function(SET_ON).await.unwrap(), vec!["room_air"]);
        assert_eq!(
            engine.device_class_ids_for_function(GET_HUMIDITY).await.unwrap(),
            vec!["dc-weather"]
        );

        let mut nodes: Vec<_> = engine
            .aspect_nodes_with_function_kind(FunctionKind::Measuring)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        nodes.sort();
        assert_eq!(nodes, vec!["outside_air", "room_air"]);
    }

    #[tokio::test]
    async fn test_configurable_candidates() {
        let (_, engine) = setup().await;
        let rows = engine.configurable_candidates("s-set").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content_variable_id, "on");
        assert!(engine.configurable_candidates("s-temp").await.unwrap().is_empty());

        let by_aspect = engine
            .criteria_by(CriteriaField::Aspect, "room_air", true)
            .await
            .unwrap();
        // "on" and "temp", each in the pure view and in the "sensors" view
        assert_eq!(by_aspect.len(), 4);
        let pure_only = engine
            .criteria_by(CriteriaField::Aspect, "room_air", false)
            .await
            .unwrap();
        assert_eq!(pure_only.len(), 2);
    }
}
