//! REST API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use devcat_core::function::FunctionKind;
use devcat_core::{idmodifier, Aspect, DeviceType, FilterCriteria, Interaction, QueryOptions};
use devcat_store::{CriteriaField, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Store failure mapped to an HTTP status
pub struct ApiFailure(StoreError);

impl From<StoreError> for ApiFailure {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Decode(_) | StoreError::Encode(_) | StoreError::Io(_) => {
                error!(error = %self.0, "Store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ApiError::new(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiFailure>;

/// Query parameters of criteria searches
#[derive(Debug, Default, Deserialize)]
pub struct CriteriaQuery {
    function_id: Option<String>,
    device_class_id: Option<String>,
    aspect_id: Option<String>,
    interaction: Option<String>,
    #[serde(default)]
    include_ancestors: bool,
    #[serde(default)]
    include_descendants: bool,
    #[serde(default)]
    include_modified: bool,
}

impl CriteriaQuery {
    fn into_filter(self) -> Result<(FilterCriteria, QueryOptions), StoreError> {
        let interaction = match self.interaction {
            Some(value) => match Interaction::from(value) {
                Interaction::Other(unknown) => {
                    return Err(StoreError::InvalidFilter(format!(
                        "unknown interaction: {}",
                        unknown
                    )))
                }
                known => Some(known),
            },
            None => None,
        };
        let filter = FilterCriteria {
            function_id: self.function_id,
            device_class_id: self.device_class_id,
            aspect_id: self.aspect_id,
            interaction,
        };
        let options = QueryOptions {
            include_ancestors: self.include_ancestors,
            include_descendants: self.include_descendants,
            include_modified: self.include_modified,
        };
        Ok((filter, options))
    }
}

/// Find criteria rows
pub async fn find_criteria(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CriteriaQuery>,
) -> ApiResult<Vec<devcat_core::DeviceTypeCriteria>> {
    let (filter, options) = query.into_filter()?;
    Ok(Json(state.queries.find_criteria(&filter, options).await?))
}

/// Find distinct device-type ids
pub async fn find_device_type_ids(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CriteriaQuery>,
) -> ApiResult<Vec<String>> {
    let (filter, options) = query.into_filter()?;
    Ok(Json(state.queries.device_type_ids(&filter, options).await?))
}

/// List configurable input leaves of a service
pub async fn list_configurables(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<devcat_core::DeviceTypeCriteria>> {
    Ok(Json(state.queries.configurable_candidates(&id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReferenceQuery {
    #[serde(default)]
    include_modified: bool,
}

/// Rows referencing one function, device class, aspect, or characteristic
pub async fn criteria_by_reference(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<ReferenceQuery>,
) -> ApiResult<Vec<devcat_core::DeviceTypeCriteria>> {
    let field: CriteriaField = kind.parse()?;
    Ok(Json(
        state
            .queries
            .criteria_by(field, &id, query.include_modified)
            .await?,
    ))
}

#[derive(Serialize)]
pub struct DerivationResult {
    id: String,
    rows: usize,
}

/// Re-derive a device type's criteria
pub async fn put_device_type(
    State(state): State<Arc<AppState>>,
    Json(device_type): Json<DeviceType>,
) -> ApiResult<DerivationResult> {
    info!(device_type = %device_type.id, "Device type update received");
    let rows = state.catalog.upsert_device_type(&device_type).await?;
    Ok(Json(DerivationResult {
        id: device_type.id,
        rows,
    }))
}

/// Remove a device type's criteria
pub async fn delete_device_type(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DerivationResult> {
    let rows = state.catalog.delete_device_type(&id).await?;
    Ok(Json(DerivationResult { id, rows }))
}

/// Rebuild an aspect tree's closure
pub async fn put_aspect(
    State(state): State<Arc<AppState>>,
    Json(aspect): Json<Aspect>,
) -> ApiResult<DerivationResult> {
    info!(aspect = %aspect.id, "Aspect tree update received");
    let rows = state.catalog.upsert_aspect_tree(&aspect).await?;
    Ok(Json(DerivationResult { id: aspect.id, rows }))
}

/// Remove an aspect tree's closure
pub async fn delete_aspect(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DerivationResult> {
    let rows = state.catalog.delete_aspect_tree(&id).await?;
    Ok(Json(DerivationResult { id, rows }))
}

/// Get one aspect node
pub async fn get_aspect_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiFailure> {
    Ok(match state.queries.aspect_node(&id).await? {
        Some(node) => Json(node).into_response(),
        None => (StatusCode::NOT_FOUND, Json(ApiError::new("Aspect not found"))).into_response(),
    })
}

/// List the nodes of an aspect tree
pub async fn get_aspect_tree(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<devcat_core::AspectNode>> {
    Ok(Json(state.queries.aspect_tree(&id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpandQuery {
    #[serde(default)]
    include_ancestors: bool,
    #[serde(default)]
    include_descendants: bool,
}

/// Expand an aspect id through the closure table
pub async fn expand_aspect(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ExpandQuery>,
) -> ApiResult<Vec<String>> {
    let ids = state
        .queries
        .expand_aspect(&id, query.include_ancestors, query.include_descendants)
        .await?;
    Ok(Json(ids))
}

#[derive(Debug, Default, Deserialize)]
pub struct FunctionKindQuery {
    kind: Option<String>,
    #[serde(default)]
    include_descendants: bool,
}

fn parse_kind(kind: Option<&str>) -> Result<FunctionKind, StoreError> {
    kind.unwrap_or("measuring")
        .parse()
        .map_err(StoreError::InvalidFilter)
}

/// Functions of one kind used with an aspect
pub async fn aspect_functions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<FunctionKindQuery>,
) -> ApiResult<Vec<String>> {
    let kind = parse_kind(query.kind.as_deref())?;
    let options = QueryOptions {
        include_descendants: query.include_descendants,
        ..Default::default()
    };
    Ok(Json(state.queries.function_ids_for_aspect(&id, kind, options).await?))
}

/// Aspect nodes used with functions of one kind
pub async fn aspect_nodes_by_function_kind(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FunctionKindQuery>,
) -> ApiResult<Vec<devcat_core::AspectNode>> {
    let kind = parse_kind(query.kind.as_deref())?;
    Ok(Json(state.queries.aspect_nodes_with_function_kind(kind).await?))
}

/// Aspects a function is used with
pub async fn function_aspects(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<String>> {
    Ok(Json(state.queries.aspect_ids_for_function(&id).await?))
}

/// Device classes a function is used with
pub async fn function_device_classes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<String>> {
    Ok(Json(state.queries.device_class_ids_for_function(&id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct UsageQuery {
    /// Comma-separated characteristic ids of a concept
    characteristic_ids: Option<String>,
}

/// Check whether a taxonomy entry is still referenced
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<UsageQuery>,
) -> ApiResult<devcat_store::Usage> {
    let usage = if kind == "concept" {
        let characteristic_ids: Vec<String> = query
            .characteristic_ids
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        state.usage.is_concept_used(&characteristic_ids).await?
    } else {
        let field: CriteriaField = kind.parse()?;
        state.usage.is_used(field, &id).await?
    };
    info!(kind = %kind, id = %id, used = usage.used, "Usage checked");
    Ok(Json(usage))
}

#[derive(Serialize)]
pub struct DecodedId {
    base_id: String,
    params: idmodifier::ModifierParams,
}

/// Decode a composite device-type id
pub async fn decode_id(Path(id): Path<String>) -> Response {
    match idmodifier::decode(&id) {
        Ok((base_id, params)) => Json(DecodedId { base_id, params }).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ApiError::new(e.to_string()))).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server;
    use axum::body::Body;
    use axum::http::Request;
    use devcat_core::{Content, ContentVariable, Service};
    use tower::ServiceExt;

    async fn app() -> (axum::Router, Arc<AppState>) {
        let state = AppState::new(Config::default()).await.unwrap();
        (server::router(state.clone()), state)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn thermometer() -> DeviceType {
        DeviceType {
            id: "thermometer".to_string(),
            device_class_id: "dc-sensor".to_string(),
            services: vec![Service {
                id: "s-temp".to_string(),
                interaction: Interaction::Event,
                outputs: vec![Content {
                    id: "c1".to_string(),
                    content_variable: ContentVariable {
                        id: "temp".to_string(),
                        name: "temperature".to_string(),
                        function_id: "urn:infai:ses:measuring-function:getTemperature".to_string(),
                        aspect_id: "room_air".to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_criteria_search() {
        let (app, state) = app().await;
        state.catalog.upsert_device_type(&thermometer()).await.unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/criteria/device-types?aspect_id=room_air&interaction=event")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!(["thermometer"]));

        let response = app
            .oneshot(
                Request::get("/api/criteria?interaction=sometimes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_device_type_put_and_usage() {
        let (app, _) = app().await;
        let body = serde_json::to_vec(&thermometer()).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::put("/api/device-types")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["rows"], 1);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/usage/aspect/room_air")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let usage = body_json(response).await;
        assert_eq!(usage["used"], true);
        assert_eq!(usage["locations"][0]["content_variable_path"], "temperature");

        let response = app
            .oneshot(
                Request::get("/api/usage/protocol/p1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_aspect_routes() {
        let (app, state) = app().await;
        let tree = Aspect::new("air", vec![Aspect::new("room_air", vec![])]);
        state.catalog.upsert_aspect_tree(&tree).await.unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/aspects/air/expand?include_descendants=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await, serde_json::json!(["air", "room_air"]));

        let response = app
            .oneshot(Request::get("/api/aspects/water").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_decode_id_route() {
        let (app, _) = app().await;
        let id = idmodifier::service_group_view_id("dt1", "front");
        let response = app
            .oneshot(
                Request::get(format!("/api/ids/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let decoded = body_json(response).await;
        assert_eq!(decoded["base_id"], "dt1");
        assert_eq!(decoded["params"]["service_group_selection"][0], "front");
    }
}
