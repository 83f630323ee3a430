//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{delete, get, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api;
use crate::state::AppState;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Criteria queries
        .route("/api/criteria", get(api::find_criteria))
        .route("/api/criteria/device-types", get(api::find_device_type_ids))
        .route("/api/criteria/{kind}/{id}", get(api::criteria_by_reference))
        .route("/api/services/{id}/configurables", get(api::list_configurables))
        // Re-derivation
        .route("/api/device-types", put(api::put_device_type))
        .route("/api/device-types/{id}", delete(api::delete_device_type))
        .route("/api/aspects", put(api::put_aspect))
        .route(
            "/api/aspects/{id}",
            get(api::get_aspect_node).delete(api::delete_aspect),
        )
        // Aspect closure
        .route("/api/aspects/{id}/expand", get(api::expand_aspect))
        .route("/api/aspects/{id}/tree", get(api::get_aspect_tree))
        .route("/api/aspects/{id}/functions", get(api::aspect_functions))
        .route("/api/aspect-nodes", get(api::aspect_nodes_by_function_kind))
        .route("/api/functions/{id}/aspects", get(api::function_aspects))
        .route(
            "/api/functions/{id}/device-classes",
            get(api::function_device_classes),
        )
        // Delete-time checks
        .route("/api/usage/{kind}/{id}", get(api::get_usage))
        .route("/api/ids/{id}", get(api::decode_id))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the web server
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    run_http(router(state), bind).await
}

/// Run plain HTTP server
async fn run_http(app: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}
