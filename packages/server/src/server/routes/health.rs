use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    graph: GraphHealth,
}

#[derive(Serialize)]
pub struct GraphHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Probes graph-store connectivity with a cheap label count.
/// Returns 200 OK when healthy, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let graph_health = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.deps.graph.count_by_label("Restaurant"),
    )
    .await
    {
        Ok(Ok(_)) => GraphHealth {
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => GraphHealth {
            status: "error".to_string(),
            error: Some(format!("Query failed: {}", e)),
        },
        Err(_) => GraphHealth {
            status: "error".to_string(),
            error: Some("Query timeout (>5s)".to_string()),
        },
    };

    let is_healthy = graph_health.status == "ok";

    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            graph: graph_health,
        }),
    )
}
