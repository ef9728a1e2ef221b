use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::state::AppState;

/// `GET /health`: dependency probe. 503 as soon as either backing store
/// is unreachable.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let postgres_up = berthcare_db::ping(&state.db).await;
    let redis_up = state.cache.ping().await;
    let healthy = postgres_up && redis_up;

    let body = json!({
        "data": {
            "status": if healthy { "ok" } else { "degraded" },
            "services": {
                "postgres": if postgres_up { "up" } else { "down" },
                "redis": if redis_up { "up" } else { "down" },
            }
        }
    });

    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}
