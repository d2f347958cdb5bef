use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod messages;
pub mod ws;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/messages", post(messages::send_message))
        .route("/api/v1/messages/unread/count", get(messages::unread_count))
        .route("/api/v1/messages/ws", get(ws::ws_handler))
        .route("/api/v1/messages/:contact_id", get(messages::message_history))
        .route("/api/v1/messages/:contact_id/last", get(messages::last_message))
        .route("/api/v1/messages/:contact_id/read", put(messages::mark_read))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness: the broker being down is reported but not fatal — REST
/// paths only need the database.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();
    let broker = state.publisher.is_connected().await;
    let online_connections = state.registry.online_count().await;

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "database": database,
            "broker": broker,
            "online_connections": online_connections,
        })),
    )
}
