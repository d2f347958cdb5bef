use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::middleware::identity::AuthenticatedUser;
use crate::state::AppState;
use crate::websocket::session;

/// Upgrades the request and hands ownership of the socket to the
/// connection subsystem. This is the sole entry point by which the web
/// layer gives this service a socket.
pub async fn ws_handler(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::handle_socket(state, user_id, socket))
}
