//! HTTP route definitions

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::util::time::uptime;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn home_handler() -> &'static str {
    "Home Page"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    rooms: usize,
    lobby_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime().as_secs(),
        rooms: state.registry().room_count(),
        lobby_players: state.registry().lobby_len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::NameProvider;
    use crate::ws::outbound::ReliableHandle;

    #[tokio::test]
    async fn health_reports_lobby_and_rooms() {
        let config = Config::from_lookup(|_| None).unwrap();
        let state = AppState::new(config, NameProvider::from_names(Vec::new()));
        let (handle, _rx) = ReliableHandle::channel(8);
        state.registry().register(handle);

        let Json(health) = health_handler(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.rooms, 0);
        assert_eq!(health.lobby_players, 1);
        assert_eq!(home_handler().await, "Home Page");
    }
}
