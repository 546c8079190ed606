//! HTTP surface: landing page, health check and the WebSocket upgrade

pub mod routes;

pub use routes::build_router;
