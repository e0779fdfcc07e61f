//! HTTP surface: health, room listing and the WebSocket endpoint

pub mod middleware;
pub mod routes;

pub use routes::build_router;
