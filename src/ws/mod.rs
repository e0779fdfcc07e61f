//! WebSocket transport: wire protocol, connection handler and client hub

pub mod handler;
pub mod hub;
pub mod protocol;
