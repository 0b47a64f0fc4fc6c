//! HTTP surface of the AG-UI bridge: agent routes streaming protocol events
//! over SSE, plus health and descriptor endpoints.
pub mod agui_server;

pub use agui_server::*;
