//! Network layer: listener, TLS termination, WebSocket upgrade and the
//! per-connection task.

mod connection;
mod gateway;

pub use connection::Connection;
pub use gateway::Gateway;
