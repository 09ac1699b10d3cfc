//! Agent connections.
//!
//! - [`AgentConnection`] is the transport handle and the agent RPC surface
//! - [`ConnectionManager`] binds connections to node items, rejects cloned
//!   agents and detaches closed or stale transports

mod agent;
mod manager;

pub use agent::*;
pub use manager::*;
