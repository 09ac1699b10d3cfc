//! The nodes monitor service.
//!
//! [`NodesMonitor`] ties the registry, status engine, connection manager,
//! rebuild scheduler, persistence batcher and scan loop together and
//! exposes the caller-facing operations:
//! - agent heartbeats and connection lifecycle
//! - node and host reads, listings and aggregates
//! - migration, decommission, deletion and debug controls
//! - the periodic reconcile of every connected agent

mod builder;
mod heartbeat;
mod nodes_monitor;
mod operations;
mod queries;
mod reconcile;
mod types;

pub use builder::*;
pub use nodes_monitor::*;
pub use types::*;
