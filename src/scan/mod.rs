//! Scan loop and per-node health work.
//!
//! - [`ScanLoop`] is the serialized periodic ticker
//! - the probes test storage I/O, the node-to-server path and the
//!   node-to-peer path, each feeding its own detention timer
//! - agent reconciliation decides what the agent should be told

mod agent_sync;
mod probes;
mod scan_loop;

pub use agent_sync::*;
pub use probes::*;
pub use scan_loop::*;

#[cfg(test)]
mod agent_sync_test;
