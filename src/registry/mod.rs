//! In-memory node registry.
//!
//! Key responsibilities:
//! - Unique indexes by id, peer id and name, plus host grouping
//! - The dirty set consumed by the persistence batcher
//! - Caller-facing lookup errors (`NoSuchNode`, `NodeOffline`, `NoSuchHost`)

mod node_registry;

pub use node_registry::*;
