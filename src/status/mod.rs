//! Derived node status, per-node storage breakdown and host consolidation.
//!
//! Everything here is pure: inputs are the item fields and a clock reading,
//! so repeated evaluation with the same inputs gives the same result.

mod engine;
mod host;
mod storage;

pub use engine::*;
pub use host::*;
pub use storage::*;
