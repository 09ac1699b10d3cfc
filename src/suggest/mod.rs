//! Advisory pool assignment for hosts still sitting in the default pools.
//!
//! Hosts are described by discrete feature tokens; a [`PoolAdvisor`]
//! trained on the hosts of every other pool ranks the candidates. Nothing
//! here can fail a scan: errors and thin training data yield no suggestion.

mod advisor;
mod assign;
mod tokens;

pub use advisor::*;
pub use assign::*;
pub use tokens::*;
