mod activity;
mod catalog;
mod config;
mod connection;
mod errors;
mod metrics;
mod monitor;
mod node;
mod persistence;
mod query;
mod registry;
mod scan;
mod status;
mod store;
mod suggest;
pub mod utils;

pub use activity::*;
pub use catalog::*;
pub use config::*;
pub use connection::*;
pub use errors::*;
pub use metrics::*;
pub use monitor::*;
pub use node::*;
pub use persistence::*;
pub use query::*;
pub use registry::*;
pub use scan::*;
pub use status::*;
pub use store::*;
pub use suggest::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
