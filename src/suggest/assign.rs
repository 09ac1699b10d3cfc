use std::collections::BTreeMap;
use std::collections::HashMap;

use tracing::debug;
use tracing::trace;

use super::PoolAdvisor;
use super::PoolSamples;
use crate::PoolsConfig;

/// One host offered to the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSample {
    pub host_id: String,
    pub pool_name: String,
    pub tokens: Vec<String>,
}

/// Returns host id -> suggested pool name for hosts in the classified pools.
///
/// Hosts in any other pool train the advisor. With fewer than two training
/// pools nothing is suggested; a host whose ranking holds no pool outside
/// the classified ones gets no entry.
pub fn suggest_pools(
    samples: &[HostSample],
    pools: &PoolsConfig,
    advisor: &dyn PoolAdvisor,
) -> HashMap<String, String> {
    let mut training: BTreeMap<&str, PoolSamples> = BTreeMap::new();
    let mut targets = Vec::new();
    for sample in samples {
        if pools.is_classified_pool(&sample.pool_name) {
            targets.push(sample);
        } else {
            training
                .entry(sample.pool_name.as_str())
                .or_insert_with(|| PoolSamples {
                    pool_name: sample.pool_name.clone(),
                    docs: Vec::new(),
                })
                .docs
                .push(sample.tokens.clone());
        }
    }

    let mut suggestions = HashMap::new();
    if training.len() < 2 {
        trace!(training_pools = training.len(), "too few pools to suggest from");
        return suggestions;
    }
    let training: Vec<PoolSamples> = training.into_values().collect();

    for target in targets {
        let ranked = match advisor.rank(&training, &target.tokens) {
            Ok(ranked) => ranked,
            Err(e) => {
                debug!(host_id = %target.host_id, ?e, "pool advisor failed");
                continue;
            }
        };
        if let Some(pool) = ranked.into_iter().find(|name| !pools.is_classified_pool(name)) {
            debug!(host_id = %target.host_id, %pool, "pool suggested");
            suggestions.insert(target.host_id.clone(), pool);
        }
    }
    suggestions
}
