use std::collections::BTreeSet;

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Token documents of the hosts in one training pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSamples {
    pub pool_name: String,
    pub docs: Vec<Vec<String>>,
}

/// Ranks candidate pools for a host described by its tokens
#[cfg_attr(test, automock)]
pub trait PoolAdvisor: Send + Sync + 'static {
    /// Training pool names, most likely first
    fn rank(
        &self,
        training: &[PoolSamples],
        target: &[String],
    ) -> Result<Vec<String>>;
}

/// Bernoulli naive Bayes over token presence, with Laplace smoothing.
///
/// Stateless: the model is rebuilt from `training` on every call, which is
/// cheap at the sizes a single system reaches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaiveBayesAdvisor;

impl NaiveBayesAdvisor {
    fn log_likelihood(
        samples: &PoolSamples,
        vocabulary: &BTreeSet<&str>,
        target: &BTreeSet<&str>,
        total_docs: usize,
    ) -> f64 {
        let docs = samples.docs.len() as f64;
        let mut score = (docs / total_docs as f64).ln();
        for token in vocabulary {
            let seen = samples
                .docs
                .iter()
                .filter(|doc| doc.iter().any(|t| t == token))
                .count() as f64;
            let p = (seen + 1.0) / (docs + 2.0);
            score += if target.contains(token) { p.ln() } else { (1.0 - p).ln() };
        }
        score
    }
}

impl PoolAdvisor for NaiveBayesAdvisor {
    fn rank(
        &self,
        training: &[PoolSamples],
        target: &[String],
    ) -> Result<Vec<String>> {
        let pools: Vec<&PoolSamples> = training.iter().filter(|p| !p.docs.is_empty()).collect();
        let total_docs: usize = pools.iter().map(|p| p.docs.len()).sum();
        if total_docs == 0 {
            return Ok(Vec::new());
        }
        let vocabulary: BTreeSet<&str> = pools
            .iter()
            .flat_map(|p| p.docs.iter().flatten().map(String::as_str))
            .collect();
        let target: BTreeSet<&str> = target.iter().map(String::as_str).collect();

        let mut scored: Vec<(f64, &str)> = pools
            .iter()
            .map(|p| {
                (
                    Self::log_likelihood(p, &vocabulary, &target, total_docs),
                    p.pool_name.as_str(),
                )
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        Ok(scored.into_iter().map(|(_, name)| name.to_string()).collect())
    }
}
