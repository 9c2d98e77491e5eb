//! Concurrent generation of variants with partial success

use futures_util::future::join_all;
use tracing::{info, warn};

use super::dispatch::generate;
use super::types::{GenerateParams, GenerateResult};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::generation::prompt::resolve_seed;
use crate::routing::ProviderName;

/// Successful variants plus the failures that were tolerated
#[derive(Debug)]
pub struct BatchOutcome {
    /// Successful results, in request order
    pub results: Vec<GenerateResult>,
    /// Index into the request and the error for each failed variant
    pub failures: Vec<(usize, Error)>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Expand one request into `count` variants with distinct seeds
///
/// A caller seed becomes the first of a consecutive run so the batch is
/// reproducible; otherwise every variant gets its own random seed. A run that
/// passes `u64::MAX` continues from 1 and never yields 0.
pub fn variants(params: &GenerateParams, count: usize) -> Vec<GenerateParams> {
    let base = params.seed.filter(|s| *s > 0);
    (0..count)
        .map(|i| {
            let seed = match base {
                Some(seed) => nth_seed_after(seed, i as u64),
                None => resolve_seed(None),
            };
            params.clone().with_seed(seed)
        })
        .collect()
}

fn nth_seed_after(seed: u64, n: u64) -> u64 {
    seed.checked_add(n).unwrap_or_else(|| n - (u64::MAX - seed))
}

/// Run every variant concurrently on one provider
///
/// Succeeds when at least one variant produced a result; fails with
/// [`Error::BatchFailed`] only when all of them failed.
pub async fn generate_batch(
    provider: ProviderName,
    variants: &[GenerateParams],
    config: &ProviderConfig,
) -> Result<BatchOutcome> {
    if variants.is_empty() {
        return Err(Error::InvalidInput("batch has no variants".to_string()));
    }

    info!(%provider, count = variants.len(), "Starting batch");
    let outcomes = join_all(variants.iter().map(|params| generate(provider, params, config))).await;

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(%provider, index, error = %e, "Batch variant failed");
                failures.push((index, e));
            }
        }
    }

    if results.is_empty() {
        return Err(Error::BatchFailed {
            failures: failures.into_iter().map(|(_, e)| e).collect(),
        });
    }

    Ok(BatchOutcome { results, failures })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_with_seed_are_consecutive() {
        let params = GenerateParams::new("slime").with_seed(100);
        let seeds: Vec<u64> = variants(&params, 3).iter().filter_map(|p| p.seed).collect();
        assert_eq!(seeds, vec![100, 101, 102]);
    }

    #[test]
    fn test_variants_without_seed_are_random() {
        let all = variants(&GenerateParams::new("slime"), 4);
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|p| p.seed.is_some_and(|s| s > 0)));
    }

    #[test]
    fn test_variants_wrap_past_max_seed_without_zero() {
        let seeds: Vec<u64> = variants(&GenerateParams::new("slime").with_seed(u64::MAX - 1), 4)
            .iter()
            .filter_map(|p| p.seed)
            .collect();
        assert_eq!(seeds, vec![u64::MAX - 1, u64::MAX, 1, 2]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let err = generate_batch(ProviderName::Pollinations, &[], &ProviderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
