// ── Final selection ──

use rand::Rng;
use serde::Serialize;

use crate::criteria::SelectionPolicy;
use crate::error::CoreError;
use crate::model::Candidate;

/// The chosen server plus the pool it was drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub chosen: Candidate,
    /// Top-K candidates, latency-ascending.
    pub pool: Vec<Candidate>,
}

impl Selection {
    /// Connection order: the chosen server, then the rest of the pool in
    /// latency order.
    pub fn failover_order(&self) -> Vec<&Candidate> {
        std::iter::once(&self.chosen)
            .chain(self.pool.iter().filter(|c| *c != &self.chosen))
            .collect()
    }
}

/// Pick one of the first `top_k` latency-ranked candidates.
///
/// Under [`SelectionPolicy::Random`] every index of the pool, including
/// the last, is equally likely.
pub fn select<R: Rng + ?Sized>(
    ranked: &[Candidate],
    top_k: usize,
    policy: SelectionPolicy,
    rng: &mut R,
) -> Result<Selection, CoreError> {
    let pool: Vec<Candidate> = ranked.iter().take(top_k.max(1)).cloned().collect();
    if pool.is_empty() {
        return Err(CoreError::NoCandidates);
    }

    let index = match policy {
        SelectionPolicy::Best => 0,
        SelectionPolicy::Random => rng.gen_range(0..pool.len()),
    };
    let chosen = pool.get(index).cloned().ok_or(CoreError::NoCandidates)?;

    Ok(Selection { chosen, pool })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::model::{LatencySample, RankedServer};

    fn ranked(n: u32) -> Vec<Candidate> {
        (0..n)
            .map(|i| Candidate {
                server: RankedServer::new(format!("se{i}"), 10),
                latency: LatencySample {
                    min: i,
                    avg: i + 1,
                    max: i + 2,
                    mdev: Some(1),
                },
            })
            .collect()
    }

    #[test]
    fn random_policy_reaches_every_index() {
        let candidates = ranked(5);
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = BTreeSet::new();

        for _ in 0..500 {
            let selection = select(&candidates, 5, SelectionPolicy::Random, &mut rng).unwrap();
            seen.insert(selection.chosen.server.identifier);
        }

        assert_eq!(seen.len(), 5);
        assert!(seen.contains("se4"), "last index must be reachable");
    }

    #[test]
    fn pool_is_truncated_to_top_k() {
        let candidates = ranked(6);
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..200 {
            let selection = select(&candidates, 3, SelectionPolicy::Random, &mut rng).unwrap();
            assert_eq!(selection.pool.len(), 3);
            assert!(selection.pool.contains(&selection.chosen));
        }
    }

    #[test]
    fn best_policy_is_deterministic() {
        let candidates = ranked(4);
        let mut rng = StdRng::seed_from_u64(99);
        let selection = select(&candidates, 4, SelectionPolicy::Best, &mut rng).unwrap();
        assert_eq!(selection.chosen.identifier(), "se0");
    }

    #[test]
    fn failover_starts_with_chosen() {
        let candidates = ranked(3);
        let selection = Selection {
            chosen: candidates[1].clone(),
            pool: candidates.clone(),
        };
        let order: Vec<_> = selection
            .failover_order()
            .into_iter()
            .map(Candidate::identifier)
            .collect();
        assert_eq!(order, vec!["se1", "se0", "se2"]);
    }

    #[test]
    fn empty_input_is_no_candidates() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = select(&[], 3, SelectionPolicy::Random, &mut rng).unwrap_err();
        assert!(matches!(err, CoreError::NoCandidates));
    }
}
