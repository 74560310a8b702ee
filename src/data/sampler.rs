// ============================================================
// Layer 4 — Negative / Candidate Sampler
// ============================================================
// Builds the list of relations the model ranks for one example.
// The gold relation is always first:
//
//   Sampled(3), gold = 7, 10 relations:
//       [7, 2, 9, 0]            ← 3 distinct random negatives
//
//   Exhaustive, gold = 7, 10 relations:
//       [7, 0, 1, 2, 3, 4, 5, 6, 8, 9]
//
// Training uses sampled mode (cheap, stochastic margin loss);
// dev/test use exhaustive mode so accuracy is a true ranking over
// the whole relation universe.
//
// Negatives are drawn by rejection sampling: pick a uniform id,
// throw it away if it is the gold or already drawn. Requiring
// ns < total_relations guarantees termination.
//
// Reference: rand crate documentation (Rng::gen_range)

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, Result};
use crate::domain::example::CandidateList;

/// How a dataset builds candidate lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateMode {
    /// Gold plus this many random negatives
    Sampled(usize),
    /// Gold plus every other relation, ascending
    Exhaustive,
}

impl CandidateMode {
    /// `ns == 0` means exhaustive, as on the command line.
    pub fn from_ns(ns: usize) -> Self {
        if ns == 0 {
            Self::Exhaustive
        } else {
            Self::Sampled(ns)
        }
    }

    /// Reject configurations that can never produce a valid list.
    pub fn validate(&self, total_relations: usize) -> Result<()> {
        match *self {
            Self::Sampled(0) => Err(PipelineError::InvalidConfig(
                "sampled mode needs at least one negative".to_string(),
            )),
            Self::Sampled(ns) if ns >= total_relations => Err(PipelineError::InvalidConfig(format!(
                "{ns} negatives requested but only {total_relations} relations exist"
            ))),
            _ => Ok(()),
        }
    }

    /// Length of every candidate list this mode produces
    pub fn list_len(&self, total_relations: usize) -> usize {
        match *self {
            Self::Sampled(ns) => ns + 1,
            Self::Exhaustive  => total_relations,
        }
    }

    pub fn sample<R: Rng + ?Sized>(
        &self,
        gold:            u32,
        total_relations: usize,
        rng:             &mut R,
    ) -> Result<CandidateList> {
        self.validate(total_relations)?;
        match *self {
            Self::Sampled(ns) => sample(gold, total_relations, ns, rng),
            Self::Exhaustive  => sample(gold, total_relations, 0, rng),
        }
    }
}

/// Candidate list for one example; `ns == 0` selects exhaustive mode.
pub fn sample<R: Rng + ?Sized>(
    gold:            u32,
    total_relations: usize,
    ns:              usize,
    rng:             &mut R,
) -> Result<CandidateList> {
    if gold as usize >= total_relations {
        return Err(PipelineError::InvalidConfig(format!(
            "gold relation {gold} outside [0, {total_relations})"
        )));
    }

    if ns == 0 {
        let ids = std::iter::once(gold)
            .chain((0..total_relations as u32).filter(|&r| r != gold))
            .collect();
        return Ok(CandidateList::from_ids(ids));
    }

    if ns >= total_relations {
        return Err(PipelineError::InvalidConfig(format!(
            "{ns} negatives requested but only {total_relations} relations exist"
        )));
    }

    let mut ids  = Vec::with_capacity(ns + 1);
    let mut seen = HashSet::with_capacity(ns + 1);
    ids.push(gold);
    seen.insert(gold);

    while ids.len() <= ns {
        let candidate = rng.gen_range(0..total_relations as u32);
        if seen.insert(candidate) {
            ids.push(candidate);
        }
    }

    Ok(CandidateList::from_ids(ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_sampled_shape_and_uniqueness() {
        let mut rng = StdRng::seed_from_u64(7);
        for gold in 0..20u32 {
            let c = sample(gold, 20, 5, &mut rng).unwrap();
            assert_eq!(c.len(), 6);
            assert_eq!(c.gold(), gold);
            let unique: HashSet<_> = c.ids().iter().collect();
            assert_eq!(unique.len(), 6);
            assert!(c.ids().iter().all(|&r| r < 20));
        }
    }

    #[test]
    fn test_sampled_can_take_every_other_relation() {
        let mut rng = StdRng::seed_from_u64(1);
        let c = sample(2, 4, 3, &mut rng).unwrap();
        let mut sorted = c.ids().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
        assert_eq!(c.gold(), 2);
    }

    #[test]
    fn test_same_seed_same_negatives() {
        let a = sample(3, 50, 4, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = sample(3, 50, 4, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_exhaustive_is_gold_then_complement() {
        let mut rng = StdRng::seed_from_u64(0);
        let c = sample(3, 6, 0, &mut rng).unwrap();
        assert_eq!(c.ids(), &[3, 0, 1, 2, 4, 5]);
    }

    #[test]
    fn test_too_many_negatives_is_invalid() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            sample(0, 5, 5, &mut rng),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(matches!(
            sample(0, 5, 9, &mut rng),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_gold_out_of_range_is_invalid() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sample(5, 5, 0, &mut rng).is_err());
    }

    #[test]
    fn test_mode_validation() {
        assert!(CandidateMode::Sampled(0).validate(10).is_err());
        assert!(CandidateMode::Sampled(10).validate(10).is_err());
        assert!(CandidateMode::Sampled(9).validate(10).is_ok());
        assert!(CandidateMode::Exhaustive.validate(10).is_ok());
        assert_eq!(CandidateMode::from_ns(0), CandidateMode::Exhaustive);
        assert_eq!(CandidateMode::Sampled(4).list_len(10), 5);
        assert_eq!(CandidateMode::Exhaustive.list_len(10), 10);
    }
}
