// Simulated actor identities
//
// Two interchangeable strategies, selected per scenario:
// - Sequential derives a globally unique identity from (vu_id, iteration),
//   so a run can assert that the target reports zero false duplicates.
// - RandomPool draws uniformly from a fixed pool. The pool size is a test
//   parameter: sizing it near the target's finite resource count raises the
//   collision rate and stresses duplicate/idempotency handling.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum IdentityStrategy {
    /// Unique identity per (vu_id, iteration); no collisions across the run
    Sequential { iterations_per_vu: u64 },
    /// Uniform draw from [1, pool_size]; collisions are expected and tunable
    RandomPool { pool_size: u64 },
}

impl IdentityStrategy {
    /// Identity for one iteration. `vu_id` is 1-based, `iteration` 0-based.
    pub fn user_id(&self, vu_id: u64, iteration: u64) -> u64 {
        match self {
            IdentityStrategy::Sequential { iterations_per_vu } => {
                (vu_id - 1) * iterations_per_vu + iteration + 1
            }
            IdentityStrategy::RandomPool { pool_size } => {
                rand::thread_rng().gen_range(1..=*pool_size)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            IdentityStrategy::Sequential { iterations_per_vu } if *iterations_per_vu == 0 => Err(
                EngineError::config("identity.iterations_per_vu", "must be positive"),
            ),
            IdentityStrategy::RandomPool { pool_size } if *pool_size == 0 => {
                Err(EngineError::config("identity.pool_size", "must be positive"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sequential_identities_never_collide() {
        let strategy = IdentityStrategy::Sequential { iterations_per_vu: 5 };
        let mut seen = HashSet::new();
        for vu_id in 1..=5 {
            for iteration in 0..5 {
                assert!(seen.insert(strategy.user_id(vu_id, iteration)));
            }
        }
        assert_eq!(seen.len(), 25);
        assert!(seen.contains(&1));
        assert!(seen.contains(&25));
    }

    #[test]
    fn sequential_identity_matches_the_partition_formula() {
        let strategy = IdentityStrategy::Sequential {
            iterations_per_vu: 250,
        };
        assert_eq!(strategy.user_id(1, 0), 1);
        assert_eq!(strategy.user_id(1, 249), 250);
        assert_eq!(strategy.user_id(2, 0), 251);
        assert_eq!(strategy.user_id(200, 249), 50_000);
    }

    #[test]
    fn random_pool_stays_in_bounds() {
        let strategy = IdentityStrategy::RandomPool { pool_size: 5 };
        for _ in 0..1000 {
            let id = strategy.user_id(1, 0);
            assert!((1..=5).contains(&id));
        }
    }

    #[test]
    fn small_pools_collide() {
        let strategy = IdentityStrategy::RandomPool { pool_size: 5 };
        let ids: HashSet<u64> = (0..100).map(|i| strategy.user_id(1, i)).collect();
        assert!(ids.len() < 100);
    }

    #[test]
    fn zero_sized_strategies_are_rejected() {
        assert!(IdentityStrategy::RandomPool { pool_size: 0 }
            .validate()
            .is_err());
        assert!(IdentityStrategy::Sequential {
            iterations_per_vu: 0
        }
        .validate()
        .is_err());
        assert!(IdentityStrategy::RandomPool { pool_size: 1 }
            .validate()
            .is_ok());
    }
}
