use std::collections::BTreeMap;

use rand::Rng;

use crate::ApplicableBehaviour;

/// Outcome of conflict resolution for a single step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Candidates whose touched cells are pairwise disjoint, in recording order.
    pub survivors: Vec<ApplicableBehaviour>,
    /// Number of candidates dropped.
    pub excluded: usize,
}

/// Ensures no cell is mutated by more than one behaviour in a step.
///
/// Touched cells are visited in ascending index order. Wherever more than one
/// still-alive candidate claims a cell, one of them is kept and the others are
/// excluded from the whole step, including cells where they had no rival. A
/// candidate already kept at an earlier cell wins later cells outright, so every
/// contested cell ends with a survivor; the pick is uniform among the alive
/// claimants when none of them is kept yet, or among the kept ones otherwise.
pub fn resolve_conflicts<R: Rng>(candidates: Vec<ApplicableBehaviour>, rng: &mut R) -> Resolution {
    let mut claims: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (position, candidate) in candidates.iter().enumerate() {
        for cell in candidate.touched_cells() {
            claims.entry(cell).or_default().push(position);
        }
    }

    let mut excluded = vec![false; candidates.len()];
    let mut kept = vec![false; candidates.len()];
    let mut alive = Vec::new();
    let mut pool = Vec::new();
    for claimants in claims.values().filter(|claimants| claimants.len() > 1) {
        alive.clear();
        alive.extend(
            claimants
                .iter()
                .copied()
                .filter(|position| !excluded[*position]),
        );
        if alive.len() < 2 {
            continue;
        }

        pool.clear();
        pool.extend(alive.iter().copied().filter(|position| kept[*position]));
        if pool.is_empty() {
            pool.extend_from_slice(&alive);
        }
        let keeper = if pool.len() == 1 {
            pool[0]
        } else {
            pool[rng.gen_range(0..pool.len())]
        };

        kept[keeper] = true;
        for &position in &alive {
            if position != keeper {
                excluded[position] = true;
            }
        }
    }

    let excluded_count = excluded.iter().filter(|dropped| **dropped).count();
    let survivors = candidates
        .into_iter()
        .zip(excluded)
        .filter_map(|(candidate, dropped)| (!dropped).then_some(candidate))
        .collect();

    Resolution {
        survivors,
        excluded: excluded_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoundNeighbour;
    use grainfield_core::Direction;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn candidate(origin: usize, neighbours: &[usize]) -> ApplicableBehaviour {
        ApplicableBehaviour {
            origin,
            age: 0,
            behaviour: 0,
            neighbours: neighbours
                .iter()
                .map(|&index| BoundNeighbour {
                    direction: Direction::East,
                    index,
                    occupant: None,
                    age: None,
                })
                .collect(),
        }
    }

    #[test]
    fn disjoint_candidates_all_survive() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let resolution = resolve_conflicts(
            vec![candidate(0, &[1]), candidate(4, &[5]), candidate(8, &[])],
            &mut rng,
        );
        assert_eq!(resolution.survivors.len(), 3);
        assert_eq!(resolution.excluded, 0);
    }

    #[test]
    fn shared_target_keeps_exactly_one_claimant() {
        let mut kept_first = 0;
        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let resolution =
                resolve_conflicts(vec![candidate(0, &[1]), candidate(2, &[1])], &mut rng);
            assert_eq!(resolution.survivors.len(), 1);
            assert_eq!(resolution.excluded, 1);
            if resolution.survivors[0].origin == 0 {
                kept_first += 1;
            }
        }
        assert!(
            (60..=140).contains(&kept_first),
            "first claimant kept {kept_first} times out of 200"
        );
    }

    #[test]
    fn survivors_touch_pairwise_disjoint_cells() {
        let candidates = vec![
            candidate(0, &[1, 2]),
            candidate(3, &[2]),
            candidate(5, &[3, 6]),
            candidate(7, &[6, 8]),
            candidate(9, &[10]),
            candidate(11, &[10, 0]),
        ];
        for seed in 0..100 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let resolution = resolve_conflicts(candidates.clone(), &mut rng);

            let mut seen = HashSet::new();
            for survivor in &resolution.survivors {
                for cell in survivor.touched_cells() {
                    assert!(seen.insert(cell), "cell {cell} claimed twice");
                }
            }
            assert_eq!(
                resolution.survivors.len() + resolution.excluded,
                candidates.len()
            );
        }
    }

    #[test]
    fn chained_claims_leave_every_contested_cell_with_a_survivor() {
        let candidates = vec![candidate(10, &[1]), candidate(11, &[1, 2]), candidate(12, &[2])];
        let mut middle_kept = 0;
        for seed in 0..500 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let resolution = resolve_conflicts(candidates.clone(), &mut rng);

            for cell in [1, 2] {
                let writers = resolution
                    .survivors
                    .iter()
                    .filter(|survivor| survivor.touched_cells().any(|touched| touched == cell))
                    .count();
                assert_eq!(writers, 1, "cell {cell} has {writers} writers for seed {seed}");
            }
            if resolution.survivors.len() == 1 {
                assert_eq!(resolution.survivors[0].origin, 11);
                assert_eq!(resolution.excluded, 2);
                middle_kept += 1;
            } else {
                let origins: Vec<usize> = resolution
                    .survivors
                    .iter()
                    .map(|survivor| survivor.origin)
                    .collect();
                assert_eq!(origins, vec![10, 12]);
                assert_eq!(resolution.excluded, 1);
            }
        }
        assert!(
            (150..=350).contains(&middle_kept),
            "middle claimant kept {middle_kept} times out of 500"
        );
    }

    #[test]
    fn resolution_is_deterministic_for_a_seed() {
        let candidates = vec![
            candidate(0, &[1]),
            candidate(2, &[1]),
            candidate(3, &[1, 4]),
        ];
        let first = resolve_conflicts(candidates.clone(), &mut ChaCha8Rng::seed_from_u64(42));
        let second = resolve_conflicts(candidates, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(first, second);
    }
}
