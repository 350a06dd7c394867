//! Batch partitioning.
//!
//! Round 1 chunks the input contiguously. Later rounds draw from the previous
//! round's per-batch outputs in round-robin order, so items that survived
//! together in one batch are scattered across different batches next time.
//! Neither strategy drops or duplicates items; any shrink comes from the oracle.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Split `items` into contiguous batches of at most `batch_size`, preserving order.
pub fn partition_initial<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    assert!(batch_size > 0, "batch_size must be > 0");
    items.chunks(batch_size).map(<[T]>::to_vec).collect()
}

/// Redistribute the previous round's per-batch outputs.
///
/// Draws one item at a time, cycling over the source lists and skipping
/// exhausted ones, filling batches of `batch_size`. The final partial batch
/// is kept. Sources are read through a cursor per list; nothing is mutated.
pub fn partition_round_robin<T: Clone>(previous: &[Vec<T>], batch_size: usize) -> Vec<Vec<T>> {
    assert!(batch_size > 0, "batch_size must be > 0");

    let total: usize = previous.iter().map(Vec::len).sum();
    let mut batches = Vec::with_capacity(total.div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size.min(total));

    let mut cursors = vec![0usize; previous.len()];
    let mut drawn = 0;
    let mut source = 0;

    while drawn < total {
        if let Some(item) = previous[source].get(cursors[source]) {
            cursors[source] += 1;
            drawn += 1;
            current.push(item.clone());

            if current.len() == batch_size {
                batches.push(std::mem::replace(
                    &mut current,
                    Vec::with_capacity(batch_size.min(total - drawn)),
                ));
            }
        }
        source = (source + 1) % previous.len();
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

/// How items are redistributed between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Redistribution {
    /// Deterministic round-robin over the previous round's batches.
    #[default]
    RoundRobin,
    /// Shuffle the source order and each source's item order with an RNG
    /// seeded from `seed + round`, then round-robin. Reproducible per seed.
    SeededShuffle { seed: u64 },
}

impl Redistribution {
    pub fn redistribute<T: Clone>(
        &self,
        previous: &[Vec<T>],
        batch_size: usize,
        round: u32,
    ) -> Vec<Vec<T>> {
        match *self {
            Self::RoundRobin => partition_round_robin(previous, batch_size),
            Self::SeededShuffle { seed } => {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(u64::from(round)));
                let mut shuffled: Vec<Vec<T>> = previous.to_vec();
                shuffled.shuffle(&mut rng);
                for source in shuffled.iter_mut() {
                    source.shuffle(&mut rng);
                }
                partition_round_robin(&shuffled, batch_size)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(batches: &[Vec<u32>]) -> Vec<u32> {
        let mut all: Vec<u32> = batches.iter().flatten().copied().collect();
        all.sort_unstable();
        all
    }

    #[test]
    fn initial_partition_chunks_in_order() {
        let items: Vec<u32> = (0..320).collect();
        let batches = partition_initial(&items, 150);

        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![150, 150, 20]);
        assert_eq!(batches[1][0], 150);
        assert_eq!(batches.concat(), items);
    }

    #[test]
    fn initial_partition_of_empty_input_has_no_batches() {
        assert!(partition_initial::<u32>(&[], 10).is_empty());
    }

    #[test]
    fn round_robin_interleaves_sources() {
        let previous = vec![vec![1, 2, 3], vec![10, 20], vec![100]];
        let batches = partition_round_robin(&previous, 4);

        assert_eq!(batches, vec![vec![1, 10, 100, 2], vec![20, 3]]);
    }

    #[test]
    fn round_robin_skips_exhausted_sources() {
        let previous = vec![vec![], vec![1, 2, 3, 4], vec![], vec![9]];
        let batches = partition_round_robin(&previous, 10);

        assert_eq!(batches, vec![vec![1, 9, 2, 3, 4]]);
    }

    #[test]
    fn round_robin_with_all_sources_empty_yields_nothing() {
        let previous: Vec<Vec<u32>> = vec![vec![], vec![]];
        assert!(partition_round_robin(&previous, 5).is_empty());
        assert!(partition_round_robin::<u32>(&[], 5).is_empty());
    }

    #[test]
    fn round_robin_conserves_items_and_bounds_batches() {
        let previous: Vec<Vec<u32>> = vec![
            (0..140).collect(),
            (1000..1145).collect(),
            (5000..5020).collect(),
        ];
        let batches = partition_round_robin(&previous, 150);

        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![150, 150, 5]);
        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 150));

        let mut expected: Vec<u32> = previous.concat();
        expected.sort_unstable();
        assert_eq!(sorted(&batches), expected);
    }

    #[test]
    fn round_robin_separates_previously_cobatched_items() {
        // Two sources of four; with batch size 4 each new batch takes two from each.
        let previous = vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]];
        let batches = partition_round_robin(&previous, 4);

        assert_eq!(batches[0], vec![1, 5, 2, 6]);
        assert_eq!(batches[1], vec![3, 7, 4, 8]);
    }

    #[test]
    fn seeded_shuffle_is_reproducible_and_conserving() {
        let previous: Vec<Vec<u32>> = vec![(0..50).collect(), (50..90).collect(), (90..95).collect()];
        let policy = Redistribution::SeededShuffle { seed: 42 };

        let a = policy.redistribute(&previous, 30, 2);
        let b = policy.redistribute(&previous, 30, 2);
        assert_eq!(a, b);
        assert_eq!(sorted(&a), (0..95).collect::<Vec<u32>>());
        assert!(a.iter().all(|batch| batch.len() <= 30));
    }

    #[test]
    fn default_policy_is_plain_round_robin() {
        let previous = vec![vec![1, 2], vec![3, 4]];
        assert_eq!(
            Redistribution::default().redistribute(&previous, 3, 2),
            partition_round_robin(&previous, 3)
        );
    }
}
