// ============================================================
// Layer 4 — Distributed Sampler
// ============================================================
// Decides which dataset indices a worker visits in an epoch,
// and in what order.
//
//   1. Shuffle 0..len with an RNG seeded by (seed + epoch).
//      Every worker uses the same seed, so every worker computes
//      the same permutation.
//   2. Pad the permutation by wrapping around until its length is
//      a multiple of num_replicas, so every shard has equal size
//      and every worker runs the same number of steps.
//   3. Worker `rank` takes positions rank, rank + R, rank + 2R, ...
//
// Shards are disjoint apart from the padding, and calling
// set_epoch with a new value reshuffles identically on every
// worker.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

#[derive(Debug, Clone)]
pub struct DistributedSampler {
    len:          usize,
    num_replicas: usize,
    rank:         usize,
    seed:         u64,
    epoch:        u64,
}

impl DistributedSampler {
    /// A sampler for one shard of `len` items. `num_replicas == 1`
    /// gives a plain per-epoch shuffle of the whole dataset.
    pub fn new(len: usize, num_replicas: usize, rank: usize, seed: u64) -> Self {
        let num_replicas = num_replicas.max(1);
        assert!(rank < num_replicas, "rank {rank} out of range for {num_replicas} replicas");
        Self { len, num_replicas, rank, seed, epoch: 0 }
    }

    pub fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch as u64;
    }

    /// Items per shard, padding included.
    pub fn num_samples(&self) -> usize {
        self.len.div_ceil(self.num_replicas)
    }

    pub fn indices(&self) -> Vec<usize> {
        if self.len == 0 {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..self.len).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch));
        order.shuffle(&mut rng);

        let total = self.num_samples() * self.num_replicas;
        let mut i = 0;
        while order.len() < total {
            order.push(order[i % self.len]);
            i += 1;
        }

        order
            .into_iter()
            .skip(self.rank)
            .step_by(self.num_replicas)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_epoch_same_order() {
        let mut a = DistributedSampler::new(20, 1, 0, 7);
        let mut b = DistributedSampler::new(20, 1, 0, 7);
        a.set_epoch(3);
        b.set_epoch(3);
        assert_eq!(a.indices(), b.indices());
    }

    #[test]
    fn new_epoch_reshuffles() {
        let mut s = DistributedSampler::new(50, 1, 0, 0);
        let first = s.indices();
        s.set_epoch(1);
        assert_ne!(first, s.indices());
    }

    #[test]
    fn shards_are_disjoint_and_cover_dataset() {
        let world = 3;
        let mut seen = HashSet::new();
        let mut total = 0;
        for rank in 0..world {
            let mut s = DistributedSampler::new(12, world, rank, 5);
            s.set_epoch(2);
            let shard = s.indices();
            assert_eq!(shard.len(), 4);
            total += shard.len();
            seen.extend(shard);
        }
        assert_eq!(total, 12);
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn uneven_split_pads_every_shard_to_same_length() {
        let lens: Vec<usize> = (0..4)
            .map(|rank| DistributedSampler::new(10, 4, rank, 0).indices().len())
            .collect();
        assert_eq!(lens, vec![3, 3, 3, 3]);
    }

    #[test]
    fn empty_dataset_yields_nothing() {
        assert!(DistributedSampler::new(0, 2, 1, 0).indices().is_empty());
    }
}
