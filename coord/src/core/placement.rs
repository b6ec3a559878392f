use blake3::Hasher;
use rand::seq::SliceRandom;

use common::node_api::FileId;

const N_TOP_BYTES_FOR_SCORE: usize = 16;

/// Chooses which of the currently available nodes receive a new file.
pub trait PlacementStrategy: Send + Sync {
    /// Returns at most `count` distinct ids taken from `candidates`.
    fn select(&self, file_id: FileId, candidates: &[String], count: usize) -> Vec<String>;

    fn name(&self) -> &'static str;
}

/// Uniform random choice. No load or capacity awareness.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPlacement;

impl PlacementStrategy for RandomPlacement {
    fn select(&self, _file_id: FileId, candidates: &[String], count: usize) -> Vec<String> {
        let mut shuffled = candidates.to_vec();
        shuffled.shuffle(&mut rand::rng());
        shuffled.truncate(count);
        shuffled
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Highest-random-weight placement: the same file id keeps landing on the
/// same nodes as long as they stay available.
#[derive(Debug, Default, Clone, Copy)]
pub struct RendezvousPlacement;

impl PlacementStrategy for RendezvousPlacement {
    fn select(&self, file_id: FileId, candidates: &[String], count: usize) -> Vec<String> {
        rank_nodes(&file_id.to_string(), candidates)
            .into_iter()
            .take(count)
            .cloned()
            .collect()
    }

    fn name(&self) -> &'static str {
        "rendezvous"
    }
}

pub fn rank_nodes<'a>(key: &str, node_ids: &'a [String]) -> Vec<&'a String> {
    let mut scored: Vec<(u128, &String)> = node_ids
        .iter()
        .map(|id| {
            let mut h = Hasher::new();
            h.update(key.as_bytes());
            h.update(id.as_bytes());

            let hash = h.finalize();
            let mut score_bytes = [0u8; N_TOP_BYTES_FOR_SCORE];
            score_bytes.copy_from_slice(&hash.as_bytes()[..N_TOP_BYTES_FOR_SCORE]);

            (u128::from_be_bytes(score_bytes), id)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored.into_iter().map(|(_, id)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("storage-node-{i}")).collect()
    }

    #[test]
    fn random_placement_picks_distinct_candidates() {
        let nodes = ids(5);
        for _ in 0..50 {
            let picked = RandomPlacement.select(1, &nodes, 3);
            assert_eq!(picked.len(), 3);
            let unique: HashSet<_> = picked.iter().collect();
            assert_eq!(unique.len(), 3);
            assert!(picked.iter().all(|p| nodes.contains(p)));
        }
    }

    #[test]
    fn random_placement_caps_at_available() {
        let nodes = ids(1);
        assert_eq!(RandomPlacement.select(1, &nodes, 2), nodes);
        assert!(RandomPlacement.select(1, &[], 2).is_empty());
    }

    #[test]
    fn random_placement_eventually_uses_every_node() {
        let nodes = ids(3);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.extend(RandomPlacement.select(1, &nodes, 1));
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn rendezvous_is_stable_and_order_independent() {
        let nodes = ids(4);
        let mut reversed = nodes.clone();
        reversed.reverse();

        let a = RendezvousPlacement.select(1234, &nodes, 2);
        let b = RendezvousPlacement.select(1234, &reversed, 2);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn rendezvous_only_moves_files_from_removed_node() {
        let nodes = ids(4);
        let top = RendezvousPlacement.select(99, &nodes, 1);
        let survivors: Vec<String> = nodes.iter().filter(|n| **n != top[0]).cloned().collect();

        let full_rank: Vec<String> = rank_nodes("99", &nodes).into_iter().cloned().collect();
        let reduced = RendezvousPlacement.select(99, &survivors, 1);
        assert_eq!(reduced[0], full_rank[1]);
    }
}
