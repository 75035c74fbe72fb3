//! Remote entity references: `(rank, local index)` pairs in parallel
//! arrays.

use crate::arrays;

/// For each local copy, the rank and local index of some remote (or local)
/// counterpart, usually its owner.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Remotes {
    pub ranks: Vec<u32>,
    pub idxs: Vec<u32>,
}

impl Remotes {
    pub fn new(ranks: Vec<u32>, idxs: Vec<u32>) -> Self {
        assert_eq!(ranks.len(), idxs.len());
        Remotes { ranks, idxs }
    }

    /// All entities owned locally at their own index (the single-rank
    /// ownership).
    pub fn identity(rank: u32, n: usize) -> Self {
        Remotes {
            ranks: vec![rank; n],
            idxs: (0..n as u32).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Gather: `out[i] = self[a2b[i]]`.
    pub fn map(&self, a2b: &[u32]) -> Remotes {
        Remotes {
            ranks: arrays::map(a2b, &self.ranks, 1),
            idxs: arrays::map(a2b, &self.idxs, 1),
        }
    }

    /// Replicate entries through a fan of offsets.
    pub fn expand(&self, fan: &[u32]) -> Remotes {
        Remotes {
            ranks: arrays::expand(&self.ranks, fan, 1),
            idxs: arrays::expand(&self.idxs, fan, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_and_map() {
        let r = Remotes::identity(0, 4);
        assert_eq!(r.idxs, vec![0, 1, 2, 3]);
        let m = r.map(&[2, 0]);
        assert_eq!(m.idxs, vec![2, 0]);
        assert_eq!(m.ranks, vec![0, 0]);
    }

    #[test]
    fn expand_through_fan() {
        let r = Remotes::new(vec![1, 0], vec![5, 9]);
        let fan = crate::arrays::offset_scan(&[2u32, 1]);
        let e = r.expand(&fan);
        assert_eq!(e.ranks, vec![1, 1, 0]);
        assert_eq!(e.idxs, vec![5, 5, 9]);
    }

    #[test]
    fn serde_roundtrip() {
        let r = Remotes::new(vec![1, 0, 2], vec![5, 9, 0]);
        let s = serde_json::to_string(&r).expect("serialize");
        let back: Remotes = serde_json::from_str(&s).expect("deserialize");
        assert_eq!(back, r);
    }
}
