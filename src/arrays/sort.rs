//! Stable key sorting.

use rayon::prelude::*;

/// Stable permutation sorting `keys` viewed as lexicographic blocks of
/// `width` entries: `keys[perm[i]*width ..][..width]` is nondecreasing in
/// `i`. Equal blocks keep their original relative order, so the result is
/// deterministic regardless of thread count.
pub fn sort_by_keys<T: Ord + Copy + Send + Sync>(keys: &[T], width: usize) -> Vec<u32> {
    assert!(width > 0);
    assert_eq!(keys.len() % width, 0);
    let n = keys.len() / width;
    let mut perm: Vec<u32> = (0..n as u32).collect();
    perm.par_sort_by(|&a, &b| {
        let ka = &keys[a as usize * width..(a as usize + 1) * width];
        let kb = &keys[b as usize * width..(b as usize + 1) * width];
        ka.cmp(kb)
    });
    perm
}
