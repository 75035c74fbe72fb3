//! Elementwise and gather/scatter kernels.

use rayon::prelude::*;

/// Gather: `out[i*ncomps + c] = b_data[a2b[i]*ncomps + c]`.
pub fn map<T: Copy + Send + Sync>(a2b: &[u32], b_data: &[T], ncomps: usize) -> Vec<T> {
    assert_eq!(b_data.len() % ncomps, 0);
    a2b.par_iter()
        .flat_map_iter(|&b| {
            let at = b as usize * ncomps;
            b_data[at..at + ncomps].iter().copied()
        })
        .collect()
}

/// Scatter: `out[a2b[i]*ncomps + c] = a_data[i*ncomps + c]`, remaining slots
/// filled with `fill`. `a2b` must be injective.
pub fn unmap<T: Copy>(a2b: &[u32], a_data: &[T], nb: usize, fill: T, ncomps: usize) -> Vec<T> {
    assert_eq!(a_data.len(), a2b.len() * ncomps);
    let mut out = vec![fill; nb * ncomps];
    for (i, &b) in a2b.iter().enumerate() {
        let src = i * ncomps;
        let dst = b as usize * ncomps;
        out[dst..dst + ncomps].copy_from_slice(&a_data[src..src + ncomps]);
    }
    out
}

/// Scatter through a permutation: `out[perm[i]*ncomps + c] = data[i*ncomps + c]`.
pub fn permute<T: Copy>(data: &[T], perm: &[u32], ncomps: usize) -> Vec<T> {
    assert_eq!(data.len(), perm.len() * ncomps);
    let n = perm.len();
    if data.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(data.len());
    // written below through every slot exactly once
    out.resize(data.len(), data[0]);
    for (i, &p) in perm.iter().enumerate() {
        debug_assert!((p as usize) < n);
        let src = i * ncomps;
        let dst = p as usize * ncomps;
        out[dst..dst + ncomps].copy_from_slice(&data[src..src + ncomps]);
    }
    out
}

/// In-place scatter into an existing buffer.
pub fn map_into<T: Copy>(a_data: &[T], a2b: &[u32], b_data: &mut [T], ncomps: usize) {
    assert_eq!(a_data.len(), a2b.len() * ncomps);
    for (i, &b) in a2b.iter().enumerate() {
        let src = i * ncomps;
        let dst = b as usize * ncomps;
        b_data[dst..dst + ncomps].copy_from_slice(&a_data[src..src + ncomps]);
    }
}

/// Replicate `a_data[i]` `fan[i+1]-fan[i]` times.
pub fn expand<T: Copy + Send + Sync>(a_data: &[T], fan: &[u32], ncomps: usize) -> Vec<T> {
    let na = fan.len() - 1;
    assert_eq!(a_data.len(), na * ncomps);
    (0..na)
        .into_par_iter()
        .flat_map_iter(|a| {
            let reps = (fan[a + 1] - fan[a]) as usize;
            let at = a * ncomps;
            std::iter::repeat(&a_data[at..at + ncomps])
                .take(reps)
                .flat_map(|s| s.iter().copied())
        })
        .collect()
}

/// `out[i] = (xs[i] == val) as u8`.
pub fn each_eq_to<T: PartialEq + Copy + Send + Sync>(xs: &[T], val: T) -> Vec<u8> {
    xs.par_iter().map(|&x| u8::from(x == val)).collect()
}

/// `out[i] = (xs[i] != val) as u8`.
pub fn each_neq_to<T: PartialEq + Copy + Send + Sync>(xs: &[T], val: T) -> Vec<u8> {
    xs.par_iter().map(|&x| u8::from(x != val)).collect()
}

/// `out[i] = (xs[i] < val) as u8`.
pub fn each_lt<T: PartialOrd + Copy + Send + Sync>(xs: &[T], val: T) -> Vec<u8> {
    xs.par_iter().map(|&x| u8::from(x < val)).collect()
}

/// `out[i] = (xs[i] >= val) as u8`.
pub fn each_geq<T: PartialOrd + Copy + Send + Sync>(xs: &[T], val: T) -> Vec<u8> {
    xs.par_iter().map(|&x| u8::from(x >= val)).collect()
}

/// Elementwise logical and of two mark arrays.
pub fn land_each(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert_eq!(a.len(), b.len());
    a.par_iter()
        .zip(b.par_iter())
        .map(|(&x, &y)| x & y)
        .collect()
}

/// Elementwise logical or of two mark arrays.
pub fn lor_each(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert_eq!(a.len(), b.len());
    a.par_iter()
        .zip(b.par_iter())
        .map(|(&x, &y)| x | y)
        .collect()
}

/// Logical negation of a mark array.
pub fn invert_marks(marks: &[u8]) -> Vec<u8> {
    marks.par_iter().map(|&m| u8::from(m == 0)).collect()
}

/// Ascending indices of the nonzero marks.
pub fn collect_marked(marks: &[u8]) -> Vec<u32> {
    marks
        .iter()
        .enumerate()
        .filter(|(_, &m)| m != 0)
        .map(|(i, _)| i as u32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_then_scatter_is_identity() {
        let data = [0.1, 0.2, 0.3, 0.4];
        let perm = [3u32, 2, 1, 0];
        let gathered = map(&perm, &data, 1);
        assert_eq!(gathered, vec![0.4, 0.3, 0.2, 0.1]);
        let back = permute(&gathered, &perm, 1);
        assert_eq!(back, data.to_vec());
        let back2 = unmap(&perm, &gathered, 4, 0.0, 1);
        assert_eq!(back2, data.to_vec());
    }

    #[test]
    fn expand_replicates_by_fan() {
        let fan = crate::arrays::offset_scan(&[2u32, 1, 3]);
        let data = [2.2, 3.14, 42.0];
        assert_eq!(
            expand(&data, &fan, 1),
            vec![2.2, 2.2, 3.14, 42.0, 42.0, 42.0]
        );
    }

    #[test]
    fn marks_and_collection() {
        let marks = each_lt(&[3.0, 0.5, 2.0, 0.1], 1.0);
        assert_eq!(marks, vec![0, 1, 0, 1]);
        assert_eq!(collect_marked(&marks), vec![1, 3]);
        assert_eq!(invert_marks(&marks), vec![1, 0, 1, 0]);
        assert_eq!(land_each(&marks, &[1, 1, 0, 0]), vec![0, 1, 0, 0]);
    }

    #[test]
    fn scatter_with_fill() {
        let out = unmap(&[1u32, 3], &[7i8, 9], 5, -1, 1);
        assert_eq!(out, vec![-1, 7, -1, 9, -1]);
    }

    #[test]
    fn multi_component_gather() {
        let coords = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        assert_eq!(map(&[2u32, 0], &coords, 2), vec![0.0, 1.0, 0.0, 0.0]);
    }
}
