//! Element shape quality.
//!
//! Mean-ratio measures normalized to [0, 1]: the triangle measure is
//! `sqrt(48 A^2 / (sum l^2)^2)` and the tetrahedron measure
//! `cbrt(15552 V^2 / (sum l^2)^3)`, with area, volume, and edge lengths
//! taken under the evaluation metric. A perfect simplex in its own metric
//! scores exactly 1, degenerate elements 0, inverted ones negative.

use rayon::prelude::*;

use crate::mesh::{Mesh, METRIC, VERT};
use crate::metric::{average_metric2, average_metric3};
use crate::numerics::*;
use crate::size::{tet_size, triangle_size};
use crate::topology::simplex::ndown_of;

const TRI_EDGES: [(usize, usize); 3] = [(0, 1), (1, 2), (2, 0)];
const TET_EDGES: [(usize, usize); 6] = [(0, 1), (1, 2), (2, 0), (0, 3), (1, 3), (2, 3)];

/// Quality of a triangle under a metric.
pub fn metric_triangle_quality(p: [[f64; 2]; 3], m: [[f64; 2]; 2]) -> f64 {
    let area = triangle_size(p) * det2(m).sqrt();
    let mut s = 0.0;
    for (a, b) in TRI_EDGES {
        let d = sub(p[b], p[a]);
        s += dot(d, mat_vec(m, d));
    }
    if s == 0.0 {
        return 0.0;
    }
    (48.0 * area * area / (s * s)).sqrt().copysign(area)
}

/// Quality of a triangle in Euclidean space.
pub fn real_triangle_quality(p: [[f64; 2]; 3]) -> f64 {
    metric_triangle_quality(p, identity_matrix())
}

/// Quality of a tetrahedron under a metric.
pub fn metric_tet_quality(p: [[f64; 3]; 4], m: [[f64; 3]; 3]) -> f64 {
    let vol = tet_size(p) * det3(m).sqrt();
    let mut s = 0.0;
    for (a, b) in TET_EDGES {
        let d = sub(p[b], p[a]);
        s += dot(d, mat_vec(m, d));
    }
    if s == 0.0 {
        return 0.0;
    }
    (15552.0 * vol * vol / (s * s * s)).cbrt().copysign(vol)
}

/// Quality of a tetrahedron in Euclidean space.
pub fn real_tet_quality(p: [[f64; 3]; 4]) -> f64 {
    metric_tet_quality(p, identity_matrix())
}

/// Metric-aware qualities of the listed elements; vertex metrics are
/// averaged per element, identity when the mesh carries no metric.
pub fn measure_qualities_subset(mesh: &Mesh, elems: &[u32]) -> Vec<f64> {
    let dim = mesh.dim();
    let deg = ndown_of(dim);
    let coords = mesh.coords();
    let ev2v = mesh.ask_verts_of(dim);
    let v2m = if mesh.has_tag(VERT, METRIC) {
        Some(mesh.get_array_f64(VERT, METRIC).unwrap())
    } else {
        None
    };
    elems
        .par_iter()
        .map(|&e| {
            let verts = &ev2v[e as usize * deg..(e as usize + 1) * deg];
            match dim {
                2 => {
                    let p = crate::size::gather_coords::<2, 3>(coords, verts);
                    let m = match v2m {
                        Some(v2m) => {
                            let ms: Vec<[[f64; 2]; 2]> = verts
                                .iter()
                                .map(|&v| get_symm2(v2m, v as usize))
                                .collect();
                            average_metric2(&ms)
                        }
                        None => identity_matrix(),
                    };
                    metric_triangle_quality(p, m)
                }
                _ => {
                    let p = crate::size::gather_coords::<3, 4>(coords, verts);
                    let m = match v2m {
                        Some(v2m) => {
                            let ms: Vec<[[f64; 3]; 3]> = verts
                                .iter()
                                .map(|&v| get_symm3(v2m, v as usize))
                                .collect();
                            average_metric3(&ms)
                        }
                        None => identity_matrix(),
                    };
                    metric_tet_quality(p, m)
                }
            }
        })
        .collect()
}

/// Qualities of every element.
pub fn measure_qualities(mesh: &Mesh) -> Vec<f64> {
    let all: Vec<u32> = (0..mesh.nelems() as u32).collect();
    measure_qualities_subset(mesh, &all)
}

/// Smallest element quality across all ranks.
pub fn min_fixable_quality(mesh: &Mesh) -> f64 {
    let quals = measure_qualities(mesh);
    let local = quals.iter().copied().fold(f64::INFINITY, f64::min);
    mesh.comm()
        .allreduce_f64(local, crate::arrays::ReduceOp::Min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perfect_tri() -> [[f64; 2]; 3] {
        [[1.0, 0.0], [0.0, 3.0_f64.sqrt()], [-1.0, 0.0]]
    }

    fn perfect_tet() -> [[f64; 3]; 4] {
        let s = 1.0 / 2.0_f64.sqrt();
        [
            [1.0, 0.0, -s],
            [-1.0, 0.0, -s],
            [0.0, -1.0, s],
            [0.0, 1.0, s],
        ]
    }

    #[test]
    fn perfect_elements_score_one() {
        assert!(are_close(real_triangle_quality(perfect_tri()), 1.0));
        assert!(are_close(real_tet_quality(perfect_tet()), 1.0));
    }

    #[test]
    fn flat_elements_score_zero() {
        let flat_tri = [[1.0, 0.0], [0.0, 0.0], [-1.0, 0.0]];
        let flat_tet = [
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, -1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        assert!(are_close(real_triangle_quality(flat_tri), 0.0));
        assert!(are_close(real_tet_quality(flat_tet), 0.0));
    }

    #[test]
    fn inverted_elements_score_negative() {
        let inv_tri = [[1.0, 0.0], [-1.0, 0.0], [0.0, 3.0_f64.sqrt()]];
        let s = 1.0 / 2.0_f64.sqrt();
        let inv_tet = [
            [1.0, 0.0, -s],
            [-1.0, 0.0, -s],
            [0.0, 1.0, s],
            [0.0, -1.0, s],
        ];
        assert!(real_triangle_quality(inv_tri) < 0.0);
        assert!(real_tet_quality(inv_tet) < 0.0);
    }

    #[test]
    fn metric_quality_matches_stretched_space() {
        // squash space so the squashed elements become perfect again
        let m2 = crate::metric::compose_metric2(identity_matrix(), [1.0, 0.5]);
        let mut tri = perfect_tri();
        for p in tri.iter_mut() {
            p[1] /= 2.0;
        }
        assert!(are_close(metric_triangle_quality(tri, m2), 1.0));
        let m3 = crate::metric::compose_metric3(identity_matrix(), [1.0, 1.0, 0.5]);
        let mut tet = perfect_tet();
        for p in tet.iter_mut() {
            p[2] /= 2.0;
        }
        assert!(are_close(metric_tet_quality(tet, m3), 1.0));
    }

    #[test]
    fn identity_metric_equals_real_quality() {
        let tri = [[0.0, 0.0], [1.0, 0.0], [0.3, 0.8]];
        assert!(are_close(
            metric_triangle_quality(tri, identity_matrix()),
            real_triangle_quality(tri)
        ));
    }
}
