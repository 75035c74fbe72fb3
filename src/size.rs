//! Edge lengths, element sizes, and implied size fields.

use rayon::prelude::*;

use crate::mesh::{Mesh, EDGE, METRIC, SIZE, VERT};
use crate::metric::{compose_metric2, compose_metric3, get_mident_metrics, project_metrics};
use crate::numerics::*;
use crate::topology::simplex::ndown_of;

/// Area of the unit-edge equilateral triangle.
pub const UNIT_TRI_SIZE: f64 = 0.433_012_701_892_219_3;
/// Volume of the unit-edge regular tetrahedron.
pub const UNIT_TET_SIZE: f64 = 0.117_851_130_197_757_92;

/// Length of an edge whose endpoint metrics measure it as `la` and `lb`:
/// the log-mean, so the value interpolates the metric exponentially along
/// the edge.
pub fn edge_length(la: f64, lb: f64) -> f64 {
    if are_close(la, lb) {
        (la + lb) / 2.0
    } else {
        (la - lb) / (la / lb).ln()
    }
}

fn edge_vector<const N: usize>(coords: &[f64], a: u32, b: u32) -> [f64; N] {
    sub(
        get_vector::<N>(coords, b as usize),
        get_vector::<N>(coords, a as usize),
    )
}

/// Metric-aware lengths of the listed edges; falls back to the isotropic
/// size field and then to Euclidean length.
pub fn measure_edges_subset(mesh: &Mesh, edges: &[u32]) -> Vec<f64> {
    let coords = mesh.coords();
    let ev2v = mesh.ask_verts_of(EDGE);
    let dim = mesh.dim();
    if mesh.has_tag(VERT, METRIC) {
        let v2m = mesh.get_array_f64(VERT, METRIC).unwrap();
        edges
            .par_iter()
            .map(|&e| {
                let a = ev2v[e as usize * 2];
                let b = ev2v[e as usize * 2 + 1];
                match dim {
                    2 => {
                        let d = edge_vector::<2>(coords, a, b);
                        let la = dot(d, mat_vec(get_symm2(v2m, a as usize), d)).sqrt();
                        let lb = dot(d, mat_vec(get_symm2(v2m, b as usize), d)).sqrt();
                        edge_length(la, lb)
                    }
                    _ => {
                        let d = edge_vector::<3>(coords, a, b);
                        let la = dot(d, mat_vec(get_symm3(v2m, a as usize), d)).sqrt();
                        let lb = dot(d, mat_vec(get_symm3(v2m, b as usize), d)).sqrt();
                        edge_length(la, lb)
                    }
                }
            })
            .collect()
    } else if mesh.has_tag(VERT, SIZE) {
        let v2h = mesh.get_array_f64(VERT, SIZE).unwrap();
        edges
            .par_iter()
            .map(|&e| {
                let a = ev2v[e as usize * 2] as usize;
                let b = ev2v[e as usize * 2 + 1] as usize;
                let len = match dim {
                    2 => norm(edge_vector::<2>(coords, a as u32, b as u32)),
                    _ => norm(edge_vector::<3>(coords, a as u32, b as u32)),
                };
                edge_length(len / v2h[a], len / v2h[b])
            })
            .collect()
    } else {
        edges
            .par_iter()
            .map(|&e| {
                let a = ev2v[e as usize * 2];
                let b = ev2v[e as usize * 2 + 1];
                match dim {
                    2 => norm(edge_vector::<2>(coords, a, b)),
                    _ => norm(edge_vector::<3>(coords, a, b)),
                }
            })
            .collect()
    }
}

/// Lengths of every edge.
pub fn measure_edges(mesh: &Mesh) -> Vec<f64> {
    let all: Vec<u32> = (0..mesh.nedges() as u32).collect();
    measure_edges_subset(mesh, &all)
}

/// Signed area of a triangle given 2D corner coordinates.
pub fn triangle_size(p: [[f64; 2]; 3]) -> f64 {
    cross2(sub(p[1], p[0]), sub(p[2], p[0])) / 2.0
}

/// Signed volume of a tetrahedron.
pub fn tet_size(p: [[f64; 3]; 4]) -> f64 {
    dot(sub(p[1], p[0]), cross(sub(p[2], p[0]), sub(p[3], p[0]))) / 6.0
}

/// Gather an element's corner coordinates.
pub fn gather_coords<const N: usize, const NV: usize>(
    coords: &[f64],
    verts: &[u32],
) -> [[f64; N]; NV] {
    std::array::from_fn(|i| get_vector::<N>(coords, verts[i] as usize))
}

/// Euclidean sizes of every element.
pub fn measure_elements_real(mesh: &Mesh) -> Vec<f64> {
    let coords = mesh.coords();
    let dim = mesh.dim();
    let deg = ndown_of(dim);
    let ev2v = mesh.ask_verts_of(dim);
    (0..mesh.nelems())
        .into_par_iter()
        .map(|e| {
            let verts = &ev2v[e * deg..(e + 1) * deg];
            match dim {
                2 => triangle_size(gather_coords::<2, 3>(coords, verts)),
                _ => tet_size(gather_coords::<3, 4>(coords, verts)),
            }
        })
        .collect()
}

/// The metric whose unit ball is exactly this triangle's edges.
pub fn element_implied_metric2(p: [[f64; 2]; 3]) -> [[f64; 2]; 2] {
    let edges = [sub(p[1], p[0]), sub(p[2], p[1]), sub(p[0], p[2])];
    let a: [[f64; 3]; 3] = std::array::from_fn(|col| {
        std::array::from_fn(|row| {
            let e = edges[row];
            match col {
                0 => e[0] * e[0],
                1 => 2.0 * e[0] * e[1],
                _ => e[1] * e[1],
            }
        })
    });
    let x = solve_linear(a, [1.0, 1.0, 1.0]);
    [[x[0], x[1]], [x[1], x[2]]]
}

/// The metric whose unit ball is exactly this tetrahedron's edges.
pub fn element_implied_metric3(p: [[f64; 3]; 4]) -> [[f64; 3]; 3] {
    let edges = [
        sub(p[1], p[0]),
        sub(p[2], p[1]),
        sub(p[0], p[2]),
        sub(p[3], p[0]),
        sub(p[3], p[1]),
        sub(p[3], p[2]),
    ];
    let a: [[f64; 6]; 6] = std::array::from_fn(|col| {
        std::array::from_fn(|row| {
            let e = edges[row];
            match col {
                0 => e[0] * e[0],
                1 => 2.0 * e[0] * e[1],
                2 => 2.0 * e[0] * e[2],
                3 => e[1] * e[1],
                4 => 2.0 * e[1] * e[2],
                _ => e[2] * e[2],
            }
        })
    });
    let x = solve_linear(a, [1.0; 6]);
    [
        [x[0], x[1], x[2]],
        [x[1], x[3], x[4]],
        [x[2], x[4], x[5]],
    ]
}

/// Average element values onto vertices through the upward adjacency.
pub fn project_by_average(mesh: &Mesh, e2x: &[f64], width: usize) -> Vec<f64> {
    let dim = mesh.dim();
    assert_eq!(e2x.len(), mesh.nelems() * width);
    let up = mesh.ask_up(VERT, dim);
    let mut out = vec![0.0; mesh.nverts() * width];
    out.par_chunks_mut(width).enumerate().for_each(|(v, chunk)| {
        let lo = up.a2ab[v] as usize;
        let hi = up.a2ab[v + 1] as usize;
        if lo == hi {
            return;
        }
        for ab in lo..hi {
            let e = up.ab2b[ab] as usize;
            for (c, slot) in chunk.iter_mut().enumerate() {
                *slot += e2x[e * width + c];
            }
        }
        let inv = 1.0 / (hi - lo) as f64;
        for slot in chunk.iter_mut() {
            *slot *= inv;
        }
    });
    mesh.sync_array(VERT, &out, width)
}

/// Per-vertex metric implied by the current element shapes.
pub fn find_implied_metric(mesh: &Mesh) -> Vec<f64> {
    let coords = mesh.coords();
    let dim = mesh.dim();
    let deg = ndown_of(dim);
    let ev2v = mesh.ask_verts_of(dim);
    let nc = symm_ncomps(dim);
    let mut e2m = vec![0.0; mesh.nelems() * nc];
    match dim {
        2 => e2m.par_chunks_mut(nc).enumerate().for_each(|(e, chunk)| {
            let verts = &ev2v[e * deg..(e + 1) * deg];
            set_symm2(chunk, 0, element_implied_metric2(gather_coords(coords, verts)));
        }),
        _ => e2m.par_chunks_mut(nc).enumerate().for_each(|(e, chunk)| {
            let verts = &ev2v[e * deg..(e + 1) * deg];
            set_symm3(chunk, 0, element_implied_metric3(gather_coords(coords, verts)));
        }),
    }
    project_metrics(mesh, &e2m)
}

/// Per-vertex isotropic size implied by the current element sizes.
pub fn find_implied_size(mesh: &Mesh) -> Vec<f64> {
    let dim = mesh.dim();
    let unit = if dim == 2 { UNIT_TRI_SIZE } else { UNIT_TET_SIZE };
    let e2h: Vec<f64> = measure_elements_real(mesh)
        .into_iter()
        .map(|v| (v.abs() / unit).powf(1.0 / dim as f64))
        .collect();
    project_by_average(mesh, &e2h, 1)
}

/// Element count the metric field asks for: metric-measured volume over
/// the volume of the unit-edge regular simplex.
pub fn expected_nelems(mesh: &Mesh, v2m: &[f64]) -> f64 {
    let dim = mesh.dim();
    let nc = symm_ncomps(dim);
    let unit = if dim == 2 { UNIT_TRI_SIZE } else { UNIT_TET_SIZE };
    let sizes = measure_elements_real(mesh);
    let all: Vec<u32> = (0..mesh.nelems() as u32).collect();
    let mident = get_mident_metrics(mesh, dim, &all, v2m);
    let per_elem: Vec<f64> = sizes
        .par_iter()
        .enumerate()
        .map(|(e, &v)| {
            let det = match dim {
                2 => det2(get_symm2(&mident, e)),
                _ => det3(get_symm3(&mident, e)),
            };
            v.abs() * det.sqrt() / unit
        })
        .collect();
    // this estimate feeds the scalar fixed point, so it must agree
    // bitwise across rank counts
    crate::dist::repro_sum_all(mesh.comm().as_ref(), &per_elem)
}

/// Multiplier for a metric field so its expected element count hits the
/// target (`est * s^(dim/2) = target`).
pub fn metric_scalar_for_nelems(mesh: &Mesh, v2m: &[f64], target_nelems: f64) -> f64 {
    let est = expected_nelems(mesh, v2m);
    (target_nelems / est).powf(2.0 / mesh.dim() as f64)
}

/// Multiplier for an isotropic size field so its expected element count
/// hits the target (`est / s^dim = target`).
pub fn size_scalar_for_nelems(mesh: &Mesh, v2h: &[f64], target_nelems: f64) -> f64 {
    let dim = mesh.dim();
    let nc = symm_ncomps(dim);
    // sizes enter as the equivalent isotropic metric
    let mut v2m = vec![0.0; mesh.nverts() * nc];
    match dim {
        2 => {
            for (v, chunk) in v2m.chunks_mut(nc).enumerate() {
                set_symm2(chunk, 0, compose_metric2(identity_matrix(), [v2h[v]; 2]));
            }
        }
        _ => {
            for (v, chunk) in v2m.chunks_mut(nc).enumerate() {
                set_symm3(chunk, 0, compose_metric3(identity_matrix(), [v2h[v]; 3]));
            }
        }
    }
    let est = expected_nelems(mesh, &v2m);
    (est / target_nelems).powf(1.0 / dim as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::build::build_box;
    use std::sync::Arc;

    #[test]
    fn log_mean_edge_length() {
        assert!(are_close(edge_length(1.0, 1.0), 1.0));
        assert!(edge_length(1.0, 2.0) > 1.0);
        assert!(edge_length(1.0, 2.0) < 1.5);
        assert!(are_close(edge_length(1.0, 2.0), 1.0 / 2.0_f64.ln()));
    }

    #[test]
    fn euclidean_edge_lengths_of_unit_box() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        let lengths = measure_edges(&mesh);
        let sqrt2 = 2.0_f64.sqrt();
        let expect = [1.0, 1.0, sqrt2, 1.0, 1.0];
        assert!(are_close_arrays(&lengths, &expect, 1e-12, 1e-12));
    }

    #[test]
    fn implied_metric_of_perfect_elements() {
        // perfect triangle with edge length 2
        let tri = [
            [1.0, 0.0],
            [0.0, 3.0_f64.sqrt()],
            [-1.0, 0.0],
        ];
        let m = element_implied_metric2(tri);
        let expect = compose_metric2(identity_matrix(), [2.0, 2.0]);
        for j in 0..2 {
            assert!(are_close_arrays(&m[j], &expect[j], 1e-10, 1e-10));
        }
        let s = 1.0 / 2.0_f64.sqrt();
        let tet = [
            [1.0, 0.0, -s],
            [-1.0, 0.0, -s],
            [0.0, -1.0, s],
            [0.0, 1.0, s],
        ];
        let m = element_implied_metric3(tet);
        let expect = compose_metric3(identity_matrix(), [2.0, 2.0, 2.0]);
        for j in 0..3 {
            assert!(are_close_arrays(&m[j], &expect[j], 1e-10, 1e-10));
        }
    }

    #[test]
    fn implied_fields_scale_to_the_current_element_count() {
        for dim3 in [false, true] {
            let n = if dim3 { 1 } else { 0 };
            let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, n as f64, 4, 4, 4 * n).unwrap();
            let target = mesh.nelems() as f64;
            let size = find_implied_size(&mesh);
            let scal = size_scalar_for_nelems(&mesh, &size, target);
            assert!(are_close_tol(scal, 1.0, 0.05, 0.0), "size scalar {scal}");
            if !dim3 {
                let metric = find_implied_metric(&mesh);
                let scal = metric_scalar_for_nelems(&mesh, &metric, target);
                assert!(are_close_tol(scal, 1.0, 0.05, 0.0), "metric scalar {scal}");
            }
        }
    }
}
