//! Per-vertex symmetric positive-definite metric fields.
//!
//! Metrics are packed componentwise (3 components in 2D, 6 in 3D). All
//! averaging happens in log space (matrix logarithm through the
//! eigendecomposition) so that componentwise arithmetic is meaningful for
//! anisotropic tensors.

use rayon::prelude::*;

use crate::mesh::{Mesh, VERT};
use crate::numerics::*;
use crate::size;
use crate::topology::simplex::ndown_of;

/// Matrix logarithm of an SPD 2x2.
pub fn linearize_metric2(m: [[f64; 2]; 2]) -> [[f64; 2]; 2] {
    let ed = decompose_eigen2(m);
    compose_ortho2(ed.q, [ed.l[0].ln(), ed.l[1].ln()])
}

/// Matrix exponential, inverse of [`linearize_metric2`].
pub fn delinearize_metric2(m: [[f64; 2]; 2]) -> [[f64; 2]; 2] {
    let ed = decompose_eigen2(m);
    compose_ortho2(ed.q, [ed.l[0].exp(), ed.l[1].exp()])
}

/// Matrix logarithm of an SPD 3x3.
pub fn linearize_metric3(m: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let ed = decompose_eigen3(m);
    compose_ortho3(ed.q, [ed.l[0].ln(), ed.l[1].ln(), ed.l[2].ln()])
}

/// Matrix exponential, inverse of [`linearize_metric3`].
pub fn delinearize_metric3(m: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let ed = decompose_eigen3(m);
    compose_ortho3(ed.q, [ed.l[0].exp(), ed.l[1].exp(), ed.l[2].exp()])
}

/// Metric with desired length `h[i]` along orthonormal axis `q[i]`.
pub fn compose_metric2(q: [[f64; 2]; 2], h: [f64; 2]) -> [[f64; 2]; 2] {
    compose_ortho2(q, [1.0 / (h[0] * h[0]), 1.0 / (h[1] * h[1])])
}

/// Metric with desired length `h[i]` along orthonormal axis `q[i]`.
pub fn compose_metric3(q: [[f64; 3]; 3], h: [f64; 3]) -> [[f64; 3]; 3] {
    compose_ortho3(
        q,
        [
            1.0 / (h[0] * h[0]),
            1.0 / (h[1] * h[1]),
            1.0 / (h[2] * h[2]),
        ],
    )
}

/// Length the metric asks for along a unit direction.
pub fn metric_desired_length3(m: [[f64; 3]; 3], dir: [f64; 3]) -> f64 {
    1.0 / dot(dir, mat_vec(m, dir)).sqrt()
}

/// Log-Euclidean average of gathered metrics.
pub fn average_metric2(ms: &[[[f64; 2]; 2]]) -> [[f64; 2]; 2] {
    let mut acc = [[0.0; 2]; 2];
    for m in ms {
        let l = linearize_metric2(*m);
        for j in 0..2 {
            acc[j] = add(acc[j], l[j]);
        }
    }
    let s = 1.0 / ms.len() as f64;
    for col in acc.iter_mut() {
        *col = scale(*col, s);
    }
    delinearize_metric2(acc)
}

/// Log-Euclidean average of gathered metrics.
pub fn average_metric3(ms: &[[[f64; 3]; 3]]) -> [[f64; 3]; 3] {
    let mut acc = [[0.0; 3]; 3];
    for m in ms {
        let l = linearize_metric3(*m);
        for j in 0..3 {
            acc[j] = add(acc[j], l[j]);
        }
    }
    let s = 1.0 / ms.len() as f64;
    for col in acc.iter_mut() {
        *col = scale(*col, s);
    }
    delinearize_metric3(acc)
}

/// The tightest SPD tensor whose unit ball lies inside both arguments'
/// unit balls, by simultaneous diagonalization: with `T^T A T = I` and
/// `T^T B T = diag(l)`, the intersection is `T^-T diag(max(1, l)) T^-1`.
pub fn intersect_metrics2(a: [[f64; 2]; 2], b: [[f64; 2]; 2]) -> [[f64; 2]; 2] {
    let ea = decompose_eigen2(a);
    let inv_sqrt = compose_ortho2(ea.q, [1.0 / ea.l[0].sqrt(), 1.0 / ea.l[1].sqrt()]);
    let c = mat_mul(transpose(inv_sqrt), mat_mul(b, inv_sqrt));
    let ec = decompose_eigen2(c);
    let t = mat_mul(inv_sqrt, ec.q);
    let t_inv = invert2(t);
    let l = [ec.l[0].max(1.0), ec.l[1].max(1.0)];
    mat_mul(transpose(t_inv), mat_mul(diagonal(l), t_inv))
}

/// See [`intersect_metrics2`].
pub fn intersect_metrics3(a: [[f64; 3]; 3], b: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let ea = decompose_eigen3(a);
    let inv_sqrt = compose_ortho3(
        ea.q,
        [
            1.0 / ea.l[0].sqrt(),
            1.0 / ea.l[1].sqrt(),
            1.0 / ea.l[2].sqrt(),
        ],
    );
    let c = mat_mul(transpose(inv_sqrt), mat_mul(b, inv_sqrt));
    let ec = decompose_eigen3(c);
    let t = mat_mul(inv_sqrt, ec.q);
    let t_inv = invert3(t);
    let l = [ec.l[0].max(1.0), ec.l[1].max(1.0), ec.l[2].max(1.0)];
    mat_mul(transpose(t_inv), mat_mul(diagonal(l), t_inv))
}

// ---- flat-array layer ----

/// Componentwise matrix logarithm over a packed metric array.
pub fn linearize_metrics(dim: usize, metrics: &[f64]) -> Vec<f64> {
    let nc = symm_ncomps(dim);
    assert_eq!(metrics.len() % nc, 0);
    let mut out = vec![0.0; metrics.len()];
    match dim {
        2 => out
            .par_chunks_mut(nc)
            .enumerate()
            .for_each(|(i, chunk)| set_symm2(chunk, 0, linearize_metric2(get_symm2(metrics, i)))),
        3 => out
            .par_chunks_mut(nc)
            .enumerate()
            .for_each(|(i, chunk)| set_symm3(chunk, 0, linearize_metric3(get_symm3(metrics, i)))),
        _ => panic!("unsupported dimension {dim}"),
    }
    out
}

/// Componentwise matrix exponential over a packed metric array.
pub fn delinearize_metrics(dim: usize, lms: &[f64]) -> Vec<f64> {
    let nc = symm_ncomps(dim);
    assert_eq!(lms.len() % nc, 0);
    let mut out = vec![0.0; lms.len()];
    match dim {
        2 => out
            .par_chunks_mut(nc)
            .enumerate()
            .for_each(|(i, chunk)| set_symm2(chunk, 0, delinearize_metric2(get_symm2(lms, i)))),
        3 => out
            .par_chunks_mut(nc)
            .enumerate()
            .for_each(|(i, chunk)| set_symm3(chunk, 0, delinearize_metric3(get_symm3(lms, i)))),
        _ => panic!("unsupported dimension {dim}"),
    }
    out
}

/// Pointwise interpolation between two metric fields at parameter `t`,
/// computed in log space.
pub fn interpolate_between_metrics(dim: usize, a: &[f64], b: &[f64], t: f64) -> Vec<f64> {
    assert_eq!(a.len(), b.len());
    let log_a = linearize_metrics(dim, a);
    let log_b = linearize_metrics(dim, b);
    let log_c: Vec<f64> = log_a
        .par_iter()
        .zip(log_b.par_iter())
        .map(|(&x, &y)| x * (1.0 - t) + y * t)
        .collect();
    delinearize_metrics(dim, &log_c)
}

/// Metric averaged over the vertices of each listed entity.
pub fn get_mident_metrics(mesh: &Mesh, ent_dim: usize, ents: &[u32], v2m: &[f64]) -> Vec<f64> {
    let dim = mesh.dim();
    let nc = symm_ncomps(dim);
    let deg = ndown_of(ent_dim);
    let ev2v = mesh.ask_verts_of(ent_dim);
    let mut out = vec![0.0; ents.len() * nc];
    match dim {
        2 => out.par_chunks_mut(nc).enumerate().for_each(|(a, chunk)| {
            let e = ents[a] as usize;
            let ms: Vec<[[f64; 2]; 2]> = (0..deg)
                .map(|i| get_symm2(v2m, ev2v[e * deg + i] as usize))
                .collect();
            set_symm2(chunk, 0, average_metric2(&ms));
        }),
        3 => out.par_chunks_mut(nc).enumerate().for_each(|(a, chunk)| {
            let e = ents[a] as usize;
            let ms: Vec<[[f64; 3]; 3]> = (0..deg)
                .map(|i| get_symm3(v2m, ev2v[e * deg + i] as usize))
                .collect();
            set_symm3(chunk, 0, average_metric3(&ms));
        }),
        _ => unreachable!(),
    }
    out
}

/// Project an element metric field to vertices by log-space averaging.
pub fn project_metrics(mesh: &Mesh, e2m: &[f64]) -> Vec<f64> {
    let dim = mesh.dim();
    let e_linear = linearize_metrics(dim, e2m);
    let v_linear = size::project_by_average(mesh, &e_linear, symm_ncomps(dim));
    delinearize_metrics(dim, &v_linear)
}

/// One smoothing sweep: average vertex metrics onto elements and project
/// back.
pub fn smooth_metric_once(mesh: &Mesh, v2m: &[f64]) -> Vec<f64> {
    let e2e: Vec<u32> = (0..mesh.nelems() as u32).collect();
    project_metrics(mesh, &get_mident_metrics(mesh, mesh.dim(), &e2e, v2m))
}

// ---- Hessian-driven construction ----
//
// The scaling below follows Alauzet & Frey's geometric error estimate: the
// metric eigenvalues are `dim^2 |hessian eigenvalue| / (2 (dim+1)^2 eps)`,
// clamped to the [1/hmax^2, 1/hmin^2] band.

fn metric_eigenvalue_from_hessian(dim: usize, h: f64, eps: f64, hmin: f64, hmax: f64) -> f64 {
    let c_num = (dim * dim) as f64;
    let c_denom = (2 * (dim + 1) * (dim + 1)) as f64;
    let val = c_num * h.abs() / (c_denom * eps);
    val.max(1.0 / (hmax * hmax)).min(1.0 / (hmin * hmin))
}

/// Anisotropic metric from a packed Hessian field.
pub fn metric_from_hessians(
    dim: usize,
    hessians: &[f64],
    eps: f64,
    hmin: f64,
    hmax: f64,
) -> Vec<f64> {
    assert!(hmin > 0.0 && hmax > 0.0 && hmin <= hmax && eps > 0.0);
    let nc = symm_ncomps(dim);
    assert_eq!(hessians.len() % nc, 0);
    let mut out = vec![0.0; hessians.len()];
    match dim {
        2 => out.par_chunks_mut(nc).enumerate().for_each(|(i, chunk)| {
            let ed = decompose_eigen2(get_symm2(hessians, i));
            let l = [
                metric_eigenvalue_from_hessian(2, ed.l[0], eps, hmin, hmax),
                metric_eigenvalue_from_hessian(2, ed.l[1], eps, hmin, hmax),
            ];
            set_symm2(chunk, 0, compose_ortho2(ed.q, l));
        }),
        3 => out.par_chunks_mut(nc).enumerate().for_each(|(i, chunk)| {
            let ed = decompose_eigen3(get_symm3(hessians, i));
            let l = [
                metric_eigenvalue_from_hessian(3, ed.l[0], eps, hmin, hmax),
                metric_eigenvalue_from_hessian(3, ed.l[1], eps, hmin, hmax),
                metric_eigenvalue_from_hessian(3, ed.l[2], eps, hmin, hmax),
            ];
            set_symm3(chunk, 0, compose_ortho3(ed.q, l));
        }),
        _ => panic!("unsupported dimension {dim}"),
    }
    out
}

/// Outcome of the scalar fixed point in
/// [`metric_for_nelems_from_hessians`].
#[derive(Copy, Clone, Debug)]
pub struct MetricScalingStats {
    pub niters: usize,
    pub final_scalar: f64,
}

/// Iterate the error scalar until the metric's implied element count hits
/// `target_nelems` within `tolerance`.
pub fn metric_for_nelems_from_hessians(
    mesh: &Mesh,
    target_nelems: f64,
    tolerance: f64,
    hessians: &[f64],
    hmin: f64,
    hmax: f64,
) -> (Vec<f64>, MetricScalingStats) {
    assert!(tolerance > 0.0 && target_nelems > 0.0);
    let dim = mesh.dim();
    let mut eps = 1.0;
    let mut niters = 0;
    loop {
        let metric = metric_from_hessians(dim, hessians, eps, hmin, hmax);
        let scalar = size::metric_scalar_for_nelems(mesh, &metric, target_nelems);
        eps /= scalar;
        niters += 1;
        if (scalar - 1.0).abs() <= tolerance {
            return (
                metric,
                MetricScalingStats {
                    niters,
                    final_scalar: scalar,
                },
            );
        }
    }
}

// ---- gradation limiting ----

fn form_limiting_metric2(am: [[f64; 2]; 2], dist: f64, log_rate: f64) -> [[f64; 2]; 2] {
    let ed = decompose_eigen2(am);
    let l = std::array::from_fn(|i| {
        let li = ed.l[i];
        li / (1.0 + li * dist * log_rate).powi(2)
    });
    compose_ortho2(ed.q, l)
}

fn form_limiting_metric3(am: [[f64; 3]; 3], dist: f64, log_rate: f64) -> [[f64; 3]; 3] {
    let ed = decompose_eigen3(am);
    let l = std::array::from_fn(|i| {
        let li = ed.l[i];
        li / (1.0 + li * dist * log_rate).powi(2)
    });
    compose_ortho3(ed.q, l)
}

fn limit_metrics_once(mesh: &Mesh, metrics: &[f64], max_rate: f64) -> Vec<f64> {
    let dim = mesh.dim();
    let nc = symm_ncomps(dim);
    let star = mesh.ask_star(VERT);
    let coords = mesh.coords();
    let log_rate = max_rate.ln();
    let mut out = vec![0.0; metrics.len()];
    match dim {
        2 => out.par_chunks_mut(nc).enumerate().for_each(|(v, chunk)| {
            let mut m = get_symm2(metrics, v);
            let x = get_vector::<2>(coords, v);
            for &av in star.row(v as u32) {
                let am = get_symm2(metrics, av as usize);
                let ax = get_vector::<2>(coords, av as usize);
                let limiter = form_limiting_metric2(am, norm(sub(ax, x)), log_rate);
                m = intersect_metrics2(m, limiter);
            }
            set_symm2(chunk, 0, m);
        }),
        3 => out.par_chunks_mut(nc).enumerate().for_each(|(v, chunk)| {
            let mut m = get_symm3(metrics, v);
            let x = get_vector::<3>(coords, v);
            for &av in star.row(v as u32) {
                let am = get_symm3(metrics, av as usize);
                let ax = get_vector::<3>(coords, av as usize);
                let limiter = form_limiting_metric3(am, norm(sub(ax, x)), log_rate);
                m = intersect_metrics3(m, limiter);
            }
            set_symm3(chunk, 0, m);
        }),
        _ => unreachable!(),
    }
    mesh.sync_array(VERT, &out, nc)
}

/// Limit how fast desired edge length may vary between neighboring
/// vertices: each vertex's metric is intersected with its neighbors'
/// limited metrics until a fixed point. The termination tolerance is
/// explicit because componentwise closeness can be loose for strongly
/// anisotropic fields near the condition-number limit.
pub fn limit_metric_gradation(
    mesh: &Mesh,
    metrics: Vec<f64>,
    max_rate: f64,
    tol: f64,
) -> (Vec<f64>, usize) {
    assert!(max_rate >= 1.0);
    let comm = mesh.comm().clone();
    let mut current = metrics;
    let mut niters = 0;
    loop {
        let next = limit_metrics_once(mesh, &current, max_rate);
        niters += 1;
        let done = are_close_arrays(&current, &next, tol, tol);
        current = next;
        if comm.reduce_and(done) {
            return (current, niters);
        }
    }
}

/// Owner metrics broadcast over shared vertices.
pub fn sync_metrics(mesh: &Mesh, metrics: &[f64]) -> Vec<f64> {
    mesh.sync_array(VERT, metrics, symm_ncomps(mesh.dim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeat_symm2(n: usize, m: [[f64; 2]; 2]) -> Vec<f64> {
        let mut out = vec![0.0; n * 3];
        for i in 0..n {
            set_symm2(&mut out, i, m);
        }
        out
    }

    #[test]
    fn linearize_roundtrip() {
        let m = compose_metric2(rotate2(0.3), [0.1, 2.0]);
        let back = delinearize_metric2(linearize_metric2(m));
        for j in 0..2 {
            assert!(are_close_arrays(&back[j], &m[j], 1e-9, 1e-9));
        }
        let q = rotate3(0.7, normalize([1.0, 2.0, 0.5]));
        let m3 = compose_metric3(q, [0.1, 1.0, 10.0]);
        let back3 = delinearize_metric3(linearize_metric3(m3));
        for j in 0..3 {
            assert!(are_close_arrays(&back3[j], &m3[j], 1e-8, 1e-8));
        }
    }

    #[test]
    fn interpolation_endpoints() {
        let a = repeat_symm2(4, compose_metric2(identity_matrix(), [0.01, 1.0]));
        let b = repeat_symm2(4, compose_metric2(identity_matrix(), [1.0, 1.0]));
        let c = interpolate_between_metrics(2, &a, &b, 0.0);
        assert!(are_close_arrays(&a, &c, 1e-9, 1e-9));
        let c = interpolate_between_metrics(2, &a, &b, 1.0);
        assert!(are_close_arrays(&b, &c, 1e-9, 1e-9));
    }

    fn check_ortho_intersection(h1: [f64; 3], h2: [f64; 3], hi_expect: [f64; 3]) {
        let q = mat_mul(
            rotate3(std::f64::consts::PI / 4.0, [0.0, 0.0, 1.0]),
            rotate3(std::f64::consts::PI / 4.0, [0.0, 1.0, 0.0]),
        );
        let m1 = compose_metric3(q, h1);
        let m2 = compose_metric3(q, h2);
        let mi = intersect_metrics3(m1, m2);
        let mi_rev = intersect_metrics3(m2, m1);
        for i in 0..3 {
            assert!(
                are_close_tol(metric_desired_length3(mi, q[i]), hi_expect[i], 1e-3, 1e-6),
                "axis {i}"
            );
            assert!(
                are_close_tol(metric_desired_length3(mi_rev, q[i]), hi_expect[i], 1e-3, 1e-6),
                "axis {i} (commuted)"
            );
        }
    }

    #[test]
    fn intersection_takes_the_tighter_length_per_axis() {
        check_ortho_intersection([0.5, 1.0, 1.0], [1.0, 0.5, 1.0], [0.5, 0.5, 1.0]);
        check_ortho_intersection([1e-3, 1.0, 1.0], [1.0, 1.0, 1e-3], [1e-3, 1.0, 1e-3]);
        check_ortho_intersection([1e-3, 1e-3, 1.0], [1.0, 1.0, 1e-3], [1e-3, 1e-3, 1e-3]);
    }

    #[test]
    fn intersection_with_a_subset_returns_the_subset() {
        let m1 = compose_metric2(identity_matrix(), [1.0, 2.0]);
        let m2 = compose_metric2(rotate2(std::f64::consts::PI / 4.0), [2.0, 3.0]);
        let i12 = intersect_metrics2(m1, m2);
        let i21 = intersect_metrics2(m2, m1);
        for j in 0..2 {
            assert!(are_close_arrays(&i12[j], &m1[j], 1e-8, 1e-8));
            assert!(are_close_arrays(&i21[j], &m1[j], 1e-8, 1e-8));
        }
    }

    #[test]
    fn hessian_metric_clamps_into_band() {
        let mut hess = vec![0.0; 3];
        set_symm2(&mut hess, 0, diagonal([8.0, 1e-12]));
        let m = metric_from_hessians(2, &hess, 1e-2, 1e-3, 10.0);
        let got = get_symm2(&m, 0);
        // 4|h| / (18 eps) for the large eigenvalue
        assert!(are_close(got[0][0], 4.0 * 8.0 / (18.0 * 1e-2)));
        // the tiny eigenvalue clamps to 1/hmax^2
        assert!(are_close(got[1][1], 1.0 / 100.0));
    }
}
