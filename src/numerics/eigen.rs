//! Cubic solve and symmetric eigendecomposition for 2x2 and 3x3 matrices.
//!
//! The 3x3 path goes through the trigonometric form of the cubic, which is
//! robust for the symmetric matrices the metric layer produces. Repeated
//! roots are reported last so eigenvector recovery can treat the simple
//! eigenvalue first and complete the basis for the repeated one.

use super::algebra::*;

/// Real roots of `x^3 + a x^2 + b x + c = 0` with multiplicities.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CubicRoots {
    pub count: usize,
    pub roots: [f64; 3],
    pub mults: [u8; 3],
}

/// Solve `x^3 + a x^2 + b x + c = 0` over the reals.
///
/// Distinct roots come first in descending order; repeated roots last.
pub fn solve_cubic(a: f64, b: f64, c: f64) -> CubicRoots {
    // depressed form t^3 + p t + q, x = t - a/3
    let shift = a / 3.0;
    let p = b - a * a / 3.0;
    let q = 2.0 * a * a * a / 27.0 - a * b / 3.0 + c;
    let disc = (q / 2.0) * (q / 2.0) + (p / 3.0) * (p / 3.0) * (p / 3.0);
    let mag = p.abs().sqrt().max(q.abs().cbrt()).max(1e-30);
    if disc > 1e-12 * mag.powi(6) {
        // one real root (Cardano)
        let sd = disc.sqrt();
        let t = (-q / 2.0 + sd).cbrt() + (-q / 2.0 - sd).cbrt();
        return CubicRoots {
            count: 1,
            roots: [t - shift, 0.0, 0.0],
            mults: [1, 0, 0],
        };
    }
    let raw = if p >= -(1e-12 * mag * mag) {
        // disc <= 0 with p ~ 0 forces q ~ 0: triple root at t = 0
        [0.0; 3]
    } else {
        let m = 2.0 * (-p / 3.0).sqrt();
        let cos3phi = (3.0 * q / (p * m)).clamp(-1.0, 1.0);
        let phi = cos3phi.acos() / 3.0;
        std::array::from_fn(|k| {
            m * (phi - 2.0 * std::f64::consts::PI * k as f64 / 3.0).cos()
        })
    };
    let mut roots: Vec<f64> = raw.iter().map(|t| t - shift).collect();
    roots.sort_by(|x, y| y.partial_cmp(x).unwrap());
    // merge roots that coincide to tolerance
    let scale = roots.iter().fold(0.0f64, |m, r| m.max(r.abs()));
    let mut groups: Vec<(f64, u8)> = Vec::new();
    for &r in &roots {
        match groups.last_mut() {
            Some((val, mult)) if (*val - r).abs() <= 1e-5 * scale + 1e-10 => {
                *val = (*val * f64::from(*mult) + r) / f64::from(*mult + 1);
                *mult += 1;
            }
            _ => groups.push((r, 1)),
        }
    }
    groups.sort_by(|x, y| x.1.cmp(&y.1).then(y.0.partial_cmp(&x.0).unwrap()));
    let mut out = CubicRoots {
        count: groups.len(),
        roots: [0.0; 3],
        mults: [0; 3],
    };
    for (i, (r, m)) in groups.into_iter().enumerate() {
        out.roots[i] = r;
        out.mults[i] = m;
    }
    out
}

/// Eigendecomposition of a symmetric 3x3 matrix: `a = q * diag(l) * q^T`.
#[derive(Copy, Clone, Debug)]
pub struct Eigen3 {
    /// Orthonormal eigenvector columns.
    pub q: [[f64; 3]; 3],
    pub l: [f64; 3],
}

/// Eigendecomposition of a symmetric 2x2 matrix.
#[derive(Copy, Clone, Debug)]
pub struct Eigen2 {
    pub q: [[f64; 2]; 2],
    pub l: [f64; 2],
}

fn max_abs_entry3(m: [[f64; 3]; 3]) -> f64 {
    m.iter()
        .flat_map(|col| col.iter())
        .fold(0.0f64, |acc, &x| acc.max(x.abs()))
}

/// Unit null-space vector of a (near-singular) symmetric matrix, taken from
/// the largest cross product of row pairs.
fn null_vector(b: [[f64; 3]; 3]) -> [f64; 3] {
    let rows = transpose(b);
    let candidates = [
        cross(rows[0], rows[1]),
        cross(rows[1], rows[2]),
        cross(rows[2], rows[0]),
    ];
    let mut best = candidates[0];
    for c in &candidates[1..] {
        if norm_squared(*c) > norm_squared(best) {
            best = *c;
        }
    }
    normalize(best)
}

fn shifted(m: [[f64; 3]; 3], lambda: f64) -> [[f64; 3]; 3] {
    let mut out = m;
    for j in 0..3 {
        out[j][j] -= lambda;
    }
    out
}

/// Symmetric 3x3 eigendecomposition via the trigonometric cubic.
pub fn decompose_eigen3(m: [[f64; 3]; 3]) -> Eigen3 {
    let scale = max_abs_entry3(m);
    if scale == 0.0 {
        return Eigen3 {
            q: identity_matrix(),
            l: [0.0; 3],
        };
    }
    let s: [[f64; 3]; 3] = std::array::from_fn(|j| std::array::from_fn(|i| m[j][i] / scale));
    let tr = s[0][0] + s[1][1] + s[2][2];
    let minors = s[0][0] * s[1][1] - s[1][0] * s[0][1]
        + s[1][1] * s[2][2] - s[2][1] * s[1][2]
        + s[0][0] * s[2][2] - s[2][0] * s[0][2];
    let cubic = solve_cubic(-tr, minors, -det3(s));
    match cubic.count {
        3 => {
            let v0 = null_vector(shifted(s, cubic.roots[0]));
            let v1 = null_vector(shifted(s, cubic.roots[1]));
            let v2 = cross(v0, v1);
            Eigen3 {
                q: [v0, v1, v2],
                l: [
                    cubic.roots[0] * scale,
                    cubic.roots[1] * scale,
                    cubic.roots[2] * scale,
                ],
            }
        }
        2 => {
            // simple root first by construction; its eigenvector seeds the basis
            let v0 = null_vector(shifted(s, cubic.roots[0]));
            let q = form_ortho_basis(v0);
            Eigen3 {
                q,
                l: [
                    cubic.roots[0] * scale,
                    cubic.roots[1] * scale,
                    cubic.roots[1] * scale,
                ],
            }
        }
        _ => Eigen3 {
            q: identity_matrix(),
            l: [cubic.roots[0] * scale; 3],
        },
    }
}

/// Symmetric 2x2 eigendecomposition in closed form.
pub fn decompose_eigen2(m: [[f64; 2]; 2]) -> Eigen2 {
    let off = m[1][0];
    if off.abs() <= 1e-12 * (m[0][0].abs().max(m[1][1].abs()) + 1e-30) {
        return Eigen2 {
            q: identity_matrix(),
            l: [m[0][0], m[1][1]],
        };
    }
    let theta = 0.5 * (2.0 * off).atan2(m[0][0] - m[1][1]);
    let q = rotate2(theta);
    let l = [dot(q[0], mat_vec(m, q[0])), dot(q[1], mat_vec(m, q[1]))];
    Eigen2 { q, l }
}

/// `q * diag(l) * q^T` for orthonormal `q`.
pub fn compose_ortho3(q: [[f64; 3]; 3], l: [f64; 3]) -> [[f64; 3]; 3] {
    mat_mul(q, mat_mul(diagonal(l), transpose(q)))
}

/// `q * diag(l) * q^T` for orthonormal `q` (2D).
pub fn compose_ortho2(q: [[f64; 2]; 2], l: [f64; 2]) -> [[f64; 2]; 2] {
    mat_mul(q, mat_mul(diagonal(l), transpose(q)))
}

/// `q * diag(l) * q^-1` for a general invertible eigenvector basis.
pub fn compose_eigen3(q: [[f64; 3]; 3], l: [f64; 3]) -> [[f64; 3]; 3] {
    mat_mul(q, mat_mul(diagonal(l), invert3(q)))
}

/// `q * diag(l) * q^-1` (2D).
pub fn compose_eigen2(q: [[f64; 2]; 2], l: [f64; 2]) -> [[f64; 2]; 2] {
    mat_mul(q, mat_mul(diagonal(l), invert2(q)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_cubic(a: f64, b: f64, c: f64, roots: &[f64], mults: &[u8]) {
        let sol = solve_cubic(a, b, c);
        assert_eq!(sol.count, roots.len());
        for i in 0..sol.count {
            assert!(
                are_close_tol(sol.roots[i], roots[i], 1e-8, 1e-8),
                "root {i}: got {}, want {}",
                sol.roots[i],
                roots[i]
            );
            assert_eq!(sol.mults[i], mults[i]);
        }
    }

    #[test]
    fn cubic_roots() {
        check_cubic(0.0, 0.0, 0.0, &[0.0], &[3]);
        // (x - 2)(x + 1)(x - 1/2), distinct roots descending
        check_cubic(-1.5, -1.5, 1.0, &[2.0, 0.5, -1.0], &[1, 1, 1]);
        // (x - 1)^2 (x + 2), simple root first
        check_cubic(0.0, -3.0, 2.0, &[-2.0, 1.0], &[1, 2]);
        // (x - 2)(x + 1)(x + 4)
        check_cubic(3.0, -6.0, -8.0, &[2.0, -1.0, -4.0], &[1, 1, 1]);
    }

    fn check_roundtrip(m: [[f64; 3]; 3], l_expect: [f64; 3]) {
        let ed = decompose_eigen3(m);
        let qtq = mat_mul(transpose(ed.q), ed.q);
        let id = identity_matrix::<3>();
        for j in 0..3 {
            assert!(are_close_arrays(&qtq[j], &id[j], 1e-8, 1e-8));
        }
        let mut got = ed.l;
        let mut want = l_expect;
        got.sort_by(|a, b| a.partial_cmp(b).unwrap());
        want.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(are_close_arrays(&got, &want, 1e-7, 1e-8));
        let back = compose_ortho3(ed.q, ed.l);
        for j in 0..3 {
            assert!(are_close_arrays(&back[j], &m[j], 1e-8, 1e-8));
        }
    }

    #[test]
    fn eigen_simple_cases() {
        check_roundtrip(identity_matrix(), [1.0, 1.0, 1.0]);
        check_roundtrip([[0.0; 3]; 3], [0.0, 0.0, 0.0]);
        check_roundtrip(diagonal([3.0, 2.0, 1.0]), [1.0, 2.0, 3.0]);
    }

    fn check_rotated(l: [f64; 3]) {
        let q = mat_mul(
            rotate3(std::f64::consts::PI / 4.0, [0.0, 0.0, 1.0]),
            rotate3(std::f64::consts::PI / 4.0, [0.0, 1.0, 0.0]),
        );
        let m = compose_ortho3(q, l);
        check_roundtrip(m, l);
    }

    #[test]
    fn eigen_anisotropic_rotated() {
        // repeated eigenvalues must come out of the repeated-root path
        check_rotated([1e3, 1.0, 1.0]);
        check_rotated([1.0, 1e3, 1e3]);
        check_rotated([1e-3, 1.0, 1.0]);
        check_rotated([1.0, 1e-3, 1e-3]);
        check_rotated([1e-6, 1e-3, 1e-3]);
    }

    #[test]
    fn eigen_2x2() {
        let q = rotate2(std::f64::consts::PI / 6.0);
        let m = compose_ortho2(q, [4.0, 1.0]);
        let ed = decompose_eigen2(m);
        let back = compose_ortho2(ed.q, ed.l);
        for j in 0..2 {
            assert!(are_close_arrays(&back[j], &m[j], 1e-10, 1e-10));
        }
        let mut l = ed.l;
        l.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(are_close_arrays(&l, &[1.0, 4.0], 1e-10, 1e-10));
    }
}
