//! Per-edge collapse codes and candidate filtering.

use rayon::prelude::*;

use crate::mesh::{Mesh, CLASS_DIM, EDGE, METRIC, VERT};
use crate::metric::{average_metric2, average_metric3};
use crate::numerics::{get_symm2, get_symm3, get_vector, identity_matrix};
use crate::quality::{metric_tet_quality, metric_triangle_quality};
use crate::topology::code_which_down;
use crate::topology::simplex::ndown_of;

/// Collapse-direction codes: bit 0 collapses the edge's first vertex onto
/// the second, bit 1 the reverse.
pub const DONT_COLLAPSE: u8 = 0b00;
pub const COLLAPSE_V0: u8 = 0b01;
pub const COLLAPSE_V1: u8 = 0b10;
pub const COLLAPSE_BOTH: u8 = 0b11;

#[inline]
pub fn do_collapse(code: u8, eev: usize) -> u8 {
    code | (1 << eev)
}

#[inline]
pub fn collapses(code: u8, eev: usize) -> bool {
    code & (1 << eev) != 0
}

#[inline]
pub fn dont_collapse(code: u8, eev: usize) -> u8 {
    code & !(1 << eev)
}

/// Classification check: a vertex may only slide along the model entity
/// its edge is classified on, so a direction survives only when the
/// collapsing vertex's model dimension equals the edge's.
pub fn check_collapse_class(mesh: &Mesh, cands2edges: &[u32], cand_codes: &[u8]) -> Vec<u8> {
    let (vert_class, edge_class) = match (
        mesh.get_array_u8(VERT, CLASS_DIM),
        mesh.get_array_u8(EDGE, CLASS_DIM),
    ) {
        (Ok(v), Ok(e)) => (v, e),
        // unclassified meshes have nothing to protect
        _ => return cand_codes.to_vec(),
    };
    let ev2v = mesh.ask_verts_of(EDGE);
    cands2edges
        .par_iter()
        .zip(cand_codes.par_iter())
        .map(|(&e, &code)| {
            let mut code = code;
            for eev in 0..2 {
                if !collapses(code, eev) {
                    continue;
                }
                let v_col = ev2v[e as usize * 2 + eev] as usize;
                if vert_class[v_col] != edge_class[e as usize] {
                    code = dont_collapse(code, eev);
                }
            }
            code
        })
        .collect()
}

/// Overshoot check: a direction is dropped when any edge around the
/// collapsing vertex would become longer than desired after the collapse.
pub fn prevent_overshoot(
    mesh: &Mesh,
    max_length: f64,
    cands2edges: &[u32],
    cand_codes: &[u8],
) -> Vec<u8> {
    let ev2v = mesh.ask_verts_of(EDGE);
    let v2e = mesh.ask_up(VERT, EDGE);
    let out: Vec<u8> = cands2edges
        .iter()
        .zip(cand_codes.iter())
        .map(|(&e, &code)| {
            let mut code = code;
            for eev_col in 0..2 {
                if !collapses(code, eev_col) {
                    continue;
                }
                let v_col = ev2v[e as usize * 2 + eev_col];
                let v_onto = ev2v[e as usize * 2 + (1 - eev_col)];
                let lo = v2e.a2ab[v_col as usize] as usize;
                let hi = v2e.a2ab[v_col as usize + 1] as usize;
                for ve in lo..hi {
                    let e2 = v2e.ab2b[ve];
                    if e2 == e {
                        continue;
                    }
                    let eev_in = code_which_down(v2e.codes[ve]) as usize;
                    let v_out = ev2v[e2 as usize * 2 + (1 - eev_in)];
                    let length = predicted_length(mesh, v_onto, v_out);
                    if length >= max_length {
                        code = dont_collapse(code, eev_col);
                        break;
                    }
                }
            }
            code
        })
        .collect();
    // agree across ranks through the full edge array, then return to the
    // candidate subset
    let full = mesh.sync_subset_u8_array(EDGE, &out, cands2edges, DONT_COLLAPSE);
    cands2edges.iter().map(|&e| full[e as usize]).collect()
}

/// Metric length of the would-be edge between two existing vertices.
fn predicted_length(mesh: &Mesh, a: u32, b: u32) -> f64 {
    // measure as if (a, b) were an edge, reusing the metric edge measure
    let coords = mesh.coords();
    let dim = mesh.dim();
    let v2m = mesh.get_array_f64(VERT, METRIC).ok();
    let v2h = mesh.get_array_f64(VERT, crate::mesh::SIZE).ok();
    let (la, lb) = match dim {
        2 => {
            let d = crate::numerics::sub(
                get_vector::<2>(coords, b as usize),
                get_vector::<2>(coords, a as usize),
            );
            match (v2m, v2h) {
                (Some(m), _) => (
                    crate::numerics::dot(d, crate::numerics::mat_vec(get_symm2(m, a as usize), d))
                        .sqrt(),
                    crate::numerics::dot(d, crate::numerics::mat_vec(get_symm2(m, b as usize), d))
                        .sqrt(),
                ),
                (None, Some(h)) => {
                    let len = crate::numerics::norm(d);
                    (len / h[a as usize], len / h[b as usize])
                }
                (None, None) => {
                    let len = crate::numerics::norm(d);
                    (len, len)
                }
            }
        }
        _ => {
            let d = crate::numerics::sub(
                get_vector::<3>(coords, b as usize),
                get_vector::<3>(coords, a as usize),
            );
            match (v2m, v2h) {
                (Some(m), _) => (
                    crate::numerics::dot(d, crate::numerics::mat_vec(get_symm3(m, a as usize), d))
                        .sqrt(),
                    crate::numerics::dot(d, crate::numerics::mat_vec(get_symm3(m, b as usize), d))
                        .sqrt(),
                ),
                (None, Some(h)) => {
                    let len = crate::numerics::norm(d);
                    (len / h[a as usize], len / h[b as usize])
                }
                (None, None) => {
                    let len = crate::numerics::norm(d);
                    (len, len)
                }
            }
        }
    };
    crate::size::edge_length(la, lb)
}

/// Quality of the element that `elem` becomes when `v_col` is replaced by
/// `v_onto`.
pub(super) fn substituted_quality(mesh: &Mesh, elem: usize, v_col: u32, v_onto: u32) -> f64 {
    let dim = mesh.dim();
    let deg = ndown_of(dim);
    let coords = mesh.coords();
    let verts = &mesh.ask_verts_of(dim)[elem * deg..(elem + 1) * deg];
    let v2m = mesh.get_array_f64(VERT, METRIC).ok();
    if dim == 2 {
        let mut p = [[0.0; 2]; 3];
        let mut ms = Vec::with_capacity(3);
        for (i, &v) in verts.iter().enumerate() {
            let v = if v == v_col { v_onto } else { v };
            p[i] = get_vector::<2>(coords, v as usize);
            if let Some(m) = v2m {
                ms.push(get_symm2(m, v as usize));
            }
        }
        let metric = if ms.is_empty() {
            identity_matrix()
        } else {
            average_metric2(&ms)
        };
        metric_triangle_quality(p, metric)
    } else {
        let mut p = [[0.0; 3]; 4];
        let mut ms = Vec::with_capacity(4);
        for (i, &v) in verts.iter().enumerate() {
            let v = if v == v_col { v_onto } else { v };
            p[i] = get_vector::<3>(coords, v as usize);
            if let Some(m) = v2m {
                ms.push(get_symm3(m, v as usize));
            }
        }
        let metric = if ms.is_empty() {
            identity_matrix()
        } else {
            average_metric3(&ms)
        };
        metric_tet_quality(p, metric)
    }
}

/// Minimum cavity quality for each candidate direction; `-1` where a
/// direction is off. Two entries per candidate.
pub fn coarsen_qualities(mesh: &Mesh, cands2edges: &[u32], cand_codes: &[u8]) -> Vec<f64> {
    let dim = mesh.dim();
    let ev2v = mesh.ask_verts_of(EDGE);
    let v2elem = mesh.ask_up(VERT, dim);
    let elemv2v = mesh.ask_verts_of(dim);
    let deg = ndown_of(dim);
    let mut out = vec![-1.0; cands2edges.len() * 2];
    for (cand, (&e, &code)) in cands2edges.iter().zip(cand_codes.iter()).enumerate() {
        for eev_col in 0..2 {
            if !collapses(code, eev_col) {
                continue;
            }
            let v_col = ev2v[e as usize * 2 + eev_col];
            let v_onto = ev2v[e as usize * 2 + (1 - eev_col)];
            let lo = v2elem.a2ab[v_col as usize] as usize;
            let hi = v2elem.a2ab[v_col as usize + 1] as usize;
            let mut min_qual = f64::INFINITY;
            for ve in lo..hi {
                let elem = v2elem.ab2b[ve] as usize;
                let verts = &elemv2v[elem * deg..(elem + 1) * deg];
                if verts.contains(&v_onto) {
                    // this element collapses away entirely
                    continue;
                }
                min_qual = min_qual.min(substituted_quality(mesh, elem, v_col, v_onto));
            }
            out[cand * 2 + eev_col] = min_qual;
        }
    }
    out
}

/// Strip directions whose cavity quality falls below the floor.
pub fn filter_coarsen_min_qual(cand_codes: &[u8], cand_quals: &[f64], min_qual: f64) -> Vec<u8> {
    cand_codes
        .iter()
        .enumerate()
        .map(|(cand, &code)| {
            let mut code = code;
            for eev in 0..2 {
                if collapses(code, eev) && cand_quals[cand * 2 + eev] < min_qual {
                    code = dont_collapse(code, eev);
                }
            }
            code
        })
        .collect()
}

/// Strip directions that do not strictly improve the cavity's current
/// minimum quality.
pub fn filter_coarsen_improve(
    mesh: &Mesh,
    cands2edges: &[u32],
    cand_codes: &[u8],
    cand_quals: &[f64],
) -> Vec<u8> {
    let dim = mesh.dim();
    let ev2v = mesh.ask_verts_of(EDGE);
    let v2elem = mesh.ask_up(VERT, dim);
    let quals = crate::quality::measure_qualities(mesh);
    cands2edges
        .iter()
        .zip(cand_codes.iter())
        .enumerate()
        .map(|(cand, (&e, &code))| {
            let mut code = code;
            for eev in 0..2 {
                if !collapses(code, eev) {
                    continue;
                }
                let v_col = ev2v[e as usize * 2 + eev] as usize;
                let lo = v2elem.a2ab[v_col] as usize;
                let hi = v2elem.a2ab[v_col + 1] as usize;
                let old_min = v2elem.ab2b[lo..hi]
                    .iter()
                    .fold(f64::INFINITY, |m, &el| m.min(quals[el as usize]));
                if cand_quals[cand * 2 + eev] <= old_min {
                    code = dont_collapse(code, eev);
                }
            }
            code
        })
        .collect()
}

/// Per vertex, the best (edge, direction) pair offering to collapse it:
/// returns candidate marks, the winning quality, and the winning rail
/// edge's global ID.
pub fn choose_rails(
    mesh: &Mesh,
    cands2edges: &[u32],
    cand_codes: &[u8],
    cand_quals: &[f64],
) -> (Vec<u8>, Vec<f64>, Vec<u64>) {
    let n = mesh.nverts();
    let ev2v = mesh.ask_verts_of(EDGE);
    let edge_globals = mesh.globals(EDGE);
    let mut cands = vec![0u8; n];
    let mut quals = vec![-1.0; n];
    let mut rails = vec![u64::MAX; n];
    for (cand, (&e, &code)) in cands2edges.iter().zip(cand_codes.iter()).enumerate() {
        for eev in 0..2 {
            if !collapses(code, eev) {
                continue;
            }
            let v = ev2v[e as usize * 2 + eev] as usize;
            let q = cand_quals[cand * 2 + eev];
            let g = edge_globals[e as usize];
            let better = q > quals[v] || (q == quals[v] && g < rails[v]);
            if better {
                cands[v] = 1;
                quals[v] = q;
                rails[v] = g;
            }
        }
    }
    (cands, quals, rails)
}

/// Resolve rail globals back to local edges and directions.
pub fn find_rails(
    mesh: &Mesh,
    keys2verts: &[u32],
    vert_rails: &[u64],
) -> (Vec<u32>, Vec<u8>) {
    let ev2v = mesh.ask_verts_of(EDGE);
    let edge_globals = mesh.globals(EDGE);
    let by_global: std::collections::HashMap<u64, u32> = edge_globals
        .iter()
        .enumerate()
        .map(|(e, &g)| (g, e as u32))
        .collect();
    let mut rails2edges = Vec::with_capacity(keys2verts.len());
    let mut rail_col_dirs = Vec::with_capacity(keys2verts.len());
    for &v in keys2verts {
        let e = *by_global
            .get(&vert_rails[v as usize])
            .expect("rail edge must be present wherever its vertex is");
        rails2edges.push(e);
        let dir = if ev2v[e as usize * 2] == v { 0u8 } else { 1u8 };
        debug_assert_eq!(ev2v[e as usize * 2 + dir as usize], v);
        rail_col_dirs.push(dir);
    }
    (rails2edges, rail_col_dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_algebra() {
        assert_eq!(do_collapse(DONT_COLLAPSE, 0), COLLAPSE_V0);
        assert_eq!(do_collapse(COLLAPSE_V0, 1), COLLAPSE_BOTH);
        assert!(collapses(COLLAPSE_BOTH, 0));
        assert!(collapses(COLLAPSE_BOTH, 1));
        assert!(!collapses(COLLAPSE_V1, 0));
        assert_eq!(dont_collapse(COLLAPSE_BOTH, 0), COLLAPSE_V1);
        assert_eq!(dont_collapse(COLLAPSE_V1, 1), DONT_COLLAPSE);
    }
}
