//! 2D edge flipping.

use crate::arrays::{collect_marked, ReduceOp};
use crate::error::MeshAdaptError;
use crate::mesh::{Mesh, CLASS_DIM, EDGE, TRI, VERT};
use crate::metric::average_metric2;
use crate::numerics::{get_symm2, get_vector, identity_matrix};
use crate::quality::{measure_qualities, metric_triangle_quality};
use crate::topology::{code_rotation, code_which_down};

use super::indset::find_indset;
use super::modify::modify_ents;
use super::refine::finish_rewrite;
use super::transfer::Donors;
use super::AdaptOpts;

/// The two triangles and opposite vertices around an interior edge,
/// oriented so `ovr` comes from the triangle traversing the edge backwards
/// (the flip `(ev1, ovf, ovr)`, `(ev0, ovr, ovf)` then stays
/// counterclockwise).
fn flip_configuration(mesh: &Mesh, e: usize) -> Option<(u32, u32, u32, u32)> {
    let e2t = mesh.ask_up(EDGE, TRI);
    let lo = e2t.a2ab[e] as usize;
    let hi = e2t.a2ab[e + 1] as usize;
    if hi - lo != 2 {
        return None;
    }
    let tv2v = mesh.ask_verts_of(TRI);
    let mut opposite = [0u32; 2];
    let mut reversed0 = false;
    for (i, ab) in (lo..hi).enumerate() {
        let t = e2t.ab2b[ab] as usize;
        let code = e2t.codes[ab];
        let slot = code_which_down(code) as usize;
        opposite[i] = tv2v[t * 3 + (slot + 2) % 3];
        if i == 0 {
            reversed0 = code_rotation(code) == 1;
        }
    }
    let (ovr, ovf) = if reversed0 {
        (opposite[0], opposite[1])
    } else {
        (opposite[1], opposite[0])
    };
    let ev2v = mesh.ask_verts_of(EDGE);
    Some((ev2v[e * 2], ev2v[e * 2 + 1], ovr, ovf))
}

/// Vertex tuples produced by flipping each key edge: one edge and two
/// triangles per key.
pub fn swap2d_topology(mesh: &Mesh, keys2edges: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let mut prod_edges = Vec::with_capacity(keys2edges.len() * 2);
    let mut prod_tris = Vec::with_capacity(keys2edges.len() * 6);
    for &e in keys2edges {
        let (ev0, ev1, ovr, ovf) =
            flip_configuration(mesh, e as usize).expect("swap keys are interior edges");
        prod_edges.extend_from_slice(&[ovf, ovr]);
        prod_tris.extend_from_slice(&[ev1, ovf, ovr]);
        prod_tris.extend_from_slice(&[ev0, ovr, ovf]);
    }
    (prod_edges, prod_tris)
}

/// Minimum quality of the two triangles the flip would create; `-1` for
/// edges that cannot flip (boundary, or the other diagonal already
/// exists).
pub fn swap2d_qualities(mesh: &Mesh, cands2edges: &[u32]) -> Vec<f64> {
    let coords = mesh.coords();
    let v2m = mesh.get_array_f64(VERT, crate::mesh::METRIC).ok();
    let ev2v = mesh.ask_verts_of(EDGE);
    let existing: std::collections::HashSet<[u32; 2]> = (0..mesh.nedges())
        .map(|e| {
            let mut pair = [ev2v[e * 2], ev2v[e * 2 + 1]];
            pair.sort_unstable();
            pair
        })
        .collect();
    cands2edges
        .iter()
        .map(|&e| {
            let Some((ev0, ev1, ovr, ovf)) = flip_configuration(mesh, e as usize) else {
                return -1.0;
            };
            let mut diag = [ovf, ovr];
            diag.sort_unstable();
            if existing.contains(&diag) {
                return -1.0;
            }
            let mut min_qual = f64::INFINITY;
            for tri in [[ev1, ovf, ovr], [ev0, ovr, ovf]] {
                let p = std::array::from_fn(|i| get_vector::<2>(coords, tri[i] as usize));
                let metric = match v2m {
                    Some(m) => average_metric2(&[
                        get_symm2(m, tri[0] as usize),
                        get_symm2(m, tri[1] as usize),
                        get_symm2(m, tri[2] as usize),
                    ]),
                    None => identity_matrix(),
                };
                min_qual = min_qual.min(metric_triangle_quality(p, metric));
            }
            min_qual
        })
        .collect()
}

fn swap2d_keys(mesh: &mut Mesh, keys2edges: &[u32]) -> Result<(), MeshAdaptError> {
    let nkeys = keys2edges.len();
    let (prod_edges, prod_tris) = swap2d_topology(mesh, keys2edges);
    let e2t = mesh.ask_up(EDGE, TRI).clone();
    // nothing happens to vertices
    let vert_mods = modify_ents(mesh, VERT, &vec![0u8; mesh.nverts()], 0, &[], &[]);
    let old2new_verts = vert_mods.old_ents2new_ents.clone();
    let remap = |tuples: &[u32]| -> Vec<u32> {
        tuples.iter().map(|&v| old2new_verts[v as usize]).collect()
    };
    let mut dead_edges = vec![0u8; mesh.nedges()];
    let mut dead_tris = vec![0u8; mesh.nents(TRI)];
    let mut edge_donors = Donors {
        dims: Vec::new(),
        idxs: Vec::new(),
    };
    let mut tri_donors = Donors {
        dims: Vec::new(),
        idxs: Vec::new(),
    };
    for &e in keys2edges {
        dead_edges[e as usize] = 1;
        let lo = e2t.a2ab[e as usize] as usize;
        let hi = e2t.a2ab[e as usize + 1] as usize;
        for ab in lo..hi {
            dead_tris[e2t.ab2b[ab] as usize] = 1;
        }
        edge_donors.dims.push(EDGE as u8);
        edge_donors.idxs.push(e);
        for i in 0..2 {
            tri_donors.dims.push(TRI as u8);
            tri_donors.idxs.push(e2t.ab2b[lo + i]);
        }
    }
    let edge_mods = modify_ents(
        mesh,
        EDGE,
        &dead_edges,
        nkeys,
        &remap(&prod_edges),
        &old2new_verts,
    );
    let tri_mods = modify_ents(
        mesh,
        TRI,
        &dead_tris,
        nkeys * 2,
        &remap(&prod_tris),
        &old2new_verts,
    );
    let conserve = super::transfer::Conserve {
        keys2prods: (0..=nkeys as u32).map(|k| k * 2).collect(),
        keys2old_elems: crate::arrays::Graph::new(
            (0..=nkeys as u32).map(|k| k * 2).collect(),
            keys2edges
                .iter()
                .flat_map(|&e| {
                    let lo = e2t.a2ab[e as usize] as usize;
                    [e2t.ab2b[lo], e2t.ab2b[lo + 1]]
                })
                .collect(),
        ),
    };
    finish_rewrite(
        mesh,
        vec![vert_mods, edge_mods, tri_mods],
        vec![
            Donors {
                dims: Vec::new(),
                idxs: Vec::new(),
            },
            edge_donors,
            tri_donors,
        ],
        None,
        Some(conserve),
    )
}

/// Flip interior edges whose alternative diagonal strictly improves the
/// local minimum quality. Returns false when nothing qualifies.
pub fn swap_edges_2d(mesh: &mut Mesh, opts: &AdaptOpts) -> Result<bool, MeshAdaptError> {
    let comm = mesh.comm().clone();
    let mut did = false;
    loop {
        let quals = measure_qualities(mesh);
        let e2t = mesh.ask_up(EDGE, TRI);
        let edge_class = mesh.get_array_u8(EDGE, CLASS_DIM).ok();
        let mut cand_marks = vec![0u8; mesh.nedges()];
        let mut old_quals = vec![0.0; mesh.nedges()];
        for e in 0..mesh.nedges() {
            let lo = e2t.a2ab[e] as usize;
            let hi = e2t.a2ab[e + 1] as usize;
            if hi - lo != 2 {
                continue;
            }
            if let Some(class) = edge_class {
                if class[e] != mesh.dim() as u8 {
                    continue;
                }
            }
            let old = quals[e2t.ab2b[lo] as usize].min(quals[e2t.ab2b[lo + 1] as usize]);
            if old >= opts.min_quality_desired {
                continue;
            }
            cand_marks[e] = 1;
            old_quals[e] = old;
        }
        let cands2edges = collect_marked(&cand_marks);
        if comm.allreduce_i64(cands2edges.len() as i64, ReduceOp::Sum) == 0 {
            return Ok(did);
        }
        let cand_quals = swap2d_qualities(mesh, &cands2edges);
        let mut edge_quals = vec![-1.0; mesh.nedges()];
        let mut keys_cands = vec![0u8; mesh.nedges()];
        for (i, &e) in cands2edges.iter().enumerate() {
            if cand_quals[i] > old_quals[e as usize] {
                keys_cands[e as usize] = 1;
                edge_quals[e as usize] = cand_quals[i];
            }
        }
        if comm.allreduce_i64(
            keys_cands.iter().filter(|&&m| m != 0).count() as i64,
            ReduceOp::Sum,
        ) == 0
        {
            return Ok(did);
        }
        let keys = find_indset(mesh, EDGE, &edge_quals, &keys_cands);
        let keys2edges = collect_marked(&keys);
        if comm.allreduce_i64(keys2edges.len() as i64, ReduceOp::Sum) == 0 {
            return Ok(did);
        }
        swap2d_keys(mesh, &keys2edges)?;
        did = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::build::build_box;
    use std::sync::Arc;

    #[test]
    fn flipping_the_unit_box_diagonal() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        let (prod_edges, prod_tris) = swap2d_topology(&mesh, &[2]);
        assert_eq!(prod_edges, vec![2, 1]);
        assert_eq!(prod_tris, vec![3, 2, 1, 0, 1, 2]);
    }

    #[test]
    fn flip_rewrite_preserves_counts_and_orientation() {
        let mut mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        swap2d_keys(&mut mesh, &[2]).unwrap();
        assert_eq!(mesh.nverts(), 4);
        assert_eq!(mesh.nedges(), 5);
        assert_eq!(mesh.nelems(), 2);
        // the new diagonal connects vertices 1 and 2
        let ev2v = mesh.ask_verts_of(EDGE);
        let has_new_diag = (0..5).any(|e| {
            let mut pair = [ev2v[e * 2], ev2v[e * 2 + 1]];
            pair.sort_unstable();
            pair == [1, 2]
        });
        assert!(has_new_diag);
        for q in measure_qualities(&mesh) {
            assert!(q > 0.0);
        }
    }
}
