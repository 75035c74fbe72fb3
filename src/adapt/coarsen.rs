//! Vertex-collapse coarsening.

use std::collections::HashSet;

use crate::arrays::{collect_marked, each_lt, each_neq_to, Graph, ReduceOp};
use crate::error::MeshAdaptError;
use crate::mesh::{Mesh, EDGE, VERT};
use crate::size::measure_edges;
use crate::topology::simplex::ndown_of;

use super::collapse::*;
use super::indset::find_indset_with_graph;
use super::mark::{mark_down, mark_sliver_layers, mark_up};
use super::modify::modify_ents;
use super::refine::finish_rewrite;
use super::transfer::{Conserve, Donors};
use super::AdaptOpts;

/// Cavities of neighboring collapses may produce the same replacement
/// entity, so keys must be two rings apart: the conflict graph joins
/// vertices within two edge hops.
fn two_hop_conflicts(mesh: &Mesh) -> Graph {
    let star = mesh.ask_star(VERT);
    let n = mesh.nverts();
    let mut srcs = Vec::new();
    let mut dsts = Vec::new();
    for v in 0..n as u32 {
        let mut reach: Vec<u32> = Vec::new();
        for &nb in star.row(v) {
            reach.push(nb);
            reach.extend_from_slice(star.row(nb));
        }
        reach.sort_unstable();
        reach.dedup();
        for d in reach {
            if d != v {
                srcs.push(v);
                dsts.push(d);
            }
        }
    }
    Graph::new(crate::arrays::invert_funnel(&srcs, n), dsts)
}

fn sorted_key(tuple: &[u32]) -> [u32; 4] {
    let mut key = [u32::MAX; 4];
    key[..tuple.len()].copy_from_slice(tuple);
    key[..tuple.len()].sort_unstable();
    key
}

/// Rewrite the cavities of an independent set of collapsing vertices.
fn coarsen_keys(
    mesh: &mut Mesh,
    keys2verts: &[u32],
    rails2edges: &[u32],
    rail_col_dirs: &[u8],
) -> Result<(), MeshAdaptError> {
    let dim = mesh.dim();
    let nkeys = keys2verts.len();
    let ev2v = mesh.ask_verts_of(EDGE).to_vec();
    let keys2verts_onto: Vec<u32> = (0..nkeys)
        .map(|k| {
            let e = rails2edges[k] as usize;
            ev2v[e * 2 + (1 - rail_col_dirs[k] as usize)]
        })
        .collect();
    let mut key_vert_marks = vec![0u8; mesh.nverts()];
    for &v in keys2verts {
        key_vert_marks[v as usize] = 1;
    }
    let vert_mods = modify_ents(mesh, VERT, &key_vert_marks, 0, &[], &[]);
    let old2new_verts = vert_mods.old_ents2new_ents.clone();
    let mut all_mods = vec![vert_mods];
    let mut all_donors = vec![Donors {
        dims: Vec::new(),
        idxs: Vec::new(),
    }];
    let mut conserve = None;
    for ent_dim in 1..=dim {
        let dead = mark_up(mesh, VERT, ent_dim, &key_vert_marks);
        let deg = ndown_of(ent_dim);
        let entv2v = mesh.ask_verts_of(ent_dim);
        let existing: HashSet<[u32; 4]> = (0..mesh.nents(ent_dim))
            .map(|e| sorted_key(&entv2v[e * deg..(e + 1) * deg]))
            .collect();
        let v2ent = mesh.ask_up(VERT, ent_dim);
        let mut prods = Vec::new();
        let mut donors = Donors {
            dims: Vec::new(),
            idxs: Vec::new(),
        };
        let mut keys2prods = vec![0u32];
        let mut keys2old_elems_off = vec![0u32];
        let mut keys2old_elems = Vec::new();
        for key in 0..nkeys {
            let v_col = keys2verts[key];
            let v_onto = keys2verts_onto[key];
            let lo = v2ent.a2ab[v_col as usize] as usize;
            let hi = v2ent.a2ab[v_col as usize + 1] as usize;
            let mut count = 0u32;
            for ab in lo..hi {
                let ent = v2ent.ab2b[ab] as usize;
                let verts = &entv2v[ent * deg..(ent + 1) * deg];
                if ent_dim == dim {
                    keys2old_elems.push(ent as u32);
                }
                if verts.contains(&v_onto) {
                    // collapses flat, nothing replaces it
                    continue;
                }
                let subst: Vec<u32> = verts
                    .iter()
                    .map(|&v| if v == v_col { v_onto } else { v })
                    .collect();
                if existing.contains(&sorted_key(&subst)) {
                    // the replacement already exists on the cavity boundary
                    continue;
                }
                for &v in &subst {
                    prods.push(old2new_verts[v as usize]);
                }
                donors.dims.push(ent_dim as u8);
                donors.idxs.push(ent as u32);
                count += 1;
            }
            keys2prods.push(keys2prods.last().unwrap() + count);
            if ent_dim == dim {
                keys2old_elems_off.push(keys2old_elems.len() as u32);
            }
        }
        let nprods = *keys2prods.last().unwrap() as usize;
        let mods = modify_ents(mesh, ent_dim, &dead, nprods, &prods, &old2new_verts);
        if ent_dim == dim {
            conserve = Some(Conserve {
                keys2prods,
                keys2old_elems: Graph::new(keys2old_elems_off, keys2old_elems),
            });
        }
        all_mods.push(mods);
        all_donors.push(donors);
    }
    finish_rewrite(mesh, all_mods, all_donors, None, conserve)
}

fn coarsen_verts(
    mesh: &mut Mesh,
    opts: &AdaptOpts,
    vert_marks: &[u8],
    prevent_overshoot_check: bool,
    improve: bool,
) -> Result<bool, MeshAdaptError> {
    let comm = mesh.comm().clone();
    let ev2v = mesh.ask_verts_of(EDGE);
    let mut edge_codes = vec![DONT_COLLAPSE; mesh.nedges()];
    for (e, code) in edge_codes.iter_mut().enumerate() {
        for eev in 0..2 {
            if vert_marks[ev2v[e * 2 + eev] as usize] != 0 {
                *code = do_collapse(*code, eev);
            }
        }
    }
    let edges_are_cands = each_neq_to(&edge_codes, DONT_COLLAPSE);
    let mut cands2edges = collect_marked(&edges_are_cands);
    let mut cand_codes: Vec<u8> = cands2edges
        .iter()
        .map(|&e| edge_codes[e as usize])
        .collect();
    cand_codes = check_collapse_class(mesh, &cands2edges, &cand_codes);
    filter_candidates(&mut cands2edges, &mut cand_codes, None);
    if prevent_overshoot_check {
        cand_codes = prevent_overshoot(mesh, opts.max_length_desired, &cands2edges, &cand_codes);
        filter_candidates(&mut cands2edges, &mut cand_codes, None);
    }
    if comm.allreduce_i64(cands2edges.len() as i64, ReduceOp::Sum) == 0 {
        return Ok(false);
    }
    let mut cand_quals = coarsen_qualities(mesh, &cands2edges, &cand_codes);
    cand_codes = filter_coarsen_min_qual(&cand_codes, &cand_quals, opts.min_quality_allowed);
    if improve {
        cand_codes = filter_coarsen_improve(mesh, &cands2edges, &cand_codes, &cand_quals);
    }
    filter_candidates(&mut cands2edges, &mut cand_codes, Some(&mut cand_quals));
    if comm.allreduce_i64(cands2edges.len() as i64, ReduceOp::Sum) == 0 {
        return Ok(false);
    }
    let (verts_are_cands, vert_quals, vert_rails) =
        choose_rails(mesh, &cands2edges, &cand_codes, &cand_quals);
    let conflicts = two_hop_conflicts(mesh);
    let verts_are_keys =
        find_indset_with_graph(mesh, VERT, &conflicts, &vert_quals, &verts_are_cands);
    let keys2verts = collect_marked(&verts_are_keys);
    if comm.allreduce_i64(keys2verts.len() as i64, ReduceOp::Sum) == 0 {
        return Ok(false);
    }
    let (rails2edges, rail_col_dirs) = find_rails(mesh, &keys2verts, &vert_rails);
    coarsen_keys(mesh, &keys2verts, &rails2edges, &rail_col_dirs)?;
    Ok(true)
}

/// Drop candidates whose code emptied out; keeps the parallel arrays in
/// step.
fn filter_candidates(
    cands2edges: &mut Vec<u32>,
    cand_codes: &mut Vec<u8>,
    cand_quals: Option<&mut Vec<f64>>,
) {
    let keep: Vec<usize> = cand_codes
        .iter()
        .enumerate()
        .filter(|(_, &c)| c != DONT_COLLAPSE)
        .map(|(i, _)| i)
        .collect();
    *cands2edges = keep.iter().map(|&i| cands2edges[i]).collect();
    *cand_codes = keep.iter().map(|&i| cand_codes[i]).collect();
    if let Some(quals) = cand_quals {
        *quals = keep
            .iter()
            .flat_map(|&i| [quals[i * 2], quals[i * 2 + 1]])
            .collect();
    }
}

/// Collapse edges the metric says are too short. Returns false when no
/// edge qualifies anywhere.
pub fn coarsen_by_size(mesh: &mut Mesh, opts: &AdaptOpts) -> Result<bool, MeshAdaptError> {
    let comm = mesh.comm().clone();
    let mut did = false;
    loop {
        let lengths = measure_edges(mesh);
        let edge_is_cand = each_lt(&lengths, opts.min_length_desired);
        let any = edge_is_cand.iter().any(|&m| m != 0);
        if comm.allreduce_i64(i64::from(any), ReduceOp::Max) == 0 {
            return Ok(did);
        }
        let vert_marks = mark_down(mesh, EDGE, VERT, &edge_is_cand);
        if !coarsen_verts(mesh, opts, &vert_marks, true, false)? {
            return Ok(did);
        }
        did = true;
    }
}

/// Collapse vertices of sliver elements, allowing overshoot but requiring
/// strict local improvement.
pub fn coarsen_slivers(mesh: &mut Mesh, opts: &AdaptOpts) -> Result<bool, MeshAdaptError> {
    let elem_marks = mark_sliver_layers(mesh, opts.min_quality_desired, opts.nsliver_layers);
    let vert_marks = mark_down(mesh, mesh.dim(), VERT, &elem_marks);
    coarsen_verts(mesh, opts, &vert_marks, false, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::build::{build_box, classify_box};
    use std::sync::Arc;

    #[test]
    fn two_hop_graph_of_unit_box_is_complete() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        let g = two_hop_conflicts(&mesh);
        // every vertex reaches every other within two hops
        for v in 0..4u32 {
            assert_eq!(g.row(v).len(), 3);
        }
    }

    #[test]
    fn coarsening_a_refined_box_removes_interior_vertices() {
        let mut mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 4, 4, 0).unwrap();
        classify_box(&mut mesh).unwrap();
        let nverts_before = mesh.nverts();
        // ask for much longer edges than the mesh has
        let opts = AdaptOpts {
            min_length_desired: 0.6,
            max_length_desired: 10.0,
            ..AdaptOpts::default()
        };
        assert!(coarsen_by_size(&mut mesh, &opts).unwrap());
        assert!(mesh.nverts() < nverts_before);
        // the four model corners must survive
        let coords = mesh.coords();
        for corner in [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]] {
            let found = (0..mesh.nverts())
                .any(|v| coords[v * 2] == corner[0] && coords[v * 2 + 1] == corner[1]);
            assert!(found, "corner {corner:?} was collapsed away");
        }
        // all elements stay valid
        for q in crate::quality::measure_qualities(&mesh) {
            assert!(q > 0.0);
        }
    }
}
