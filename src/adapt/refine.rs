//! Edge-bisection refinement.

use rayon::prelude::*;

use crate::arrays::{collect_marked, each_geq, ReduceOp};
use crate::error::MeshAdaptError;
use crate::mesh::{Mesh, TagData, TransferPolicy, EDGE, METRIC, VERT};
use crate::metric::{average_metric2, average_metric3};
use crate::numerics::{get_symm2, get_symm3, get_vector, identity_matrix};
use crate::quality::{metric_tet_quality, metric_triangle_quality};
use crate::size::measure_edges;
use crate::topology::code_which_down;
use crate::topology::simplex::{down_template, ndown_of};

use super::indset::find_indset;
use super::mark::mark_up;
use super::modify::modify_ents;
use super::transfer::{transfer_tags, Conserve, Donors, VertInterp};
use super::AdaptOpts;

/// Minimum cavity quality after bisecting each candidate edge: the ring of
/// elements around the edge, each split in two at the midpoint.
pub fn refine_qualities(mesh: &Mesh, cands2edges: &[u32]) -> Vec<f64> {
    let dim = mesh.dim();
    let coords = mesh.coords();
    let ev2v = mesh.ask_verts_of(EDGE);
    let deg = ndown_of(dim);
    let elemv2v = mesh.ask_verts_of(dim);
    let e2elem = mesh.ask_up(EDGE, dim);
    let v2m = mesh.get_array_f64(VERT, METRIC).ok();
    cands2edges
        .par_iter()
        .map(|&e| {
            let a = ev2v[e as usize * 2] as usize;
            let b = ev2v[e as usize * 2 + 1] as usize;
            let lo = e2elem.a2ab[e as usize] as usize;
            let hi = e2elem.a2ab[e as usize + 1] as usize;
            let mut min_qual = f64::INFINITY;
            for ab in lo..hi {
                let elem = e2elem.ab2b[ab] as usize;
                let verts = &elemv2v[elem * deg..(elem + 1) * deg];
                for &replaced in &[a, b] {
                    let qual = if dim == 2 {
                        let mut p = [[0.0; 2]; 3];
                        let mut ms = Vec::with_capacity(3);
                        for (i, &v) in verts.iter().enumerate() {
                            let v = v as usize;
                            if v == replaced {
                                p[i] = [
                                    (coords[a * 2] + coords[b * 2]) / 2.0,
                                    (coords[a * 2 + 1] + coords[b * 2 + 1]) / 2.0,
                                ];
                                if let Some(m) = v2m {
                                    ms.push(average_metric2(&[get_symm2(m, a), get_symm2(m, b)]));
                                }
                            } else {
                                p[i] = get_vector::<2>(coords, v);
                                if let Some(m) = v2m {
                                    ms.push(get_symm2(m, v));
                                }
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
                            let v = v as usize;
                            if v == replaced {
                                p[i] = [
                                    (coords[a * 3] + coords[b * 3]) / 2.0,
                                    (coords[a * 3 + 1] + coords[b * 3 + 1]) / 2.0,
                                    (coords[a * 3 + 2] + coords[b * 3 + 2]) / 2.0,
                                ];
                                if let Some(m) = v2m {
                                    ms.push(average_metric3(&[get_symm3(m, a), get_symm3(m, b)]));
                                }
                            } else {
                                p[i] = get_vector::<3>(coords, v);
                                if let Some(m) = v2m {
                                    ms.push(get_symm3(m, v));
                                }
                            }
                        }
                        let metric = if ms.is_empty() {
                            identity_matrix()
                        } else {
                            average_metric3(&ms)
                        };
                        metric_tet_quality(p, metric)
                    };
                    min_qual = min_qual.min(qual);
                }
            }
            min_qual
        })
        .collect()
}

/// Rewrite the cavities of an independent set of edges: one midpoint
/// vertex per key, every incident entity split in two, interior entities
/// stitched in.
fn refine_keys(mesh: &mut Mesh, keys2edges: &[u32]) -> Result<(), MeshAdaptError> {
    let dim = mesh.dim();
    let nkeys = keys2edges.len();
    let ev2v = mesh.ask_verts_of(EDGE).to_vec();
    let mut key_marks = vec![0u8; mesh.nedges()];
    for &e in keys2edges {
        key_marks[e as usize] = 1;
    }
    // vertices: nothing dies, one midpoint per key
    let vert_mods = modify_ents(mesh, VERT, &vec![0u8; mesh.nverts()], nkeys, &[], &[]);
    let old2new_verts = vert_mods.old_ents2new_ents.clone();
    let nsame_verts = vert_mods.same_ents2old_ents.len();
    let midpoint = |key: usize| (nsame_verts + key) as u32;

    let mut all_mods = vec![vert_mods];
    let mut all_donors = vec![Donors {
        dims: vec![EDGE as u8; nkeys],
        idxs: keys2edges.to_vec(),
    }];
    let mut conserve = None;
    for ent_dim in 1..=dim {
        let dead = if ent_dim == EDGE {
            key_marks.clone()
        } else {
            mark_up(mesh, EDGE, ent_dim, &key_marks)
        };
        let deg = ndown_of(ent_dim);
        let entv2v = mesh.ask_verts_of(ent_dim).to_vec();
        let mut prods = Vec::new();
        let mut donors = Donors {
            dims: Vec::new(),
            idxs: Vec::new(),
        };
        let mut keys2prods = Vec::with_capacity(nkeys + 1);
        keys2prods.push(0u32);
        let mut keys2old_elems_off = vec![0u32];
        let mut keys2old_elems = Vec::new();
        for (key, &e) in keys2edges.iter().enumerate() {
            let a = ev2v[e as usize * 2];
            let b = ev2v[e as usize * 2 + 1];
            let m = midpoint(key);
            let mut count = 0u32;
            if ent_dim == EDGE {
                // the two halves of the split edge
                prods.extend_from_slice(&[old2new_verts[a as usize], m]);
                prods.extend_from_slice(&[m, old2new_verts[b as usize]]);
                donors.dims.extend_from_slice(&[EDGE as u8; 2]);
                donors.idxs.extend_from_slice(&[e, e]);
                count += 2;
                // one interior edge per incident triangle
                let e2tri = mesh.ask_up(EDGE, 2);
                let lo = e2tri.a2ab[e as usize] as usize;
                let hi = e2tri.a2ab[e as usize + 1] as usize;
                for ab in lo..hi {
                    let t = e2tri.ab2b[ab] as usize;
                    let slot = code_which_down(e2tri.codes[ab]) as usize;
                    let opposite = down_template(2, 0, (slot + 2) % 3, 0);
                    let c = mesh.ask_verts_of(2)[t * 3 + opposite];
                    prods.extend_from_slice(&[m, old2new_verts[c as usize]]);
                    donors.dims.push(2);
                    donors.idxs.push(t as u32);
                    count += 1;
                }
            } else {
                // split every incident entity of this dimension in two
                let e2ent = mesh.ask_up(EDGE, ent_dim);
                let lo = e2ent.a2ab[e as usize] as usize;
                let hi = e2ent.a2ab[e as usize + 1] as usize;
                for ab in lo..hi {
                    let ent = e2ent.ab2b[ab] as usize;
                    let verts = &entv2v[ent * deg..(ent + 1) * deg];
                    for &replaced in &[a, b] {
                        for &v in verts {
                            prods.push(if v == replaced {
                                m
                            } else {
                                old2new_verts[v as usize]
                            });
                        }
                        donors.dims.push(ent_dim as u8);
                        donors.idxs.push(ent as u32);
                        count += 1;
                    }
                    if ent_dim == dim {
                        keys2old_elems.push(ent as u32);
                    }
                }
                if ent_dim == 2 && dim == 3 {
                    // interior triangle of each incident tetrahedron
                    let e2tet = mesh.ask_up(EDGE, 3);
                    let lo = e2tet.a2ab[e as usize] as usize;
                    let hi = e2tet.a2ab[e as usize + 1] as usize;
                    for ab in lo..hi {
                        let tet = e2tet.ab2b[ab] as usize;
                        let verts = &mesh.ask_verts_of(3)[tet * 4..(tet + 1) * 4];
                        let others: Vec<u32> = verts
                            .iter()
                            .copied()
                            .filter(|&v| v != a && v != b)
                            .collect();
                        debug_assert_eq!(others.len(), 2);
                        prods.extend_from_slice(&[
                            m,
                            old2new_verts[others[0] as usize],
                            old2new_verts[others[1] as usize],
                        ]);
                        donors.dims.push(3);
                        donors.idxs.push(tet as u32);
                        count += 1;
                    }
                }
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
                keys2old_elems: crate::arrays::Graph::new(keys2old_elems_off, keys2old_elems),
            });
        }
        all_mods.push(mods);
        all_donors.push(donors);
    }
    finish_rewrite(mesh, all_mods, all_donors, Some(keys2edges.to_vec()), conserve)
}

/// Assemble the new mesh from per-dimension rewrites and move it into
/// place.
pub(super) fn finish_rewrite(
    mesh: &mut Mesh,
    mods: Vec<super::modify::ModifiedEnts>,
    donors: Vec<Donors>,
    midpoint_edges: Option<Vec<u32>>,
    conserve: Option<Conserve>,
) -> Result<(), MeshAdaptError> {
    let dim = mesh.dim();
    let down_verts: Vec<Vec<u32>> = mods[1..].iter().map(|m| m.down_verts.clone()).collect();
    let mut new_mesh =
        Mesh::from_down_verts(mesh.comm().clone(), dim, mods[0].nnew, down_verts)?;
    let vert_interp = midpoint_edges.map(|prods2edges| VertInterp { prods2edges });
    for (ent_dim, m) in mods.iter().enumerate() {
        new_mesh.set_globals(ent_dim, m.globals.clone());
        new_mesh.set_owners(ent_dim, m.owners.clone());
        transfer_tags(
            mesh,
            &mut new_mesh,
            ent_dim,
            m,
            Some(&donors[ent_dim]),
            vert_interp.as_ref(),
            if ent_dim == dim {
                conserve.as_ref()
            } else {
                None
            },
        )?;
    }
    *mesh = new_mesh;
    Ok(())
}

/// Split the edges the metric says are too long. Returns false when no
/// edge qualifies anywhere.
pub fn refine_by_size(mesh: &mut Mesh, opts: &AdaptOpts) -> Result<bool, MeshAdaptError> {
    let comm = mesh.comm().clone();
    let mut did = false;
    // an independent set covers only part of the long edges, so passes
    // repeat until none are left or none qualify
    loop {
        let lengths = measure_edges(mesh);
        let cand_marks = each_geq(&lengths, opts.max_length_desired);
        let any = cand_marks.iter().any(|&m| m != 0);
        if comm.allreduce_i64(i64::from(any), ReduceOp::Max) == 0 {
            return Ok(did);
        }
        let cands2edges = collect_marked(&cand_marks);
        let cand_quals = refine_qualities(mesh, &cands2edges);
        let good = each_geq(&cand_quals, opts.min_quality_allowed);
        let keep = collect_marked(&good);
        if comm.allreduce_i64(keep.len() as i64, ReduceOp::Sum) == 0 {
            return Ok(did);
        }
        let cands2edges: Vec<u32> = keep.iter().map(|&i| cands2edges[i as usize]).collect();
        let cand_quals: Vec<f64> = keep.iter().map(|&i| cand_quals[i as usize]).collect();
        let quals = crate::arrays::unmap(&cands2edges, &cand_quals, mesh.nedges(), -1.0, 1);
        let cands = crate::arrays::unmap(
            &cands2edges,
            &vec![1u8; cands2edges.len()],
            mesh.nedges(),
            0,
            1,
        );
        let keys = find_indset(mesh, EDGE, &quals, &cands);
        let keys2edges = collect_marked(&keys);
        if comm.allreduce_i64(keys2edges.len() as i64, ReduceOp::Sum) == 0 {
            return Ok(did);
        }
        refine_keys(mesh, &keys2edges)?;
        did = true;
    }
}
