//! 3D edge swapping: remove an interior edge by re-tetrahedralizing the
//! polygon of vertices around it.

use std::collections::{HashMap, HashSet};

use crate::arrays::{collect_marked, ReduceOp};
use crate::error::MeshAdaptError;
use crate::mesh::{Mesh, CLASS_DIM, EDGE, TET, TRI, VERT};
use crate::metric::average_metric3;
use crate::numerics::{get_symm3, get_vector, identity_matrix};
use crate::quality::{measure_qualities, metric_tet_quality};

use super::indset::find_indset;
use super::modify::modify_ents;
use super::refine::finish_rewrite;
use super::transfer::{Conserve, Donors};
use super::AdaptOpts;

/// Largest ring the swap will re-triangulate; Catalan(MAX_LOOP - 2)
/// triangulations is still only 14 candidates.
pub const MAX_LOOP: usize = 7;

/// The ordered cycle of vertices around an interior edge.
#[derive(Clone, Debug)]
pub struct RingLoop {
    /// The edge's stored endpoints.
    pub eev2v: [u32; 2],
    /// Ring vertices wound so that `(eev2v[0], eev2v[1], verts[i],
    /// verts[i+1])` is positively oriented.
    pub verts: Vec<u32>,
}

fn permutation_parity(perm: &[usize]) -> bool {
    let mut inversions = 0;
    for i in 0..perm.len() {
        for j in i + 1..perm.len() {
            if perm[i] > perm[j] {
                inversions += 1;
            }
        }
    }
    inversions % 2 == 0
}

/// Walk the tetrahedra around edge `e` and return the closed vertex ring,
/// or `None` when the edge touches the boundary or the ring is too large.
pub fn find_loop(mesh: &Mesh, e: usize) -> Option<RingLoop> {
    let ev2v = mesh.ask_verts_of(EDGE);
    let a = ev2v[e * 2];
    let b = ev2v[e * 2 + 1];
    let e2tet = mesh.ask_up(EDGE, TET);
    let lo = e2tet.a2ab[e] as usize;
    let hi = e2tet.a2ab[e + 1] as usize;
    let ntets = hi - lo;
    if ntets < 3 || ntets > MAX_LOOP {
        return None;
    }
    let tetv2v = mesh.ask_verts_of(TET);
    let mut succ: HashMap<u32, u32> = HashMap::with_capacity(ntets);
    let mut first_src = None;
    for ab in lo..hi {
        let tet = e2tet.ab2b[ab] as usize;
        let verts = &tetv2v[tet * 4..(tet + 1) * 4];
        let others: Vec<u32> = verts.iter().copied().filter(|&v| v != a && v != b).collect();
        debug_assert_eq!(others.len(), 2);
        let (u, v) = (others[0], others[1]);
        // orientation of (a, b, u, v) relative to the stored tet
        let arranged = [a, b, u, v];
        let perm: Vec<usize> = verts
            .iter()
            .map(|w| arranged.iter().position(|x| x == w).unwrap())
            .collect();
        let (src, dst) = if permutation_parity(&perm) {
            (u, v)
        } else {
            (v, u)
        };
        if succ.insert(src, dst).is_some() {
            return None;
        }
        if first_src.is_none() {
            first_src = Some(src);
        }
    }
    let start = first_src?;
    let mut verts = Vec::with_capacity(ntets);
    let mut at = start;
    for _ in 0..ntets {
        verts.push(at);
        at = *succ.get(&at)?;
    }
    if at != start {
        return None;
    }
    Some(RingLoop {
        eev2v: [a, b],
        verts,
    })
}

/// One triangulation choice: the minimum tet quality it achieves and its
/// triangles as ring indices.
#[derive(Clone, Debug)]
pub struct Choice {
    pub quality: f64,
    pub triangles: Vec<[usize; 3]>,
}

/// Quality of the pair of tets a ring triangle generates.
fn triangle_pair_quality(mesh: &Mesh, ring: &RingLoop, x: u32, y: u32, z: u32) -> f64 {
    let coords = mesh.coords();
    let v2m = mesh.get_array_f64(VERT, crate::mesh::METRIC).ok();
    let [a, b] = ring.eev2v;
    let mut min_qual = f64::INFINITY;
    for tet in [[x, y, z, b], [x, z, y, a]] {
        let p = std::array::from_fn(|i| get_vector::<3>(coords, tet[i] as usize));
        let metric = match v2m {
            Some(m) => average_metric3(&[
                get_symm3(m, tet[0] as usize),
                get_symm3(m, tet[1] as usize),
                get_symm3(m, tet[2] as usize),
                get_symm3(m, tet[3] as usize),
            ]),
            None => identity_matrix(),
        };
        min_qual = min_qual.min(metric_tet_quality(p, metric));
    }
    min_qual
}

/// Dynamic program over sub-polygons `(i, j)`: the triangulation of the
/// ring maximizing the minimum tet quality, ties toward the earlier apex.
pub fn choose_triangulation(mesh: &Mesh, ring: &RingLoop) -> Choice {
    let l = ring.verts.len();
    let mut best = vec![vec![f64::INFINITY; l]; l];
    let mut apex = vec![vec![0usize; l]; l];
    for span in 2..l {
        for i in 0..l - span {
            let j = i + span;
            for k in i + 1..j {
                let tri_q =
                    triangle_pair_quality(mesh, ring, ring.verts[i], ring.verts[k], ring.verts[j]);
                let q = tri_q.min(best[i][k]).min(best[k][j]);
                if q > best[i][j] || best[i][j] == f64::INFINITY {
                    best[i][j] = q;
                    apex[i][j] = k;
                }
            }
        }
    }
    let mut triangles = Vec::with_capacity(l - 2);
    let mut stack = vec![(0usize, l - 1)];
    while let Some((i, j)) = stack.pop() {
        if j - i < 2 {
            continue;
        }
        let k = apex[i][j];
        triangles.push([i, k, j]);
        stack.push((i, k));
        stack.push((k, j));
    }
    Choice {
        quality: best[0][l - 1],
        triangles,
    }
}

fn sorted2(a: u32, b: u32) -> [u32; 2] {
    if a < b {
        [a, b]
    } else {
        [b, a]
    }
}

fn sorted3(mut t: [u32; 3]) -> [u32; 3] {
    t.sort_unstable();
    t
}

/// Rewrite the cavities of an independent set of swap edges with their
/// chosen triangulations.
fn swap3d_keys(
    mesh: &mut Mesh,
    keys2edges: &[u32],
    choices: &[Choice],
) -> Result<(), MeshAdaptError> {
    let nkeys = keys2edges.len();
    let rings: Vec<RingLoop> = keys2edges
        .iter()
        .map(|&e| find_loop(mesh, e as usize).expect("swap keys have closed rings"))
        .collect();
    let e2tet = mesh.ask_up(EDGE, TET).clone();
    let e2tri = mesh.ask_up(EDGE, TRI).clone();
    let vert_mods = modify_ents(mesh, VERT, &vec![0u8; mesh.nverts()], 0, &[], &[]);
    let old2new_verts = vert_mods.old_ents2new_ents.clone();
    let mut all_mods = vec![vert_mods];
    let mut all_donors = vec![Donors {
        dims: Vec::new(),
        idxs: Vec::new(),
    }];
    // dead: the edge, every face and tet around it
    let mut dead = vec![
        vec![0u8; mesh.nedges()],
        vec![0u8; mesh.nents(TRI)],
        vec![0u8; mesh.nents(TET)],
    ];
    for &e in keys2edges {
        dead[0][e as usize] = 1;
        for &t in e2tri.graph().row(e) {
            dead[1][t as usize] = 1;
        }
        for &t in e2tet.graph().row(e) {
            dead[2][t as usize] = 1;
        }
    }
    let existing_edges: HashSet<[u32; 2]> = {
        let ev2v = mesh.ask_verts_of(EDGE);
        (0..mesh.nedges())
            .map(|e| sorted2(ev2v[e * 2], ev2v[e * 2 + 1]))
            .collect()
    };
    let existing_tris: HashSet<[u32; 3]> = {
        let tv2v = mesh.ask_verts_of(TRI);
        (0..mesh.nents(TRI))
            .map(|t| sorted3([tv2v[t * 3], tv2v[t * 3 + 1], tv2v[t * 3 + 2]]))
            .collect()
    };
    let mut created_edges: HashSet<[u32; 2]> = HashSet::new();
    let mut created_tris: HashSet<[u32; 3]> = HashSet::new();
    let mut conserve = None;
    for ent_dim in 1..=3usize {
        let mut prods = Vec::new();
        let mut donors = Donors {
            dims: Vec::new(),
            idxs: Vec::new(),
        };
        let mut keys2prods = vec![0u32];
        let mut keys2old_elems_off = vec![0u32];
        let mut keys2old_elems = Vec::new();
        for key in 0..nkeys {
            let ring = &rings[key];
            let choice = &choices[key];
            let [a, b] = ring.eev2v;
            let e = keys2edges[key];
            let donor_tet = e2tet.graph().row(e)[0];
            let mut count = 0u32;
            let mut push = |tuple: &[u32],
                            prods: &mut Vec<u32>,
                            donors: &mut Donors,
                            count: &mut u32| {
                for &v in tuple {
                    prods.push(old2new_verts[v as usize]);
                }
                donors.dims.push(TET as u8);
                donors.idxs.push(donor_tet);
                *count += 1;
            };
            match ent_dim {
                1 => {
                    for tri in &choice.triangles {
                        // the chord of each sub-polygon split
                        for (i, j) in [(tri[0], tri[2])] {
                            if j - i < 2 || (i == 0 && j == ring.verts.len() - 1) {
                                continue;
                            }
                            let key2 = sorted2(ring.verts[i], ring.verts[j]);
                            if existing_edges.contains(&key2) || !created_edges.insert(key2) {
                                continue;
                            }
                            push(&[key2[0], key2[1]], &mut prods, &mut donors, &mut count);
                        }
                    }
                }
                2 => {
                    for tri in &choice.triangles {
                        let t = [
                            ring.verts[tri[0]],
                            ring.verts[tri[1]],
                            ring.verts[tri[2]],
                        ];
                        if !existing_tris.contains(&sorted3(t)) && created_tris.insert(sorted3(t))
                        {
                            push(&t, &mut prods, &mut donors, &mut count);
                        }
                        for (i, j) in [(tri[0], tri[2])] {
                            if j - i < 2 || (i == 0 && j == ring.verts.len() - 1) {
                                continue;
                            }
                            let chord = sorted2(ring.verts[i], ring.verts[j]);
                            for cap in [a, b] {
                                let face = sorted3([chord[0], chord[1], cap]);
                                if !existing_tris.contains(&face) && created_tris.insert(face) {
                                    push(&face, &mut prods, &mut donors, &mut count);
                                }
                            }
                        }
                    }
                }
                _ => {
                    for tri in &choice.triangles {
                        let (x, y, z) = (
                            ring.verts[tri[0]],
                            ring.verts[tri[1]],
                            ring.verts[tri[2]],
                        );
                        push(&[x, y, z, b], &mut prods, &mut donors, &mut count);
                        push(&[x, z, y, a], &mut prods, &mut donors, &mut count);
                    }
                    for &t in e2tet.graph().row(e) {
                        keys2old_elems.push(t);
                    }
                }
            }
            keys2prods.push(keys2prods.last().unwrap() + count);
            if ent_dim == 3 {
                keys2old_elems_off.push(keys2old_elems.len() as u32);
            }
        }
        let nprods = *keys2prods.last().unwrap() as usize;
        let mods = modify_ents(
            mesh,
            ent_dim,
            &dead[ent_dim - 1],
            nprods,
            &prods,
            &old2new_verts,
        );
        if ent_dim == 3 {
            conserve = Some(Conserve {
                keys2prods,
                keys2old_elems: crate::arrays::Graph::new(keys2old_elems_off, keys2old_elems),
            });
        }
        all_mods.push(mods);
        all_donors.push(donors);
    }
    finish_rewrite(mesh, all_mods, all_donors, None, conserve)
}

/// Swap interior edges whose best re-triangulation strictly improves the
/// local minimum quality. Returns false when nothing qualifies.
pub fn swap_edges_3d(mesh: &mut Mesh, opts: &AdaptOpts) -> Result<bool, MeshAdaptError> {
    let comm = mesh.comm().clone();
    let mut did = false;
    loop {
        let quals = measure_qualities(mesh);
        let e2tet = mesh.ask_up(EDGE, TET);
        let edge_class = mesh.get_array_u8(EDGE, CLASS_DIM).ok();
        let mut cands = vec![0u8; mesh.nedges()];
        let mut edge_quals = vec![-1.0; mesh.nedges()];
        let mut choices: Vec<Option<Choice>> = vec![None; mesh.nedges()];
        for e in 0..mesh.nedges() {
            if let Some(class) = edge_class {
                if class[e] != 3 {
                    continue;
                }
            }
            let lo = e2tet.a2ab[e] as usize;
            let hi = e2tet.a2ab[e + 1] as usize;
            let old = e2tet.ab2b[lo..hi]
                .iter()
                .fold(f64::INFINITY, |m, &t| m.min(quals[t as usize]));
            if old >= opts.min_quality_desired {
                continue;
            }
            let Some(ring) = find_loop(mesh, e) else {
                continue;
            };
            let choice = choose_triangulation(mesh, &ring);
            if choice.quality > old {
                cands[e] = 1;
                edge_quals[e] = choice.quality;
                choices[e] = Some(choice);
            }
        }
        if comm.allreduce_i64(
            cands.iter().filter(|&&m| m != 0).count() as i64,
            ReduceOp::Sum,
        ) == 0
        {
            return Ok(did);
        }
        let keys = find_indset(mesh, EDGE, &edge_quals, &cands);
        let keys2edges = collect_marked(&keys);
        if comm.allreduce_i64(keys2edges.len() as i64, ReduceOp::Sum) == 0 {
            return Ok(did);
        }
        let key_choices: Vec<Choice> = keys2edges
            .iter()
            .map(|&e| choices[e as usize].clone().unwrap())
            .collect();
        swap3d_keys(mesh, &keys2edges, &key_choices)?;
        did = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::build::build_box;
    use crate::numerics::are_close;
    use std::sync::Arc;

    #[test]
    fn cube_diagonal_ring_is_the_six_outer_vertices() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 1.0, 1, 1, 1).unwrap();
        // edge 6 is the main diagonal (0, 7)
        let ring = find_loop(&mesh, 6).expect("the diagonal is interior");
        assert_eq!(ring.eev2v, [0, 7]);
        assert_eq!(ring.verts.len(), 6);
        let mut sorted = ring.verts.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5, 6]);
        // consecutive ring vertices share an edge of the cube surface
        for i in 0..6 {
            let u = ring.verts[i];
            let v = ring.verts[(i + 1) % 6];
            let du = (u ^ v).count_ones();
            assert_eq!(du, 1, "ring hops one cube axis at a time");
        }
    }

    #[test]
    fn cube_diagonal_swap_is_degenerate() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 1.0, 1, 1, 1).unwrap();
        let ring = find_loop(&mesh, 6).unwrap();
        let choice = choose_triangulation(&mesh, &ring);
        // every triangulation of the ring produces a flat tet
        assert!(are_close(choice.quality, 0.0));
        assert_eq!(choice.triangles.len(), 4);
    }

    #[test]
    fn boundary_edges_have_no_loop() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 1.0, 1, 1, 1).unwrap();
        // edge 0 is (0, 1), on the cube surface
        assert!(find_loop(&mesh, 0).is_none());
    }
}
