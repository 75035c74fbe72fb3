//! Adjacency derivation from the canonical entity-to-vertex relation.

use std::collections::HashMap;

use crate::arrays::{invert_funnel, sort_by_keys, Graph};
use crate::topology::align::*;
use crate::topology::simplex::*;

/// An adjacency: `a2ab` offsets (empty for fixed-degree downward
/// relations), `ab2b` target indices, and per-slot alignment codes (empty
/// when every alignment is trivial, e.g. for vertices).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Adj {
    pub a2ab: Vec<u32>,
    pub ab2b: Vec<u32>,
    pub codes: Vec<u8>,
}

impl Adj {
    pub fn from_ab2b(ab2b: Vec<u32>) -> Self {
        Adj {
            a2ab: Vec::new(),
            ab2b,
            codes: Vec::new(),
        }
    }

    /// View the offset/value pair as a graph, dropping codes.
    pub fn graph(&self) -> Graph {
        Graph::new(self.a2ab.clone(), self.ab2b.clone())
    }
}

/// Canonical form of a vertex tuple: the lexicographically smallest image
/// under flip/rotation, along with the code mapping the tuple onto it.
fn to_canonical(deg: usize, tuple: &[u32]) -> ([u32; 3], u8) {
    let mut best = [u32::MAX; 3];
    let mut best_code = IDENTITY_CODE;
    for flipped in [false, true] {
        for rotation in 0..deg as u8 {
            let code = make_code(flipped, rotation, 0);
            let mut image = [u32::MAX; 3];
            align_adj(deg, code, tuple, &mut image[..deg]);
            if image < best {
                best = image;
                best_code = code;
            }
        }
    }
    (best, best_code)
}

/// For each downward slot of each high entity, find the low entity it uses
/// and the alignment code mapping the low entity's stored vertex order onto
/// the use. Panics if a use has no matching low entity.
pub fn reflect_down(
    hv2v: &[u32],
    lv2v: &[u32],
    nverts: usize,
    high_dim: usize,
    low_dim: usize,
) -> Adj {
    let deg = ndown_of(low_dim);
    let uses = form_uses(hv2v, high_dim, low_dim);
    debug_assert!(uses.iter().all(|&v| (v as usize) < nverts));
    let nlows = lv2v.len() / deg;
    let mut lows_by_canon: HashMap<[u32; 3], (u32, u8)> = HashMap::with_capacity(nlows);
    for l in 0..nlows {
        let (canon, code) = to_canonical(deg, &lv2v[l * deg..(l + 1) * deg]);
        let prev = lows_by_canon.insert(canon, (l as u32, code));
        debug_assert!(prev.is_none(), "duplicate low entity");
    }
    let nuses = uses.len() / deg;
    let mut ab2b = Vec::with_capacity(nuses);
    let mut codes = Vec::with_capacity(nuses);
    for u in 0..nuses {
        let (canon, use_code) = to_canonical(deg, &uses[u * deg..(u + 1) * deg]);
        let &(low, low_code) = lows_by_canon
            .get(&canon)
            .expect("use without a matching low entity");
        ab2b.push(low);
        // stored -> canonical -> use
        codes.push(compound_alignments(
            deg,
            low_code,
            invert_alignment(deg, use_code),
        ));
    }
    Adj {
        a2ab: Vec::new(),
        ab2b,
        codes,
    }
}

/// Invert a downward adjacency (fixed `nper` slots per high entity) into
/// the upward one. Each upward slot code carries the inverted alignment
/// plus the downward slot in its `which_down` bits. Buckets are ordered by
/// `(high_global, which_down)`, which makes the result independent of the
/// order high entities are stored in.
pub fn invert_adj(
    down: &Adj,
    nper: usize,
    child_deg: usize,
    nlow: usize,
    high_globals: &[u64],
) -> Adj {
    let nhigh = down.ab2b.len() / nper;
    assert_eq!(high_globals.len(), nhigh);
    let nentries = down.ab2b.len();
    let mut keys = Vec::with_capacity(nentries * 3);
    let mut parents = Vec::with_capacity(nentries);
    let mut codes = Vec::with_capacity(nentries);
    for h in 0..nhigh {
        for slot in 0..nper {
            let child = down.ab2b[h * nper + slot];
            keys.push(child as u64);
            keys.push(high_globals[h]);
            keys.push(slot as u64);
            parents.push(h as u32);
            let down_code = if down.codes.is_empty() {
                IDENTITY_CODE
            } else {
                down.codes[h * nper + slot]
            };
            let inv = invert_alignment(child_deg, down_code);
            codes.push(make_code(
                code_is_flipped(inv),
                code_rotation(inv),
                slot as u8,
            ));
        }
    }
    let perm = sort_by_keys(&keys, 3);
    let sorted_children: Vec<u32> = perm.iter().map(|&i| keys[i as usize * 3] as u32).collect();
    let a2ab = invert_funnel(&sorted_children, nlow);
    let ab2b = perm.iter().map(|&i| parents[i as usize]).collect();
    let codes = perm.iter().map(|&i| codes[i as usize]).collect();
    Adj { a2ab, ab2b, codes }
}

/// The unique low-dimensional entities of a mesh, as canonical vertex
/// tuples in ascending lexicographic order.
pub fn find_unique(hv2v: &[u32], high_dim: usize, low_dim: usize) -> Vec<u32> {
    let deg = ndown_of(low_dim);
    let uses = form_uses(hv2v, high_dim, low_dim);
    let nuses = uses.len() / deg;
    let mut canons = Vec::with_capacity(nuses * deg);
    for u in 0..nuses {
        let (canon, _) = to_canonical(deg, &uses[u * deg..(u + 1) * deg]);
        canons.extend_from_slice(&canon[..deg]);
    }
    let perm = sort_by_keys(&canons, deg);
    let mut out = Vec::new();
    let mut prev: Option<&[u32]> = None;
    for &u in &perm {
        let tuple = &canons[u as usize * deg..(u as usize + 1) * deg];
        if prev != Some(tuple) {
            out.extend_from_slice(tuple);
            prev = Some(tuple);
        }
    }
    out
}

/// Vertex-to-vertex star across edges, rows sorted ascending.
pub fn vert_star(ev2v: &[u32], nverts: usize) -> Graph {
    let nedges = ev2v.len() / 2;
    let mut pairs = Vec::with_capacity(nedges * 4);
    for e in 0..nedges {
        let a = ev2v[e * 2];
        let b = ev2v[e * 2 + 1];
        pairs.push([a, b]);
        pairs.push([b, a]);
    }
    pairs.sort_unstable();
    let mut srcs = Vec::with_capacity(pairs.len());
    let mut dsts = Vec::with_capacity(pairs.len());
    for [s, d] in pairs {
        srcs.push(s);
        dsts.push(d);
    }
    Graph::new(invert_funnel(&srcs, nverts), dsts)
}

/// Entity-to-entity star across the elements that contain them (the
/// conflict graph of cavity operators), rows sorted ascending.
pub fn edge_star(ents2elems: &Adj, elems2ents: &[u32], nper: usize, nents: usize) -> Graph {
    let mut srcs = Vec::new();
    let mut dsts = Vec::new();
    for e in 0..nents {
        let lo = ents2elems.a2ab[e] as usize;
        let hi = ents2elems.a2ab[e + 1] as usize;
        let mut row: Vec<u32> = Vec::new();
        for &elem in &ents2elems.ab2b[lo..hi] {
            let at = elem as usize * nper;
            for &other in &elems2ents[at..at + nper] {
                if other != e as u32 {
                    row.push(other);
                }
            }
        }
        row.sort_unstable();
        row.dedup();
        for d in row {
            srcs.push(e as u32);
            dsts.push(d);
        }
    }
    Graph::new(invert_funnel(&srcs, nents), dsts)
}

/// Element dual graph: neighbors through shared sides, in side-slot order.
pub fn elements_across_sides(
    elems2sides: &[u32],
    sides2elems: &Adj,
    nper: usize,
    nelems: usize,
) -> Graph {
    let mut srcs = Vec::new();
    let mut dsts = Vec::new();
    for t in 0..nelems {
        for slot in 0..nper {
            let side = elems2sides[t * nper + slot] as usize;
            let lo = sides2elems.a2ab[side] as usize;
            let hi = sides2elems.a2ab[side + 1] as usize;
            for &other in &sides2elems.ab2b[lo..hi] {
                if other != t as u32 {
                    srcs.push(t as u32);
                    dsts.push(other);
                }
            }
        }
    }
    Graph::new(invert_funnel(&srcs, nelems), dsts)
}
