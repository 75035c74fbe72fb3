//! The shared cavity-rewrite kernel.
//!
//! Each operator marks the entities its cavities consume ("dead") and
//! lists the vertex tuples of the entities it produces; this kernel packs
//! the survivors and products into a dense new index space, renumbers
//! connectivity, and settles globals and ownership. Survivors come first
//! in their old relative order, products after in key order.

use crate::arrays::{collect_marked, invert_injective_map, map, INVALID};
use crate::dist::{globals_from_owners, update_ownership, Dist, Remotes};
use crate::mesh::Mesh;
use crate::topology::simplex::ndown_of;

/// Result of rebuilding one dimension.
pub struct ModifiedEnts {
    pub nnew: usize,
    /// Entity-to-vertex table in the new vertex numbering (empty for
    /// vertices).
    pub down_verts: Vec<u32>,
    pub same_ents2old_ents: Vec<u32>,
    pub same_ents2new_ents: Vec<u32>,
    pub prods2new_ents: Vec<u32>,
    /// Old entity to new entity, [`INVALID`] for the dead.
    pub old_ents2new_ents: Vec<u32>,
    pub globals: Vec<u64>,
    pub owners: Remotes,
}

/// Rebuild dimension `ent_dim`: `dead` marks the entities consumed by
/// cavities, `prod_verts2verts` holds product tuples already expressed in
/// the new vertex numbering (empty for `ent_dim == 0`, where `nprods`
/// alone sizes the new vertices).
pub fn modify_ents(
    mesh: &Mesh,
    ent_dim: usize,
    dead: &[u8],
    nprods: usize,
    prod_verts2verts: &[u32],
    old_verts2new_verts: &[u32],
) -> ModifiedEnts {
    let nold = mesh.nents(ent_dim);
    assert_eq!(dead.len(), nold);
    let deg = ndown_of(ent_dim);
    if ent_dim > 0 {
        assert_eq!(prod_verts2verts.len(), nprods * deg);
    }
    let alive: Vec<u8> = dead.iter().map(|&d| u8::from(d == 0)).collect();
    let same_ents2old_ents = collect_marked(&alive);
    let nsame = same_ents2old_ents.len();
    let nnew = nsame + nprods;
    let same_ents2new_ents: Vec<u32> = (0..nsame as u32).collect();
    let prods2new_ents: Vec<u32> = (nsame as u32..nnew as u32).collect();
    let old_ents2new_ents = invert_injective_map(&same_ents2old_ents, nold);
    let mut down_verts = Vec::new();
    if ent_dim > 0 {
        down_verts.reserve(nnew * deg);
        let old_dv = mesh.ask_verts_of(ent_dim);
        for &old in &same_ents2old_ents {
            for &v in &old_dv[old as usize * deg..(old as usize + 1) * deg] {
                let nv = old_verts2new_verts[v as usize];
                debug_assert_ne!(nv, INVALID, "surviving entity references a dead vertex");
                down_verts.push(nv);
            }
        }
        down_verts.extend_from_slice(prod_verts2verts);
    }
    // survivors keep their owner through the old owner's arbitration;
    // products are owned where they are created
    let comm = mesh.comm().clone();
    let rank = comm.rank();
    let same_old_owners = mesh.owners(ent_dim).map(&same_ents2old_ents);
    let same_dist = Dist::new(comm.clone(), same_old_owners, nold);
    let same_owners = update_ownership(&same_dist, None);
    let mut owners = Remotes::new(Vec::with_capacity(nnew), Vec::with_capacity(nnew));
    for i in 0..nsame {
        owners.ranks.push(same_owners.ranks[i]);
        owners.idxs.push(same_owners.idxs[i]);
    }
    for i in 0..nprods {
        owners.ranks.push(rank);
        owners.idxs.push((nsame + i) as u32);
    }
    let globals = globals_from_owners(&comm, &owners, nnew);
    ModifiedEnts {
        nnew,
        down_verts,
        same_ents2old_ents,
        same_ents2new_ents,
        prods2new_ents,
        old_ents2new_ents,
        globals,
        owners,
    }
}

/// Gather old per-entity data onto the survivors of a rewrite.
pub fn unmap_same<T: Copy + Send + Sync>(
    mods: &ModifiedEnts,
    old_data: &[T],
    ncomps: usize,
) -> Vec<T> {
    map(&mods.same_ents2old_ents, old_data, ncomps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::build::build_box;
    use crate::mesh::{EDGE, VERT};
    use std::sync::Arc;

    #[test]
    fn survivors_pack_before_products() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        // kill vertex 3, produce one new vertex
        let dead = [0u8, 0, 0, 1];
        let verts = modify_ents(&mesh, VERT, &dead, 1, &[], &[]);
        assert_eq!(verts.nnew, 4);
        assert_eq!(verts.same_ents2old_ents, vec![0, 1, 2]);
        assert_eq!(verts.prods2new_ents, vec![3]);
        assert_eq!(verts.old_ents2new_ents, vec![0, 1, 2, INVALID]);
        assert_eq!(verts.globals, vec![0, 1, 2, 3]);

        // rebuild edges: the diagonal dies, one product edge (2, new vert)
        let old2new = verts.old_ents2new_ents.clone();
        let dead_edges = [0u8, 0, 1, 1, 1];
        let edges = modify_ents(&mesh, EDGE, &dead_edges, 1, &[2, 3], &old2new);
        assert_eq!(edges.nnew, 3);
        assert_eq!(edges.down_verts, vec![0, 1, 0, 2, 2, 3]);
        assert_eq!(edges.owners.idxs, vec![0, 1, 2]);
    }
}
