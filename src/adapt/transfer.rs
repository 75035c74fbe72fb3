//! Tag migration through cavity rewrites.

use crate::arrays::Graph;
use crate::error::MeshAdaptError;
use crate::mesh::{Mesh, TagData, TransferPolicy, EDGE, VERT};
use crate::numerics::{get_symm2, get_symm3, set_symm2, set_symm3};
use crate::metric::{average_metric2, average_metric3};
use crate::size::measure_elements_real;

use super::modify::{unmap_same, ModifiedEnts};

/// Where each product inherits from; the donor may live on a higher
/// dimension (an edge interior to a face inherits the face's
/// classification).
pub struct Donors {
    pub dims: Vec<u8>,
    pub idxs: Vec<u32>,
}

/// Interpolation support for product vertices: the old edge each midpoint
/// bisects.
pub struct VertInterp {
    pub prods2edges: Vec<u32>,
}

/// Cavity bookkeeping for integral-conserving transfer on elements.
pub struct Conserve {
    /// Offsets of each key's products, length `nkeys + 1`.
    pub keys2prods: Vec<u32>,
    /// Old (dead) elements of each key's cavity.
    pub keys2old_elems: Graph,
}

fn inherit_products(
    old_mesh: &Mesh,
    ent_dim: usize,
    name: &str,
    ncomps: usize,
    donors: &Donors,
    out: &mut TagData,
) -> Result<(), MeshAdaptError> {
    let nprods = donors.dims.len();
    for p in 0..nprods {
        let ddim = donors.dims[p] as usize;
        let didx = donors.idxs[p] as usize;
        let src = if ddim == ent_dim {
            old_mesh.get_tag(ent_dim, name)?
        } else {
            old_mesh.get_tag(ddim, name)?
        };
        if src.ncomps != ncomps {
            return Err(MeshAdaptError::TagTypeMismatch {
                name: name.to_owned(),
            });
        }
        let at = didx * ncomps;
        match (&src.data, &mut *out) {
            (TagData::U8(s), TagData::U8(d)) => {
                d.extend_from_slice(&s[at..at + ncomps]);
            }
            (TagData::I32(s), TagData::I32(d)) => {
                d.extend_from_slice(&s[at..at + ncomps]);
            }
            (TagData::I64(s), TagData::I64(d)) => {
                d.extend_from_slice(&s[at..at + ncomps]);
            }
            (TagData::F64(s), TagData::F64(d)) => {
                d.extend_from_slice(&s[at..at + ncomps]);
            }
            _ => {
                return Err(MeshAdaptError::TagTypeMismatch {
                    name: name.to_owned(),
                })
            }
        }
    }
    Ok(())
}

/// Migrate the tags of one dimension onto a rebuilt mesh. Vertex tags are
/// interpolated at midpoints through `vert_interp`; `donors` feeds
/// inheriting tags; `conserve` redistributes element integrals.
pub fn transfer_tags(
    old_mesh: &Mesh,
    new_mesh: &mut Mesh,
    ent_dim: usize,
    mods: &ModifiedEnts,
    donors: Option<&Donors>,
    vert_interp: Option<&VertInterp>,
    conserve: Option<&Conserve>,
) -> Result<(), MeshAdaptError> {
    let nprods = mods.nnew - mods.same_ents2old_ents.len();
    let dim = old_mesh.dim();
    for tag in old_mesh.tags(ent_dim) {
        if tag.transfer == TransferPolicy::None {
            continue;
        }
        let ncomps = tag.ncomps;
        // survivors first, products appended below
        let mut data = match &tag.data {
            TagData::U8(v) => TagData::U8(unmap_same(mods, v, ncomps)),
            TagData::I32(v) => TagData::I32(unmap_same(mods, v, ncomps)),
            TagData::I64(v) => TagData::I64(unmap_same(mods, v, ncomps)),
            TagData::F64(v) => TagData::F64(unmap_same(mods, v, ncomps)),
        };
        match tag.transfer {
            TransferPolicy::Inherit => {
                let donors = donors.expect("inheriting tags need donors");
                inherit_products(old_mesh, ent_dim, &tag.name, ncomps, donors, &mut data)?;
            }
            TransferPolicy::Linear | TransferPolicy::MomentumVelocity => {
                assert_eq!(ent_dim, VERT, "linear transfer lives on vertices");
                if nprods > 0 {
                    let interp = vert_interp.expect("midpoint products need the split edges");
                    let ev2v = old_mesh.ask_verts_of(EDGE);
                    let old = match &tag.data {
                        TagData::F64(v) => v,
                        _ => {
                            return Err(MeshAdaptError::TagTypeMismatch {
                                name: tag.name.clone(),
                            })
                        }
                    };
                    let out = match &mut data {
                        TagData::F64(v) => v,
                        _ => unreachable!(),
                    };
                    for &e in &interp.prods2edges {
                        let a = ev2v[e as usize * 2] as usize;
                        let b = ev2v[e as usize * 2 + 1] as usize;
                        for c in 0..ncomps {
                            out.push((old[a * ncomps + c] + old[b * ncomps + c]) / 2.0);
                        }
                    }
                }
            }
            TransferPolicy::Metric => {
                assert_eq!(ent_dim, VERT);
                if nprods > 0 {
                    let interp = vert_interp.expect("midpoint products need the split edges");
                    let ev2v = old_mesh.ask_verts_of(EDGE);
                    let old = match &tag.data {
                        TagData::F64(v) => v,
                        _ => {
                            return Err(MeshAdaptError::TagTypeMismatch {
                                name: tag.name.clone(),
                            })
                        }
                    };
                    let out = match &mut data {
                        TagData::F64(v) => v,
                        _ => unreachable!(),
                    };
                    for &e in &interp.prods2edges {
                        let a = ev2v[e as usize * 2] as usize;
                        let b = ev2v[e as usize * 2 + 1] as usize;
                        let mut mid = vec![0.0; ncomps];
                        if dim == 2 {
                            let m = average_metric2(&[get_symm2(old, a), get_symm2(old, b)]);
                            set_symm2(&mut mid, 0, m);
                        } else {
                            let m = average_metric3(&[get_symm3(old, a), get_symm3(old, b)]);
                            set_symm3(&mut mid, 0, m);
                        }
                        out.extend_from_slice(&mid);
                    }
                }
            }
            TransferPolicy::Conserve => {
                assert_eq!(ent_dim, dim, "conserved tags live on elements");
                let ctx = conserve.expect("conserved tags need cavity bookkeeping");
                let old = match &tag.data {
                    TagData::F64(v) => v,
                    _ => {
                        return Err(MeshAdaptError::TagTypeMismatch {
                            name: tag.name.clone(),
                        })
                    }
                };
                let out = match &mut data {
                    TagData::F64(v) => v,
                    _ => unreachable!(),
                };
                out.resize(mods.nnew * ncomps, 0.0);
                let old_sizes = measure_elements_real(old_mesh);
                let new_sizes = measure_elements_real(new_mesh);
                let nkeys = ctx.keys2prods.len() - 1;
                let nsame = mods.same_ents2old_ents.len();
                for key in 0..nkeys {
                    let plo = ctx.keys2prods[key] as usize;
                    let phi = ctx.keys2prods[key + 1] as usize;
                    if plo == phi {
                        continue;
                    }
                    let mut new_total = 0.0;
                    for p in plo..phi {
                        new_total += new_sizes[nsame + p].abs();
                    }
                    for c in 0..ncomps {
                        let mut integral = 0.0;
                        for &e in ctx.keys2old_elems.row(key as u32) {
                            integral += old[e as usize * ncomps + c] * old_sizes[e as usize].abs();
                        }
                        let value = integral / new_total;
                        for p in plo..phi {
                            out[(nsame + p) * ncomps + c] = value;
                        }
                    }
                }
            }
            TransferPolicy::None => unreachable!(),
        }
        debug_assert_eq!(data.len(), mods.nnew * ncomps);
        new_mesh.add_tag(
            ent_dim,
            &tag.name,
            ncomps,
            tag.transfer,
            tag.output,
            data,
        )?;
    }
    Ok(())
}
