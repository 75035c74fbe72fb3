//! Mesh construction: from element connectivity, box meshes, and the
//! Hilbert reordering.

use std::sync::Arc;

use crate::arrays::{map, sort_by_keys};
use crate::dist::Comm;
use crate::error::MeshAdaptError;
use crate::hilbert;
use crate::mesh::{Mesh, TagData, TransferPolicy, CLASS_DIM, CLASS_ID, COORDS, EDGE, TRI, VERT};
use crate::topology::find_unique;
use crate::topology::simplex::ndown_of;

/// Build a mesh from its element-to-vertex relation; edges (and faces in
/// 3D) are derived by enumerating unique sub-simplices.
pub fn build_from_elems2verts(
    comm: Arc<dyn Comm>,
    dim: usize,
    ev2v: Vec<u32>,
    nverts: usize,
) -> Result<Mesh, MeshAdaptError> {
    let mut down_verts = Vec::with_capacity(dim);
    for k in 1..dim {
        down_verts.push(find_unique(&ev2v, dim, k));
    }
    down_verts.push(ev2v);
    Mesh::from_down_verts(comm, dim, nverts, down_verts)
}

/// Build a mesh and attach vertex coordinates.
pub fn build_from_elems_and_coords(
    comm: Arc<dyn Comm>,
    dim: usize,
    ev2v: Vec<u32>,
    coords: Vec<f64>,
) -> Result<Mesh, MeshAdaptError> {
    assert_eq!(coords.len() % dim, 0);
    let nverts = coords.len() / dim;
    let mut mesh = build_from_elems2verts(comm, dim, ev2v, nverts)?;
    mesh.add_tag(
        VERT,
        COORDS,
        dim,
        TransferPolicy::Linear,
        true,
        TagData::F64(coords),
    )?;
    Ok(mesh)
}

/// Tensor-product box mesh on `[0,x] x [0,y] (x [0,z])`: each grid quad is
/// split into two triangles, each grid hex into six tetrahedra around its
/// main diagonal.
pub fn build_box(
    comm: Arc<dyn Comm>,
    x: f64,
    y: f64,
    z: f64,
    nx: usize,
    ny: usize,
    nz: usize,
) -> Result<Mesh, MeshAdaptError> {
    if nz == 0 {
        build_box_2d(comm, x, y, nx, ny)
    } else {
        build_box_3d(comm, x, y, z, nx, ny, nz)
    }
}

fn build_box_2d(
    comm: Arc<dyn Comm>,
    x: f64,
    y: f64,
    nx: usize,
    ny: usize,
) -> Result<Mesh, MeshAdaptError> {
    assert!(nx > 0 && ny > 0);
    let nvx = nx + 1;
    let mut coords = Vec::with_capacity(nvx * (ny + 1) * 2);
    for iy in 0..=ny {
        for ix in 0..=nx {
            coords.push(ix as f64 * x / nx as f64);
            coords.push(iy as f64 * y / ny as f64);
        }
    }
    let vert = |ix: usize, iy: usize| (iy * nvx + ix) as u32;
    let mut ev2v = Vec::with_capacity(nx * ny * 6);
    for iy in 0..ny {
        for ix in 0..nx {
            let a = vert(ix, iy);
            let b = vert(ix + 1, iy);
            let c = vert(ix, iy + 1);
            let d = vert(ix + 1, iy + 1);
            ev2v.extend_from_slice(&[a, b, d]);
            ev2v.extend_from_slice(&[d, c, a]);
        }
    }
    build_from_elems_and_coords(comm, 2, ev2v, coords)
}

/// Corner-local tet split of a hex `[a,b,c,d,e,f,g,h]` (bits x,y,z) around
/// the diagonal from corner 0 to corner 7.
const HEX_TETS: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 3, 2, 7],
    [0, 2, 6, 7],
    [0, 6, 4, 7],
    [0, 4, 5, 7],
    [0, 5, 1, 7],
];

fn build_box_3d(
    comm: Arc<dyn Comm>,
    x: f64,
    y: f64,
    z: f64,
    nx: usize,
    ny: usize,
    nz: usize,
) -> Result<Mesh, MeshAdaptError> {
    assert!(nx > 0 && ny > 0 && nz > 0);
    let nvx = nx + 1;
    let nvy = ny + 1;
    let mut coords = Vec::with_capacity(nvx * nvy * (nz + 1) * 3);
    for iz in 0..=nz {
        for iy in 0..=ny {
            for ix in 0..=nx {
                coords.push(ix as f64 * x / nx as f64);
                coords.push(iy as f64 * y / ny as f64);
                coords.push(iz as f64 * z / nz as f64);
            }
        }
    }
    let vert = |ix: usize, iy: usize, iz: usize| ((iz * nvy + iy) * nvx + ix) as u32;
    let mut ev2v = Vec::with_capacity(nx * ny * nz * 24);
    for iz in 0..nz {
        for iy in 0..ny {
            for ix in 0..nx {
                let corner = |bits: usize| {
                    vert(ix + (bits & 1), iy + ((bits >> 1) & 1), iz + ((bits >> 2) & 1))
                };
                for tet in &HEX_TETS {
                    for &c in tet {
                        ev2v.push(corner(c));
                    }
                }
            }
        }
    }
    build_from_elems_and_coords(comm, 3, ev2v, coords)
}

/// Classify a box mesh onto its geometric model: an entity's model
/// dimension is the box dimension minus the number of coordinate planes it
/// lies in, and its model ID packs which planes those are.
pub fn classify_box(mesh: &mut Mesh) -> Result<(), MeshAdaptError> {
    let dim = mesh.dim();
    let coords = mesh.coords().to_vec();
    let (lo, hi) = hilbert::bounding_box(&coords, dim);
    let tol = 1e-10;
    // per vertex: bit c set when on the low plane of axis c, bit c+3 for high
    let vert_planes: Vec<u8> = (0..mesh.nverts())
        .map(|v| {
            let mut planes = 0u8;
            for c in 0..dim {
                let xc = coords[v * dim + c];
                if (xc - lo[c]).abs() <= tol {
                    planes |= 1 << c;
                }
                if (xc - hi[c]).abs() <= tol {
                    planes |= 1 << (c + 3);
                }
            }
            planes
        })
        .collect();
    for k in 0..=dim {
        let n = mesh.nents(k);
        let mut class_dim = Vec::with_capacity(n);
        let mut class_id = Vec::with_capacity(n);
        for e in 0..n {
            let planes = if k == 0 {
                vert_planes[e]
            } else {
                let deg = ndown_of(k);
                let verts = &mesh.ask_verts_of(k)[e * deg..(e + 1) * deg];
                verts
                    .iter()
                    .fold(0x3f_u8, |acc, &v| acc & vert_planes[v as usize])
            };
            class_dim.push(dim as u8 - planes.count_ones().min(dim as u32) as u8);
            class_id.push(i32::from(planes));
        }
        if mesh.has_tag(k, CLASS_DIM) {
            mesh.set_tag_data(k, CLASS_DIM, TagData::U8(class_dim))?;
            mesh.set_tag_data(k, CLASS_ID, TagData::I32(class_id))?;
        } else {
            mesh.add_tag(
                k,
                CLASS_DIM,
                1,
                TransferPolicy::Inherit,
                false,
                TagData::U8(class_dim),
            )?;
            mesh.add_tag(
                k,
                CLASS_ID,
                1,
                TransferPolicy::Inherit,
                false,
                TagData::I32(class_id),
            )?;
        }
    }
    Ok(())
}

/// Renumber every dimension along the Hilbert curve of the vertex
/// coordinates; tags, globals, and connectivity follow the permutation.
pub fn reorder(mesh: &Mesh) -> Result<Mesh, MeshAdaptError> {
    let dim = mesh.dim();
    let coords = mesh.coords();
    let keys = hilbert::keys_from_coords(coords, dim);
    // new2old vertex order along the curve, then old->new for remapping
    let new2old_verts = sort_by_keys(&keys, dim);
    let old2new_verts = crate::arrays::invert_injective_map(&new2old_verts, mesh.nverts());
    let mut down_verts = Vec::with_capacity(dim);
    let mut perms = vec![new2old_verts.clone()];
    for k in 1..=dim {
        let deg = ndown_of(k);
        let remapped = map(mesh.ask_verts_of(k), &old2new_verts, 1);
        // order entities by their sorted new vertex tuples
        let n = mesh.nents(k);
        let mut sort_keys = Vec::with_capacity(n * deg);
        for e in 0..n {
            let mut tuple: Vec<u32> = remapped[e * deg..(e + 1) * deg].to_vec();
            tuple.sort_unstable();
            sort_keys.extend_from_slice(&tuple);
        }
        let new2old = sort_by_keys(&sort_keys, deg);
        let mut dv = Vec::with_capacity(n * deg);
        for &e in &new2old {
            dv.extend_from_slice(&remapped[e as usize * deg..(e as usize + 1) * deg]);
        }
        down_verts.push(dv);
        perms.push(new2old);
    }
    let mut out = Mesh::from_down_verts(mesh.comm().clone(), dim, mesh.nverts(), down_verts)?;
    for k in 0..=dim {
        let new2old = &perms[k];
        out.set_globals(k, map(new2old, mesh.globals(k), 1));
        for tag in mesh.tags(k) {
            let data = match &tag.data {
                TagData::U8(v) => TagData::U8(map(new2old, v, tag.ncomps)),
                TagData::I32(v) => TagData::I32(map(new2old, v, tag.ncomps)),
                TagData::I64(v) => TagData::I64(map(new2old, v, tag.ncomps)),
                TagData::F64(v) => TagData::F64(map(new2old, v, tag.ncomps)),
            };
            out.add_tag(k, &tag.name, tag.ncomps, tag.transfer, tag.output, data)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::TET;

    fn serial() -> Arc<dyn Comm> {
        Arc::new(SerialComm)
    }

    #[test]
    fn single_triangle_adjacencies() {
        let mesh = build_from_elems2verts(serial(), 2, vec![0, 1, 2], 3).unwrap();
        assert_eq!(mesh.ask_down(TRI, VERT).ab2b, vec![0, 1, 2]);
        assert_eq!(mesh.ask_down(TRI, EDGE).ab2b, vec![0, 2, 1]);
        assert_eq!(mesh.ask_down(EDGE, VERT).ab2b, vec![0, 1, 0, 2, 1, 2]);
    }

    #[test]
    fn single_tet_has_six_edges_four_faces() {
        let mesh = build_from_elems2verts(serial(), 3, vec![0, 1, 2, 3], 4).unwrap();
        assert_eq!(mesh.ask_down(TET, VERT).ab2b, vec![0, 1, 2, 3]);
        assert_eq!(mesh.nedges(), 6);
        assert_eq!(mesh.nents(TRI), 4);
    }

    #[test]
    fn vert_star_of_triangle_and_tet() {
        let mesh = build_from_elems2verts(serial(), 2, vec![0, 1, 2], 3).unwrap();
        let v2v = mesh.ask_star(VERT);
        assert_eq!(v2v.a2ab, vec![0, 2, 4, 6]);
        assert_eq!(v2v.ab2b, vec![1, 2, 0, 2, 0, 1]);
        let mesh = build_from_elems2verts(serial(), 3, vec![0, 1, 2, 3], 4).unwrap();
        let v2v = mesh.ask_star(VERT);
        assert_eq!(v2v.a2ab, vec![0, 3, 6, 9, 12]);
        assert_eq!(v2v.ab2b, vec![1, 2, 3, 0, 2, 3, 0, 1, 3, 0, 1, 2]);
    }

    #[test]
    fn dual_of_unit_box() {
        let mesh = build_box(serial(), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        let dual = mesh.ask_dual();
        assert_eq!(dual.a2ab, vec![0, 1, 2]);
        assert_eq!(dual.ab2b, vec![1, 0]);
    }

    #[test]
    fn unit_box_edges() {
        let mesh = build_box(serial(), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        assert_eq!(mesh.nverts(), 4);
        assert_eq!(mesh.nedges(), 5);
        assert_eq!(mesh.nelems(), 2);
        // edges in canonical order; edge 2 is the diagonal
        assert_eq!(
            mesh.ask_verts_of(EDGE),
            &[0, 1, 0, 2, 0, 3, 1, 3, 2, 3]
        );
        assert_eq!(mesh.ask_verts_of(TRI), &[0, 1, 3, 3, 2, 0]);
    }

    #[test]
    fn up_adjacency_is_inverse_of_down() {
        let mesh = build_box(serial(), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        let down = mesh.ask_down(TRI, EDGE);
        let up = mesh.ask_up(EDGE, TRI);
        for e in 0..mesh.nedges() {
            let lo = up.a2ab[e] as usize;
            let hi = up.a2ab[e + 1] as usize;
            for ab in lo..hi {
                let t = up.ab2b[ab] as usize;
                let slot = crate::topology::code_which_down(up.codes[ab]) as usize;
                assert_eq!(down.ab2b[t * 3 + slot], e as u32);
            }
        }
    }

    #[test]
    fn unit_cube_counts() {
        let mesh = build_box(serial(), 1.0, 1.0, 1.0, 1, 1, 1).unwrap();
        assert_eq!(mesh.nverts(), 8);
        assert_eq!(mesh.nelems(), 6);
        assert_eq!(mesh.nedges(), 19);
        assert_eq!(mesh.nents(TRI), 18);
        // edge 6 is the main diagonal
        assert_eq!(&mesh.ask_verts_of(EDGE)[12..14], &[0, 7]);
    }

    #[test]
    fn box_classification() {
        let mut mesh = build_box(serial(), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        classify_box(&mut mesh).unwrap();
        // all four vertices are model corners
        assert_eq!(mesh.get_array_u8(VERT, CLASS_DIM).unwrap(), &[0, 0, 0, 0]);
        // boundary edges classify onto model edges, the diagonal is interior
        assert_eq!(
            mesh.get_array_u8(EDGE, CLASS_DIM).unwrap(),
            &[1, 1, 2, 1, 1]
        );
        assert_eq!(mesh.get_array_u8(TRI, CLASS_DIM).unwrap(), &[2, 2]);
    }

    #[test]
    fn reorder_preserves_structure() {
        let mesh = build_box(serial(), 1.0, 1.0, 0.0, 2, 2, 0).unwrap();
        let reordered = reorder(&mesh).unwrap();
        assert_eq!(reordered.nverts(), mesh.nverts());
        assert_eq!(reordered.nedges(), mesh.nedges());
        assert_eq!(reordered.nelems(), mesh.nelems());
        // connectivity still refers to the same coordinates
        let c = reordered.coords();
        let deg = 3;
        for t in 0..reordered.nelems() {
            let verts = &reordered.ask_verts_of(2)[t * deg..(t + 1) * deg];
            let mut area = 0.0;
            let a = [c[verts[0] as usize * 2], c[verts[0] as usize * 2 + 1]];
            let b = [c[verts[1] as usize * 2], c[verts[1] as usize * 2 + 1]];
            let d = [c[verts[2] as usize * 2], c[verts[2] as usize * 2 + 1]];
            area += (b[0] - a[0]) * (d[1] - a[1]) - (b[1] - a[1]) * (d[0] - a[0]);
            assert!(area > 0.0, "element {t} inverted by reordering");
        }
    }
}
