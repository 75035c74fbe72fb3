//! Mark propagation between dimensions.

use crate::arrays::{collect_marked, lor_each};
use crate::mesh::{Mesh, CLASS_DIM};
use crate::topology::simplex::{ndown_of, nuses_of};

/// Push marks from `from_dim` entities down to `to_dim`: an entity is
/// marked when any marked higher entity contains it.
pub fn mark_down(mesh: &Mesh, from_dim: usize, to_dim: usize, marks: &[u8]) -> Vec<u8> {
    assert!(to_dim < from_dim);
    assert_eq!(marks.len(), mesh.nents(from_dim));
    let mut out = vec![0u8; mesh.nents(to_dim)];
    if to_dim == 0 {
        let deg = ndown_of(from_dim);
        let dv = mesh.ask_verts_of(from_dim);
        for (e, &m) in marks.iter().enumerate() {
            if m != 0 {
                for &v in &dv[e * deg..(e + 1) * deg] {
                    out[v as usize] = 1;
                }
            }
        }
    } else {
        let nper = nuses_of(from_dim, to_dim);
        let down = mesh.ask_down(from_dim, to_dim);
        for (e, &m) in marks.iter().enumerate() {
            if m != 0 {
                for &l in &down.ab2b[e * nper..(e + 1) * nper] {
                    out[l as usize] = 1;
                }
            }
        }
    }
    mesh.sync_u8_array(to_dim, &out, 1)
}

/// Pull marks from `from_dim` entities up to `to_dim`: an entity is marked
/// when any of its marked lower entities is.
pub fn mark_up(mesh: &Mesh, from_dim: usize, to_dim: usize, marks: &[u8]) -> Vec<u8> {
    assert!(from_dim < to_dim);
    assert_eq!(marks.len(), mesh.nents(from_dim));
    let up = mesh.ask_up(from_dim, to_dim);
    let mut out = vec![0u8; mesh.nents(to_dim)];
    for (l, &m) in marks.iter().enumerate() {
        if m != 0 {
            let lo = up.a2ab[l] as usize;
            let hi = up.a2ab[l + 1] as usize;
            for &e in &up.ab2b[lo..hi] {
                out[e as usize] = 1;
            }
        }
    }
    out
}

/// Sides adjacent to exactly one element (the mesh boundary).
pub fn mark_exposed_sides(mesh: &Mesh) -> Vec<u8> {
    let dim = mesh.dim();
    let up = mesh.ask_up(dim - 1, dim);
    (0..mesh.nents(dim - 1))
        .map(|s| u8::from(up.a2ab[s + 1] - up.a2ab[s] == 1))
        .collect()
}

/// Entities classified onto a model entity of the given dimension.
pub fn mark_by_class_dim(mesh: &Mesh, ent_dim: usize, class_dim: u8) -> Vec<u8> {
    match mesh.get_array_u8(ent_dim, CLASS_DIM) {
        Ok(cd) => cd.iter().map(|&c| u8::from(c == class_dim)).collect(),
        // unclassified meshes are treated as fully interior
        Err(_) => vec![u8::from(class_dim == mesh.dim() as u8); mesh.nents(ent_dim)],
    }
}

/// Elements below the quality floor, grown by `nlayers` rings of the dual
/// graph.
pub fn mark_sliver_layers(mesh: &Mesh, qual_floor: f64, nlayers: usize) -> Vec<u8> {
    let quals = crate::quality::measure_qualities(mesh);
    let mut marks: Vec<u8> = quals.iter().map(|&q| u8::from(q < qual_floor)).collect();
    let dual = mesh.ask_dual();
    for _ in 0..nlayers {
        let mut grown = marks.clone();
        for e in collect_marked(&marks) {
            for &n in dual.row(e) {
                grown[n as usize] = 1;
            }
        }
        marks = lor_each(&marks, &grown);
    }
    marks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::build::build_box;
    use crate::mesh::{TRI, VERT};
    use std::sync::Arc;

    #[test]
    fn marks_move_up_and_down() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        // marking the first triangle marks its three vertices
        assert_eq!(mark_down(&mesh, TRI, VERT, &[1, 0]), vec![1, 1, 0, 1]);
        // a mark on vertex 1 reaches only the first triangle
        assert_eq!(mark_up(&mesh, VERT, TRI, &[0, 1, 0, 0]), vec![1, 0]);
    }

    #[test]
    fn only_the_diagonal_is_unexposed() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        assert_eq!(mark_exposed_sides(&mesh), vec![1, 1, 0, 1, 1]);
    }
}
