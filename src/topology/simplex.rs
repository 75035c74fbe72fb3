//! Canonical down-templates of the simplices.

/// Template vertex of a sub-simplex: `down_template(high_dim, low_dim,
/// which_down, which_vert)`.
pub const fn down_template(
    high_dim: usize,
    low_dim: usize,
    which_down: usize,
    which_vert: usize,
) -> usize {
    const TRI_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
    const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
    const TET_FACES: [[usize; 3]; 4] = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
    match (high_dim, low_dim) {
        (_, 0) => which_down,
        (2, 1) => TRI_EDGES[which_down][which_vert],
        (3, 1) => TET_EDGES[which_down][which_vert],
        (3, 2) => TET_FACES[which_down][which_vert],
        _ => panic!("no down template for this dimension pair"),
    }
}

/// How many `low_dim` sub-simplices a `high_dim` simplex has.
pub const fn nuses_of(high_dim: usize, low_dim: usize) -> usize {
    match (high_dim, low_dim) {
        (_, 0) => high_dim + 1,
        (2, 1) => 3,
        (3, 1) => 6,
        (3, 2) => 4,
        _ => panic!("no down template for this dimension pair"),
    }
}

/// Vertices per `low_dim` simplex.
pub const fn ndown_of(low_dim: usize) -> usize {
    low_dim + 1
}

/// Materialize every `low_dim` sub-simplex of every high entity, in
/// template order: `nuses_of * ndown_of` vertices per high entity.
pub fn form_uses(hv2v: &[u32], high_dim: usize, low_dim: usize) -> Vec<u32> {
    let nhigh_verts = high_dim + 1;
    assert_eq!(hv2v.len() % nhigh_verts, 0);
    let nhigh = hv2v.len() / nhigh_verts;
    let nuses = nuses_of(high_dim, low_dim);
    let ndown = ndown_of(low_dim);
    let mut out = Vec::with_capacity(nhigh * nuses * ndown);
    for h in 0..nhigh {
        let verts = &hv2v[h * nhigh_verts..(h + 1) * nhigh_verts];
        for u in 0..nuses {
            for v in 0..ndown {
                out.push(verts[down_template(high_dim, low_dim, u, v)]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_edges() {
        assert_eq!(form_uses(&[0, 1, 2], 2, 1), vec![0, 1, 1, 2, 2, 0]);
    }

    #[test]
    fn tet_edges_and_faces() {
        assert_eq!(
            form_uses(&[0, 1, 2, 3], 3, 1),
            vec![0, 1, 1, 2, 2, 0, 0, 3, 1, 3, 2, 3]
        );
        assert_eq!(
            form_uses(&[0, 1, 2, 3], 3, 2),
            vec![0, 2, 1, 0, 1, 3, 1, 2, 3, 2, 0, 3]
        );
    }
}
