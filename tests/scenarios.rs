//! End-to-end scenarios with hand-checked expected values.

use std::sync::Arc;

use mesh_adapt::adapt::{choose_triangulation, find_loop, refine_qualities, swap2d_topology};
use mesh_adapt::arrays::{invert_fan, invert_funnel};
use mesh_adapt::dist::{globals_to_linear_owners, linear_partition_size};
use mesh_adapt::hilbert;
use mesh_adapt::numerics::{are_close, are_close_arrays};
use mesh_adapt::prelude::*;

fn serial() -> Arc<dyn Comm> {
    Arc::new(SerialComm)
}

/// Skilling's worked example: the 3D point (5, 10, 20) at 5 bits
/// interleaves to Hilbert integer 7865 and back.
#[test]
fn hilbert_round_trip() {
    let mut x = [5u64, 10, 20];
    hilbert::axes_to_transpose(&mut x, 5);
    let mut h = 0u64;
    for b in (0..5).rev() {
        for xi in &x {
            h = h << 1 | (xi >> b) & 1;
        }
    }
    assert_eq!(h, 7865);
    let mut back = x;
    hilbert::transpose_to_axes(&mut back, 5);
    assert_eq!(back, [5, 10, 20]);
}

#[test]
fn funnel_and_fan_invert_each_other() {
    assert_eq!(invert_funnel(&[0, 0, 1, 1, 2, 2], 3), vec![0, 2, 4, 6]);
    assert_eq!(invert_fan(&[0, 2, 4, 6]), vec![0, 0, 1, 1, 2, 2]);
}

/// Flipping the unit box's diagonal (edge 2) produces triangles (3,2,1)
/// and (0,1,2) and the edge (2,1).
#[test]
fn unit_box_swap_topology() {
    let mesh = build_box(serial(), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
    let (prod_edges, prod_tris) = swap2d_topology(&mesh, &[2]);
    assert_eq!(prod_edges, vec![2, 1]);
    assert_eq!(prod_tris, vec![3, 2, 1, 0, 1, 2]);
}

/// Seven globals over two ranks: sizes [4, 3], descending globals map to
/// the expected owners.
#[test]
fn linear_partitioning() {
    assert_eq!(linear_partition_size(7, 2, 0), 4);
    assert_eq!(linear_partition_size(7, 2, 1), 3);
    let remotes = globals_to_linear_owners(&[6, 5, 4, 3, 2, 1, 0], 7, 2);
    assert_eq!(remotes.ranks, vec![1, 1, 1, 0, 0, 0, 0]);
    assert_eq!(remotes.idxs, vec![2, 1, 0, 3, 2, 1, 0]);
}

/// Bisection qualities of every unit-box edge, with and without an
/// identity metric attached.
#[test]
fn unit_box_refine_qualities() {
    let mut mesh = build_box(serial(), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
    let cands: Vec<u32> = (0..mesh.nedges() as u32).collect();
    let quals = refine_qualities(&mesh, &cands);
    let expect = [0.494872, 0.494872, 0.866025, 0.494872, 0.494872];
    assert!(are_close_arrays(&quals, &expect, 1e-4, 1e-4), "{quals:?}");
    let nc = 3;
    let mut v2m = vec![0.0; mesh.nverts() * nc];
    for v in 0..mesh.nverts() {
        mesh_adapt::numerics::set_symm2(&mut v2m, v, mesh_adapt::numerics::identity_matrix());
    }
    mesh.add_tag(
        VERT,
        "metric",
        nc,
        TransferPolicy::Metric,
        true,
        TagData::F64(v2m),
    )
    .unwrap();
    let quals2 = refine_qualities(&mesh, &cands);
    assert!(are_close_arrays(&quals, &quals2, 1e-9, 1e-9));
}

/// The unit cube's main diagonal (edge 6) is surrounded by the six other
/// vertices; every re-triangulation of that ring contains a flat
/// tetrahedron, so the best achievable quality is zero.
#[test]
fn unit_cube_swap_loop_is_degenerate() {
    let mesh = build_box(serial(), 1.0, 1.0, 1.0, 1, 1, 1).unwrap();
    let ring = find_loop(&mesh, 6).expect("the diagonal is interior");
    assert_eq!(ring.eev2v, [0, 7]);
    assert_eq!(ring.verts.len(), 6);
    let mut sorted = ring.verts.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3, 4, 5, 6]);
    let choice = choose_triangulation(&mesh, &ring);
    assert!(are_close(choice.quality, 0.0), "got {}", choice.quality);
}

/// Two equal-magnitude terms forty orders apart survive the reproducible
/// sum exactly, in any order.
#[test]
fn reproducible_summation() {
    let big = f64::powi(2.0, 20);
    let small = f64::powi(2.0, -20);
    assert_eq!(mesh_adapt::arrays::repro_sum(&[big, small]), big + small);
    assert_eq!(
        mesh_adapt::arrays::repro_sum(&[small, big]),
        mesh_adapt::arrays::repro_sum(&[big, small])
    );
}
