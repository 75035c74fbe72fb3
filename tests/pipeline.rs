//! Adapt-then-serialize pipelines.

use std::sync::Arc;

use mesh_adapt::adapt::AdaptOpts;
use mesh_adapt::io::{file, vtk};
use mesh_adapt::mesh::{meshes_are_equal, SIZE};
use mesh_adapt::prelude::*;
use mesh_adapt::smooth::solve_laplacian;

fn serial() -> Arc<dyn Comm> {
    Arc::new(SerialComm)
}

#[test]
fn adapted_meshes_roundtrip_through_the_binary_format() {
    let mut mesh = build_box(serial(), 1.0, 1.0, 0.0, 3, 3, 0).unwrap();
    classify_box(&mut mesh).unwrap();
    let v2h = vec![0.6; mesh.nverts()];
    mesh.add_tag(VERT, SIZE, 1, TransferPolicy::Linear, true, TagData::F64(v2h))
        .unwrap();
    adapt(&mut mesh, &AdaptOpts::default()).unwrap();
    let mut buf = Vec::new();
    file::write_mesh(&mut buf, &mesh).unwrap();
    let back = file::read_mesh(&mut std::io::Cursor::new(buf), serial()).unwrap();
    assert!(meshes_are_equal(&mesh, &back));
}

#[test]
fn adapted_meshes_write_valid_vtu() {
    let mut mesh = build_box(serial(), 1.0, 1.0, 0.0, 2, 2, 0).unwrap();
    classify_box(&mut mesh).unwrap();
    let opts = AdaptOpts {
        max_length_desired: 0.45,
        ..AdaptOpts::default()
    };
    adapt(&mut mesh, &opts).unwrap();
    let mut buf = Vec::new();
    vtk::write_vtu(&mut buf, &mesh).unwrap();
    let back = vtk::read_vtu(std::io::Cursor::new(buf), serial()).unwrap();
    assert_eq!(back.nverts(), mesh.nverts());
    assert_eq!(back.nelems(), mesh.nelems());
    for q in measure_qualities(&back) {
        assert!(q > 0.0);
    }
}

#[test]
fn hilbert_reordering_before_adaptation() {
    let mesh = build_box(serial(), 1.0, 1.0, 0.0, 4, 4, 0).unwrap();
    let mut mesh = reorder(&mesh).unwrap();
    classify_box(&mut mesh).unwrap();
    let opts = AdaptOpts {
        max_length_desired: 0.3,
        ..AdaptOpts::default()
    };
    assert!(adapt(&mut mesh, &opts).unwrap());
    for q in measure_qualities(&mesh) {
        assert!(q > 0.0);
    }
}

#[test]
fn smoothing_an_adapted_field() {
    let mut mesh = build_box(serial(), 1.0, 1.0, 0.0, 3, 3, 0).unwrap();
    classify_box(&mut mesh).unwrap();
    let field: Vec<f64> = (0..mesh.nverts())
        .map(|v| mesh.coords()[v * 2] * 2.0 - 1.0)
        .collect();
    mesh.add_tag(VERT, "potential", 1, TransferPolicy::Linear, true, TagData::F64(field))
        .unwrap();
    let opts = AdaptOpts {
        max_length_desired: 0.4,
        ..AdaptOpts::default()
    };
    adapt(&mut mesh, &opts).unwrap();
    // the transferred field is still vertex-sized and can be smoothed
    let field = mesh.get_array_f64(VERT, "potential").unwrap().to_vec();
    assert_eq!(field.len(), mesh.nverts());
    let (smoothed, stats) = solve_laplacian(&mesh, &field, 1, 1e-8, 1e-8);
    assert!(stats.niters >= 1);
    assert_eq!(smoothed.len(), mesh.nverts());
}
