//! Structural invariants that must hold after every operator.

use std::collections::HashSet;
use std::sync::Arc;

use mesh_adapt::adapt::{coarsen_by_size, refine_by_size, swap_edges, AdaptOpts};
use mesh_adapt::prelude::*;
use mesh_adapt::topology::simplex::{down_template, ndown_of, nuses_of};
use mesh_adapt::topology::{align_adj, code_which_down};

fn serial() -> Arc<dyn Comm> {
    Arc::new(SerialComm)
}

/// Check every invariant the data model promises: distinct downward
/// vertices, up/down inverse consistency through alignment codes, unique
/// globals, and tag length contracts.
fn check_invariants(mesh: &Mesh) {
    let dim = mesh.dim();
    for k in 1..=dim {
        let deg = ndown_of(k);
        let dv = mesh.ask_verts_of(k);
        for e in 0..mesh.nents(k) {
            let verts = &dv[e * deg..(e + 1) * deg];
            let set: HashSet<_> = verts.iter().collect();
            assert_eq!(set.len(), deg, "dim {k} entity {e} repeats a vertex");
        }
    }
    // every downward slot has exactly one inverse upward slot, and the
    // downward code maps the stored child onto the parent's use
    for high in 1..=dim {
        for low in 0..high {
            let nper = nuses_of(high, low);
            let child_deg = ndown_of(low);
            let down = mesh.ask_down(high, low);
            let up = mesh.ask_up(low, high);
            let lowv = mesh.ask_verts_of(low);
            let highv = mesh.ask_verts_of(high);
            for h in 0..mesh.nents(high) {
                for slot in 0..nper {
                    let child = down.ab2b[h * nper + slot] as usize;
                    if low > 0 {
                        let code = down.codes[h * nper + slot];
                        let stored = &lowv[child * child_deg..(child + 1) * child_deg];
                        let mut image = [0u32; 3];
                        align_adj(child_deg, code, stored, &mut image[..child_deg]);
                        let high_deg = ndown_of(high);
                        let parent = &highv[h * high_deg..(h + 1) * high_deg];
                        for wv in 0..child_deg {
                            let expect = parent[down_template(high, low, slot, wv)];
                            assert_eq!(
                                image[wv], expect,
                                "down code mismatch at dim {high}->{low} parent {h} slot {slot}"
                            );
                        }
                    }
                    let found = (up.a2ab[child] as usize..up.a2ab[child + 1] as usize)
                        .filter(|&ab| {
                            up.ab2b[ab] as usize == h
                                && code_which_down(up.codes[ab]) as usize == slot
                        })
                        .count();
                    assert_eq!(
                        found, 1,
                        "up/down inverse broken at dim {high}->{low} parent {h} slot {slot}"
                    );
                }
            }
        }
    }
    for k in 0..=dim {
        let globals = mesh.globals(k);
        let set: HashSet<_> = globals.iter().collect();
        assert_eq!(set.len(), globals.len(), "dim {k} repeats a global ID");
        for tag in mesh.tags(k) {
            assert_eq!(
                tag.data.len(),
                mesh.nents(k) * tag.ncomps,
                "tag {} has a broken length",
                tag.name
            );
        }
    }
}

#[test]
fn fresh_boxes_satisfy_the_invariants() {
    check_invariants(&build_box(serial(), 1.0, 1.0, 0.0, 1, 1, 0).unwrap());
    check_invariants(&build_box(serial(), 1.0, 1.0, 0.0, 3, 3, 0).unwrap());
    check_invariants(&build_box(serial(), 1.0, 1.0, 1.0, 1, 1, 1).unwrap());
    check_invariants(&build_box(serial(), 1.0, 1.0, 1.0, 2, 2, 2).unwrap());
}

#[test]
fn invariants_survive_refinement() {
    let mut mesh = build_box(serial(), 1.0, 1.0, 0.0, 2, 2, 0).unwrap();
    classify_box(&mut mesh).unwrap();
    let opts = AdaptOpts {
        max_length_desired: 0.3,
        ..AdaptOpts::default()
    };
    assert!(refine_by_size(&mut mesh, &opts).unwrap());
    check_invariants(&mesh);
    for q in measure_qualities(&mesh) {
        assert!(q > 0.0);
    }
}

#[test]
fn invariants_survive_refinement_3d() {
    let mut mesh = build_box(serial(), 1.0, 1.0, 1.0, 1, 1, 1).unwrap();
    classify_box(&mut mesh).unwrap();
    let opts = AdaptOpts {
        max_length_desired: 1.2,
        min_quality_allowed: 0.05,
        ..AdaptOpts::default()
    };
    assert!(refine_by_size(&mut mesh, &opts).unwrap());
    check_invariants(&mesh);
    for q in measure_qualities(&mesh) {
        assert!(q > 0.0);
    }
}

#[test]
fn invariants_survive_coarsening() {
    let mut mesh = build_box(serial(), 1.0, 1.0, 0.0, 4, 4, 0).unwrap();
    classify_box(&mut mesh).unwrap();
    let opts = AdaptOpts {
        min_length_desired: 0.6,
        max_length_desired: 10.0,
        ..AdaptOpts::default()
    };
    assert!(coarsen_by_size(&mut mesh, &opts).unwrap());
    check_invariants(&mesh);
    for q in measure_qualities(&mesh) {
        assert!(q > 0.0);
    }
}

#[test]
fn invariants_survive_swapping() {
    // squash one diagonal so the flipped configuration is strictly better
    let coords = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.4, 1.4];
    let mut mesh =
        build_from_elems_and_coords(serial(), 2, vec![0, 1, 3, 3, 2, 0], coords).unwrap();
    classify_box(&mut mesh).unwrap();
    let opts = AdaptOpts {
        min_quality_desired: 0.95,
        ..AdaptOpts::default()
    };
    let did = swap_edges(&mut mesh, &opts).unwrap();
    check_invariants(&mesh);
    assert!(did);
}

#[test]
fn full_adapt_keeps_the_mesh_consistent() {
    let mut mesh = build_box(serial(), 1.0, 1.0, 0.0, 3, 3, 0).unwrap();
    classify_box(&mut mesh).unwrap();
    let opts = AdaptOpts {
        min_length_desired: 0.2,
        max_length_desired: 0.55,
        ..AdaptOpts::default()
    };
    adapt(&mut mesh, &opts).unwrap();
    check_invariants(&mesh);
    for q in measure_qualities(&mesh) {
        assert!(q > 0.0);
    }
}
