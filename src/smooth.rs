//! Laplacian smoothing of vertex fields.

use crate::adapt::mark::mark_by_class_dim;
use crate::arrays::{collect_marked, invert_marks, map, map_into};
use crate::mesh::{Mesh, VERT};
use crate::numerics::are_close_arrays;

/// Convergence report for [`solve_laplacian`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SmoothStats {
    pub niters: usize,
}

fn graph_average(mesh: &Mesh, state: &[f64], width: usize) -> Vec<f64> {
    let star = mesh.ask_star(VERT);
    let mut out = vec![0.0; state.len()];
    for v in 0..mesh.nverts() {
        let row = star.row(v as u32);
        if row.is_empty() {
            out[v * width..(v + 1) * width].copy_from_slice(&state[v * width..(v + 1) * width]);
            continue;
        }
        for &n in row {
            for c in 0..width {
                out[v * width + c] += state[n as usize * width + c];
            }
        }
        let inv = 1.0 / row.len() as f64;
        for c in 0..width {
            out[v * width + c] *= inv;
        }
    }
    out
}

/// Jacobi iteration of star averages with boundary-classified vertices
/// pinned to their initial values; runs until all ranks agree the field
/// stopped moving.
pub fn solve_laplacian(
    mesh: &Mesh,
    initial: &[f64],
    width: usize,
    tol: f64,
    floor: f64,
) -> (Vec<f64>, SmoothStats) {
    assert_eq!(initial.len(), mesh.nverts() * width);
    let comm = mesh.comm().clone();
    let interior = mark_by_class_dim(mesh, VERT, mesh.dim() as u8);
    let boundary = invert_marks(&interior);
    let b2v = collect_marked(&boundary);
    let bc_data = map(&b2v, initial, width);
    let mut state = initial.to_vec();
    let mut niters = 0;
    loop {
        let mut next = graph_average(mesh, &state, width);
        map_into(&bc_data, &b2v, &mut next, width);
        let next = mesh.sync_array(VERT, &next, width);
        let done = are_close_arrays(&state, &next, tol, floor);
        state = next;
        niters += 1;
        if comm.reduce_and(done) {
            return (state, SmoothStats { niters });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::build::{build_box, classify_box};
    use std::sync::Arc;

    #[test]
    fn boundary_values_harmonically_fill_the_interior() {
        let mut mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 4, 4, 0).unwrap();
        classify_box(&mut mesh).unwrap();
        // boundary carries x, the interior starts at zero; the harmonic
        // extension of x is x itself
        let coords = mesh.coords().to_vec();
        let interior = mark_by_class_dim(&mesh, VERT, 2);
        let initial: Vec<f64> = (0..mesh.nverts())
            .map(|v| if interior[v] != 0 { 0.0 } else { coords[v * 2] })
            .collect();
        let (solved, stats) = solve_laplacian(&mesh, &initial, 1, 1e-10, 1e-10);
        assert!(stats.niters > 1);
        for (v, &x) in solved.iter().enumerate() {
            assert!(
                (x - coords[v * 2]).abs() < 1e-6,
                "vertex {v}: {x} vs {}",
                coords[v * 2]
            );
        }
    }

    #[test]
    fn constant_fields_converge_immediately() {
        let mut mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 2, 2, 0).unwrap();
        classify_box(&mut mesh).unwrap();
        let initial = vec![3.5; mesh.nverts()];
        let (solved, stats) = solve_laplacian(&mesh, &initial, 1, 1e-12, 1e-12);
        assert_eq!(stats.niters, 1);
        assert_eq!(solved, initial);
    }
}
