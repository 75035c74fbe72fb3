//! Cavity-based mesh adaptation.
//!
//! One pass marks candidate keys, checks classification and overshoot,
//! scores cavity quality, chooses a deterministic independent set, and
//! atomically rewrites the selected cavities. Coarsening, refinement, and
//! swapping all funnel through the same modify kernel.

pub mod coarsen;
pub mod collapse;
pub mod indset;
pub mod mark;
pub mod modify;
pub mod refine;
pub mod swap2d;
pub mod swap3d;
pub mod transfer;

use crate::error::MeshAdaptError;
use crate::mesh::Mesh;

pub use coarsen::{coarsen_by_size, coarsen_slivers};
pub use indset::{find_indset, find_indset_with_graph};
pub use refine::{refine_by_size, refine_qualities};
pub use swap2d::{swap2d_qualities, swap2d_topology, swap_edges_2d};
pub use swap3d::{choose_triangulation, find_loop, swap_edges_3d};

/// Knobs of one adaptation pass, in metric edge-length units.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AdaptOpts {
    /// Edges shorter than this are coarsening candidates.
    pub min_length_desired: f64,
    /// Edges at least this long are refinement candidates, and collapses
    /// may not create edges reaching it.
    pub max_length_desired: f64,
    /// No operator may leave a cavity below this quality.
    pub min_quality_allowed: f64,
    /// Elements below this quality trigger swapping and sliver
    /// coarsening.
    pub min_quality_desired: f64,
    /// Rings of elements around slivers that join sliver coarsening.
    pub nsliver_layers: usize,
    /// Upper bound on outer passes of [`adapt`].
    pub max_passes: usize,
}

impl Default for AdaptOpts {
    fn default() -> Self {
        AdaptOpts {
            min_length_desired: 1.0 / 2.0_f64.sqrt(),
            max_length_desired: 2.0_f64.sqrt(),
            min_quality_allowed: 0.20,
            min_quality_desired: 0.30,
            nsliver_layers: 4,
            max_passes: 10,
        }
    }
}

/// Swap dispatch over the mesh dimension.
pub fn swap_edges(mesh: &mut Mesh, opts: &AdaptOpts) -> Result<bool, MeshAdaptError> {
    match mesh.dim() {
        2 => swap_edges_2d(mesh, opts),
        3 => swap_edges_3d(mesh, opts),
        d => Err(MeshAdaptError::UnsupportedDimension(d as u8)),
    }
}

/// Run coarsen/refine/swap passes until every operator reports nothing
/// left to do (or the pass cap is hit). Returns whether the mesh changed.
pub fn adapt(mesh: &mut Mesh, opts: &AdaptOpts) -> Result<bool, MeshAdaptError> {
    let mut changed = false;
    for _ in 0..opts.max_passes {
        let mut pass_changed = false;
        pass_changed |= coarsen_by_size(mesh, opts)?;
        pass_changed |= refine_by_size(mesh, opts)?;
        pass_changed |= swap_edges(mesh, opts)?;
        if crate::quality::min_fixable_quality(mesh) < opts.min_quality_desired {
            pass_changed |= coarsen_slivers(mesh, opts)?;
        }
        if !pass_changed {
            break;
        }
        changed = true;
    }
    Ok(changed)
}
