//! # mesh-adapt
//!
//! mesh-adapt is a distributed, data-parallel adaptation engine for
//! simplicial meshes (triangles in 2D, tetrahedra in 3D). Given an
//! existing mesh and a per-vertex size or anisotropic metric field, it
//! coarsens, refines, and swaps mesh cavities until element sizes and
//! shapes conform to the field, while preserving classification onto a
//! geometric model and the solution fields carried on mesh entities.
//!
//! ## Design
//! - One canonical relation per dimension (entity-to-vertex); every other
//!   adjacency derives on demand with per-slot alignment codes
//!   ([`topology`]).
//! - All transformations are compositions of flat-array bulk kernels:
//!   gather/scatter, prefix sums, key sorts, and map inversion
//!   ([`arrays`]); there is no per-element pointer chasing.
//! - The three operators (collapse, bisect, swap) pick deterministic
//!   independent sets of keys by `(quality, global ID)` and rewrite their
//!   cavities atomically through one shared modify kernel ([`adapt`]).
//! - Results are reproducible across partition counts: tie-breaks use
//!   global IDs and branch-feeding reductions go through the
//!   bit-reproducible sum ([`arrays::repro_sum`]).
//!
//! The MPI wrapper itself stays outside this crate; implement
//! [`dist::Comm`] to plug one in. Everything runs unchanged on the
//! bundled single-rank [`dist::SerialComm`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use mesh_adapt::prelude::*;
//!
//! # fn main() -> Result<(), mesh_adapt::MeshAdaptError> {
//! let comm: Arc<dyn Comm> = Arc::new(SerialComm);
//! let mut mesh = build_box(comm, 1.0, 1.0, 0.0, 4, 4, 0)?;
//! classify_box(&mut mesh)?;
//! let opts = AdaptOpts {
//!     min_length_desired: 0.3,
//!     ..AdaptOpts::default()
//! };
//! adapt(&mut mesh, &opts)?;
//! # Ok(())
//! # }
//! ```

pub mod adapt;
pub mod arrays;
pub mod dist;
pub mod error;
pub mod hilbert;
pub mod io;
pub mod mesh;
pub mod metric;
pub mod numerics;
pub mod quality;
pub mod size;
pub mod smooth;
pub mod topology;

pub use error::MeshAdaptError;

/// The most-used types and entry points.
pub mod prelude {
    pub use crate::adapt::{adapt, coarsen_by_size, refine_by_size, swap_edges, AdaptOpts};
    pub use crate::dist::{Comm, Remotes, SerialComm};
    pub use crate::error::MeshAdaptError;
    pub use crate::mesh::build::{
        build_box, build_from_elems2verts, build_from_elems_and_coords, classify_box, reorder,
    };
    pub use crate::mesh::{Mesh, Tag, TagData, TransferPolicy, EDGE, TET, TRI, VERT};
    pub use crate::metric::{limit_metric_gradation, metric_for_nelems_from_hessians};
    pub use crate::quality::measure_qualities;
    pub use crate::size::{find_implied_metric, find_implied_size, measure_edges};
}
