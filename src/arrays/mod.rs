//! Bulk array primitives.
//!
//! Everything in this crate is written as compositions of the flat-array
//! operations in this module: gather/scatter, replication, prefix sums,
//! mark collection, stable key sorts, and map inversion. Local entity
//! indices are `u32`, global IDs `u64`, packed codes `u8`, and marks `u8`
//! (0 or 1).
//!
//! Size mismatches are programmer errors and panic; there is no runtime
//! error channel at this level.

mod invert;
mod ops;
mod reduce;
mod scan;
mod sort;

pub use invert::{
    invert_injective_map, invert_map_by_atomics, invert_map_by_sorting, Graph, INVALID,
};
pub use ops::{
    collect_marked, each_eq_to, each_geq, each_lt, each_neq_to, expand, land_each, lor_each,
    invert_marks, map, map_into, permute, unmap,
};
pub use reduce::{fan_reduce, fixed_sum, repro_sum, FixedSum, ReduceOp};
pub use scan::{invert_fan, invert_funnel, offset_scan};
pub use sort::sort_by_keys;
