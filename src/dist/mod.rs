//! Partitioning and communication.
//!
//! The [`Comm`](comm::Comm) trait is the seam an MPI wrapper implements;
//! the crate ships the single-rank [`SerialComm`](comm::SerialComm). All
//! higher layers (array synchronization, ownership updates, global
//! numbering) are written against [`Dist`](dist::Dist), a many-to-many
//! relation between two distributed index spaces.

pub mod comm;
#[allow(clippy::module_inception)]
pub mod dist;
pub mod linpart;
pub mod owners;
pub mod remotes;

pub use comm::{repro_sum_all, Comm, SerialComm};
pub use dist::Dist;
pub use linpart::{
    copies_to_linear_owners, find_total_globals, globals_to_linear_owners, linear_partition_size,
};
pub use owners::{globals_from_owners, reduce_data_to_owners, update_ownership};
pub use remotes::Remotes;
