//! Canonical simplex orderings, alignment codes, and adjacency derivation.
//!
//! A mesh stores one canonical relation per dimension (entity-to-vertex);
//! every other adjacency is derived on demand from it. Derivation works on
//! flat index arrays only; orientation differences between an entity's
//! stored vertex order and its use inside a higher entity are packed into
//! one-byte alignment codes.

pub mod adjacency;
pub mod align;
pub mod simplex;

pub use adjacency::{
    edge_star, elements_across_sides, find_unique, invert_adj, reflect_down, vert_star, Adj,
};
pub use align::{
    align_adj, code_is_flipped, code_rotation, code_which_down, compound_alignments,
    invert_alignment, make_code, IDENTITY_CODE,
};
pub use simplex::{down_template, form_uses, ndown_of, nuses_of};
