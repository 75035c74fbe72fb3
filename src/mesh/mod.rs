//! The mesh object: canonical connectivity plus lazily derived adjacency.
//!
//! A `Mesh` stores, per dimension, the entity count, the entity-to-vertex
//! relation, global IDs, ownership, and tags. Intermediate and upward
//! adjacencies, stars, and the element dual are derived on first use and
//! memoized; they are never mutated in place, because operators replace
//! the whole mesh.

pub mod build;
pub mod tags;

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::arrays::Graph;
use crate::dist::{Comm, Dist, Remotes};
use crate::error::MeshAdaptError;
use crate::topology::{
    edge_star, elements_across_sides, invert_adj, reflect_down, vert_star, Adj,
};
use crate::topology::simplex::{ndown_of, nuses_of};

pub use tags::{Tag, TagData, TransferPolicy};

/// Entity dimensions.
pub const VERT: usize = 0;
pub const EDGE: usize = 1;
pub const TRI: usize = 2;
pub const TET: usize = 3;

/// Reserved tag names.
pub const COORDS: &str = "coordinates";
pub const METRIC: &str = "metric";
pub const SIZE: &str = "size";
pub const CLASS_DIM: &str = "class_dim";
pub const CLASS_ID: &str = "class_id";

#[derive(Clone, Default)]
struct EntData {
    n: usize,
    /// Entity-to-vertex relation, `n * (k+1)` entries; empty for vertices.
    down_verts: Vec<u32>,
    globals: Vec<u64>,
    owners: Remotes,
    tags: Vec<Tag>,
    down: [OnceCell<Adj>; 4],
    up: [OnceCell<Adj>; 4],
    star: OnceCell<Graph>,
    dual: OnceCell<Graph>,
}

/// An unstructured simplicial mesh of dimension 2 or 3.
#[derive(Clone)]
pub struct Mesh {
    dim: usize,
    comm: Arc<dyn Comm>,
    ents: Vec<EntData>,
}

impl Mesh {
    /// Construct from per-dimension entity-to-vertex tables; globals and
    /// ownership start as the serial identity.
    pub(crate) fn from_down_verts(
        comm: Arc<dyn Comm>,
        dim: usize,
        nverts: usize,
        down_verts: Vec<Vec<u32>>,
    ) -> Result<Self, MeshAdaptError> {
        if dim < 2 || dim > 3 {
            return Err(MeshAdaptError::UnsupportedDimension(dim as u8));
        }
        assert_eq!(down_verts.len(), dim);
        let rank = comm.rank();
        let mut ents = Vec::with_capacity(dim + 1);
        for k in 0..=dim {
            let dv = if k == 0 {
                Vec::new()
            } else {
                down_verts[k - 1].clone()
            };
            let n = if k == 0 {
                nverts
            } else {
                dv.len() / ndown_of(k)
            };
            let ent = EntData {
                n,
                globals: (0..n as u64).collect(),
                owners: Remotes::identity(rank, n),
                tags: Vec::new(),
                down_verts: dv,
                ..Default::default()
            };
            if k > 0 {
                ent.down[0]
                    .set(Adj::from_ab2b(ent.down_verts.clone()))
                    .unwrap();
            }
            ents.push(ent);
        }
        Ok(Mesh { dim, comm, ents })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn comm(&self) -> &Arc<dyn Comm> {
        &self.comm
    }

    pub fn nents(&self, dim: usize) -> usize {
        self.ents[dim].n
    }

    pub fn nverts(&self) -> usize {
        self.nents(VERT)
    }

    pub fn nedges(&self) -> usize {
        self.nents(EDGE)
    }

    pub fn nelems(&self) -> usize {
        self.nents(self.dim)
    }

    /// Entity-to-vertex indices of dimension `dim` entities.
    pub fn ask_verts_of(&self, dim: usize) -> &[u32] {
        &self.ents[dim].down_verts
    }

    /// Downward adjacency `from -> to`, derived and memoized.
    pub fn ask_down(&self, from: usize, to: usize) -> &Adj {
        assert!(to < from && from <= self.dim);
        self.ents[from].down[to].get_or_init(|| {
            reflect_down(
                &self.ents[from].down_verts,
                &self.ents[to].down_verts,
                self.nverts(),
                from,
                to,
            )
        })
    }

    /// Upward adjacency `from -> to`, the inverse of `ask_down(to, from)`.
    pub fn ask_up(&self, from: usize, to: usize) -> &Adj {
        assert!(from < to && to <= self.dim);
        self.ents[from].up[to].get_or_init(|| {
            let down = self.ask_down(to, from);
            invert_adj(
                down,
                nuses_of(to, from),
                ndown_of(from),
                self.nents(from),
                &self.ents[to].globals,
            )
        })
    }

    /// Second-order adjacency: vertices across edges, or entities across
    /// the elements containing them.
    pub fn ask_star(&self, dim: usize) -> &Graph {
        assert!(dim < self.dim);
        self.ents[dim].star.get_or_init(|| {
            if dim == VERT {
                vert_star(self.ask_verts_of(EDGE), self.nverts())
            } else {
                let up = self.ask_up(dim, self.dim).clone();
                edge_star(
                    &up,
                    &self.ask_down(self.dim, dim).ab2b,
                    nuses_of(self.dim, dim),
                    self.nents(dim),
                )
            }
        })
    }

    /// Element-to-element adjacency across shared sides.
    pub fn ask_dual(&self) -> &Graph {
        let dim = self.dim;
        self.ents[dim].dual.get_or_init(|| {
            let down = self.ask_down(dim, dim - 1).ab2b.clone();
            let up = self.ask_up(dim - 1, dim).clone();
            elements_across_sides(&down, &up, nuses_of(dim, dim - 1), self.nents(dim))
        })
    }

    /// Metric-aware length of every edge.
    pub fn ask_lengths(&self) -> Vec<f64> {
        crate::size::measure_edges(self)
    }

    /// Metric-aware quality of every element.
    pub fn ask_qualities(&self) -> Vec<f64> {
        crate::quality::measure_qualities(self)
    }

    pub fn globals(&self, dim: usize) -> &[u64] {
        &self.ents[dim].globals
    }

    pub(crate) fn set_globals(&mut self, dim: usize, globals: Vec<u64>) {
        assert_eq!(globals.len(), self.ents[dim].n);
        self.ents[dim].globals = globals;
    }

    pub fn owners(&self, dim: usize) -> &Remotes {
        &self.ents[dim].owners
    }

    pub(crate) fn set_owners(&mut self, dim: usize, owners: Remotes) {
        assert_eq!(owners.len(), self.ents[dim].n);
        self.ents[dim].owners = owners;
    }

    // ---- tags ----

    pub fn add_tag(
        &mut self,
        dim: usize,
        name: &str,
        ncomps: usize,
        transfer: TransferPolicy,
        output: bool,
        data: TagData,
    ) -> Result<(), MeshAdaptError> {
        if self.has_tag(dim, name) {
            return Err(MeshAdaptError::DuplicateTag {
                dim: dim as u8,
                name: name.to_owned(),
            });
        }
        let tag = Tag::new(name, ncomps, transfer, output, data, self.ents[dim].n)?;
        self.ents[dim].tags.push(tag);
        Ok(())
    }

    pub fn has_tag(&self, dim: usize, name: &str) -> bool {
        self.ents[dim].tags.iter().any(|t| t.name == name)
    }

    pub fn get_tag(&self, dim: usize, name: &str) -> Result<&Tag, MeshAdaptError> {
        self.ents[dim]
            .tags
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| MeshAdaptError::TagNotFound {
                dim: dim as u8,
                name: name.to_owned(),
            })
    }

    pub fn remove_tag(&mut self, dim: usize, name: &str) -> Result<Tag, MeshAdaptError> {
        let tags = &mut self.ents[dim].tags;
        match tags.iter().position(|t| t.name == name) {
            Some(at) => Ok(tags.remove(at)),
            None => Err(MeshAdaptError::TagNotFound {
                dim: dim as u8,
                name: name.to_owned(),
            }),
        }
    }

    /// Replace the data of an existing tag (same length contract).
    pub fn set_tag_data(
        &mut self,
        dim: usize,
        name: &str,
        data: TagData,
    ) -> Result<(), MeshAdaptError> {
        let n = self.ents[dim].n;
        let tag = self.ents[dim]
            .tags
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| MeshAdaptError::TagNotFound {
                dim: dim as u8,
                name: name.to_owned(),
            })?;
        if data.len() != n * tag.ncomps {
            return Err(MeshAdaptError::TagLengthMismatch {
                name: name.to_owned(),
                len: data.len(),
                nents: n,
                ncomps: tag.ncomps,
            });
        }
        tag.data = data;
        Ok(())
    }

    pub fn tags(&self, dim: usize) -> &[Tag] {
        &self.ents[dim].tags
    }

    pub fn get_array_f64(&self, dim: usize, name: &str) -> Result<&[f64], MeshAdaptError> {
        match &self.get_tag(dim, name)?.data {
            TagData::F64(v) => Ok(v),
            _ => Err(MeshAdaptError::TagTypeMismatch {
                name: name.to_owned(),
            }),
        }
    }

    pub fn get_array_u8(&self, dim: usize, name: &str) -> Result<&[u8], MeshAdaptError> {
        match &self.get_tag(dim, name)?.data {
            TagData::U8(v) => Ok(v),
            _ => Err(MeshAdaptError::TagTypeMismatch {
                name: name.to_owned(),
            }),
        }
    }

    pub fn get_array_i32(&self, dim: usize, name: &str) -> Result<&[i32], MeshAdaptError> {
        match &self.get_tag(dim, name)?.data {
            TagData::I32(v) => Ok(v),
            _ => Err(MeshAdaptError::TagTypeMismatch {
                name: name.to_owned(),
            }),
        }
    }

    /// Vertex coordinates, `dim` components per vertex.
    pub fn coords(&self) -> &[f64] {
        self.get_array_f64(VERT, COORDS)
            .expect("mesh carries no coordinates")
    }

    // ---- synchronization ----

    fn owners_dist(&self, dim: usize) -> Dist {
        Dist::new(
            self.comm.clone(),
            self.ents[dim].owners.clone(),
            self.ents[dim].n,
        )
    }

    /// Owner values broadcast over all copies.
    pub fn sync_array(&self, dim: usize, data: &[f64], width: usize) -> Vec<f64> {
        assert_eq!(data.len(), self.ents[dim].n * width);
        self.owners_dist(dim).bcast_f64(data, width)
    }

    /// Owner bytes broadcast over all copies (marks, codes).
    pub fn sync_u8_array(&self, dim: usize, data: &[u8], width: usize) -> Vec<u8> {
        assert_eq!(data.len(), self.ents[dim].n * width);
        self.owners_dist(dim).bcast_bytes(data, width)
    }

    /// Scatter subset values onto the full dimension, synchronize, and
    /// return the full array.
    pub fn sync_subset_u8_array(
        &self,
        dim: usize,
        subset_data: &[u8],
        subset2ents: &[u32],
        fill: u8,
    ) -> Vec<u8> {
        let full = crate::arrays::unmap(subset2ents, subset_data, self.ents[dim].n, fill, 1);
        self.sync_u8_array(dim, &full, 1)
    }
}

/// Structural equality for round-trip tests: same counts, connectivity,
/// globals, coordinates, and tags.
pub fn meshes_are_equal(a: &Mesh, b: &Mesh) -> bool {
    if a.dim() != b.dim() {
        return false;
    }
    for k in 0..=a.dim() {
        if a.nents(k) != b.nents(k)
            || a.ents[k].down_verts != b.ents[k].down_verts
            || a.globals(k) != b.globals(k)
            || a.tags(k) != b.tags(k)
        {
            return false;
        }
    }
    true
}
