//! Named per-entity data arrays.

use crate::error::MeshAdaptError;

/// How a tag moves through cavity rewrites.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransferPolicy {
    /// Leave behind; rebuilt by whoever owns the concern.
    None,
    /// Products copy the value of the entity they replace or subdivide.
    Inherit,
    /// Linear interpolation at new vertices.
    Linear,
    /// Log-Euclidean interpolation at new vertices (SPD tensors).
    Metric,
    /// Redistribute so the integral over each cavity is preserved.
    Conserve,
    /// Velocity carrying momentum; interpolated linearly, conserved by the
    /// outer solver.
    MomentumVelocity,
}

/// Typed storage of one tag.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TagData {
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F64(Vec<f64>),
}

impl TagData {
    pub fn len(&self) -> usize {
        match self {
            TagData::U8(v) => v.len(),
            TagData::I32(v) => v.len(),
            TagData::I64(v) => v.len(),
            TagData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named array attached to one entity dimension.
///
/// Invariant: `data.len() == nents * ncomps` for the dimension it lives on;
/// checked on insertion and after every rewrite.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tag {
    pub name: String,
    pub ncomps: usize,
    pub transfer: TransferPolicy,
    pub output: bool,
    pub data: TagData,
}

impl Tag {
    pub fn new(
        name: &str,
        ncomps: usize,
        transfer: TransferPolicy,
        output: bool,
        data: TagData,
        nents: usize,
    ) -> Result<Self, MeshAdaptError> {
        if data.len() != nents * ncomps {
            return Err(MeshAdaptError::TagLengthMismatch {
                name: name.to_owned(),
                len: data.len(),
                nents,
                ncomps,
            });
        }
        Ok(Tag {
            name: name.to_owned(),
            ncomps,
            transfer,
            output,
            data,
        })
    }
}
