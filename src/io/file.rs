//! The native binary mesh stream.
//!
//! Layout (all integers little-endian): magic, format version, dimension,
//! a compression flag, per-dimension entity counts, the entity-to-vertex
//! tables for each dimension above zero, per-dimension global IDs, and
//! the tag records. The compression flag is carried for format
//! compatibility and is always written clear; readers reject compressed
//! streams.

use std::io::{Read, Write};
use std::sync::Arc;

use crate::dist::Comm;
use crate::error::MeshAdaptError;
use crate::mesh::{Mesh, TagData, TransferPolicy};
use crate::topology::simplex::ndown_of;

const MAGIC: [u8; 4] = *b"madp";
const VERSION: u32 = 1;

fn write_u32<W: Write>(w: &mut W, x: u32) -> Result<(), MeshAdaptError> {
    w.write_all(&x.to_le_bytes())?;
    Ok(())
}

fn write_u64<W: Write>(w: &mut W, x: u64) -> Result<(), MeshAdaptError> {
    w.write_all(&x.to_le_bytes())?;
    Ok(())
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, MeshAdaptError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64, MeshAdaptError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_tag_data<W: Write>(w: &mut W, data: &TagData) -> Result<(), MeshAdaptError> {
    match data {
        TagData::U8(v) => {
            write_u32(w, 0)?;
            write_u64(w, v.len() as u64)?;
            w.write_all(v)?;
        }
        TagData::I32(v) => {
            write_u32(w, 1)?;
            write_u64(w, v.len() as u64)?;
            for &x in v {
                w.write_all(&x.to_le_bytes())?;
            }
        }
        TagData::I64(v) => {
            write_u32(w, 2)?;
            write_u64(w, v.len() as u64)?;
            for &x in v {
                w.write_all(&x.to_le_bytes())?;
            }
        }
        TagData::F64(v) => {
            write_u32(w, 3)?;
            write_u64(w, v.len() as u64)?;
            for &x in v {
                w.write_all(&x.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

fn read_tag_data<R: Read>(r: &mut R) -> Result<TagData, MeshAdaptError> {
    let type_tag = read_u32(r)?;
    let len = read_u64(r)? as usize;
    Ok(match type_tag {
        0 => {
            let mut v = vec![0u8; len];
            r.read_exact(&mut v)?;
            TagData::U8(v)
        }
        1 => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                let mut buf = [0u8; 4];
                r.read_exact(&mut buf)?;
                v.push(i32::from_le_bytes(buf));
            }
            TagData::I32(v)
        }
        2 => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                let mut buf = [0u8; 8];
                r.read_exact(&mut buf)?;
                v.push(i64::from_le_bytes(buf));
            }
            TagData::I64(v)
        }
        3 => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                let mut buf = [0u8; 8];
                r.read_exact(&mut buf)?;
                v.push(f64::from_le_bytes(buf));
            }
            TagData::F64(v)
        }
        t => return Err(MeshAdaptError::BadMeshFile(format!("unknown tag type {t}"))),
    })
}

fn transfer_to_byte(t: TransferPolicy) -> u8 {
    match t {
        TransferPolicy::None => 0,
        TransferPolicy::Inherit => 1,
        TransferPolicy::Linear => 2,
        TransferPolicy::Metric => 3,
        TransferPolicy::Conserve => 4,
        TransferPolicy::MomentumVelocity => 5,
    }
}

fn transfer_from_byte(b: u8) -> Result<TransferPolicy, MeshAdaptError> {
    Ok(match b {
        0 => TransferPolicy::None,
        1 => TransferPolicy::Inherit,
        2 => TransferPolicy::Linear,
        3 => TransferPolicy::Metric,
        4 => TransferPolicy::Conserve,
        5 => TransferPolicy::MomentumVelocity,
        t => {
            return Err(MeshAdaptError::BadMeshFile(format!(
                "unknown transfer policy {t}"
            )))
        }
    })
}

/// Serialize a mesh.
pub fn write_mesh<W: Write>(w: &mut W, mesh: &Mesh) -> Result<(), MeshAdaptError> {
    w.write_all(&MAGIC)?;
    write_u32(w, VERSION)?;
    write_u32(w, mesh.dim() as u32)?;
    w.write_all(&[0u8])?; // not compressed
    for k in 0..=mesh.dim() {
        write_u64(w, mesh.nents(k) as u64)?;
    }
    for k in 1..=mesh.dim() {
        for &v in mesh.ask_verts_of(k) {
            write_u32(w, v)?;
        }
    }
    for k in 0..=mesh.dim() {
        for &g in mesh.globals(k) {
            write_u64(w, g)?;
        }
    }
    for k in 0..=mesh.dim() {
        let tags = mesh.tags(k);
        write_u32(w, tags.len() as u32)?;
        for tag in tags {
            write_u32(w, tag.name.len() as u32)?;
            w.write_all(tag.name.as_bytes())?;
            write_u32(w, tag.ncomps as u32)?;
            w.write_all(&[transfer_to_byte(tag.transfer), u8::from(tag.output)])?;
            write_tag_data(w, &tag.data)?;
        }
    }
    Ok(())
}

/// Deserialize a mesh written by [`write_mesh`].
pub fn read_mesh<R: Read>(r: &mut R, comm: Arc<dyn Comm>) -> Result<Mesh, MeshAdaptError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(MeshAdaptError::BadMeshFile("bad magic".into()));
    }
    let version = read_u32(r)?;
    if version != VERSION {
        return Err(MeshAdaptError::BadMeshFile(format!(
            "unsupported version {version}"
        )));
    }
    let dim = read_u32(r)? as usize;
    let mut compressed = [0u8; 1];
    r.read_exact(&mut compressed)?;
    if compressed[0] != 0 {
        return Err(MeshAdaptError::BadMeshFile(
            "compressed streams are not supported".into(),
        ));
    }
    let mut counts = Vec::with_capacity(dim + 1);
    for _ in 0..=dim {
        counts.push(read_u64(r)? as usize);
    }
    let mut down_verts = Vec::with_capacity(dim);
    for k in 1..=dim {
        let len = counts[k] * ndown_of(k);
        let mut dv = Vec::with_capacity(len);
        for _ in 0..len {
            dv.push(read_u32(r)?);
        }
        down_verts.push(dv);
    }
    let mut mesh = Mesh::from_down_verts(comm, dim, counts[0], down_verts)?;
    for (k, &n) in counts.iter().enumerate() {
        let mut globals = Vec::with_capacity(n);
        for _ in 0..n {
            globals.push(read_u64(r)?);
        }
        mesh.set_globals(k, globals);
    }
    for k in 0..=dim {
        let ntags = read_u32(r)?;
        for _ in 0..ntags {
            let name_len = read_u32(r)? as usize;
            let mut name = vec![0u8; name_len];
            r.read_exact(&mut name)?;
            let name = String::from_utf8(name)
                .map_err(|_| MeshAdaptError::BadMeshFile("tag name is not utf-8".into()))?;
            let ncomps = read_u32(r)? as usize;
            let mut flags = [0u8; 2];
            r.read_exact(&mut flags)?;
            let transfer = transfer_from_byte(flags[0])?;
            let data = read_tag_data(r)?;
            mesh.add_tag(k, &name, ncomps, transfer, flags[1] != 0, data)?;
        }
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::SerialComm;
    use crate::mesh::build::{build_box, classify_box};
    use crate::mesh::meshes_are_equal;

    fn roundtrip(mesh: &Mesh) {
        let mut buf = Vec::new();
        write_mesh(&mut buf, mesh).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let back = read_mesh(&mut cursor, Arc::new(SerialComm)).unwrap();
        assert!(meshes_are_equal(mesh, &back));
    }

    #[test]
    fn box_meshes_roundtrip() {
        let mut mesh2 = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        classify_box(&mut mesh2).unwrap();
        roundtrip(&mesh2);
        let mesh3 = build_box(Arc::new(SerialComm), 1.0, 1.0, 1.0, 1, 1, 1).unwrap();
        roundtrip(&mesh3);
    }

    #[test]
    fn truncated_streams_error_out() {
        let mesh = build_box(Arc::new(SerialComm), 1.0, 1.0, 0.0, 1, 1, 0).unwrap();
        let mut buf = Vec::new();
        write_mesh(&mut buf, &mesh).unwrap();
        buf.truncate(buf.len() / 2);
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_mesh(&mut cursor, Arc::new(SerialComm)).is_err());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut cursor = std::io::Cursor::new(b"nope".to_vec());
        assert!(read_mesh(&mut cursor, Arc::new(SerialComm)).is_err());
    }
}
