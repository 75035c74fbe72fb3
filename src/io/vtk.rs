//! VTU (VTK unstructured grid XML) subset.
//!
//! Writes `<Piece>` with `<Points>`, `<Cells>` (connectivity, offsets,
//! types), `<PointData>`, and `<CellData>`, all as ascii data arrays; the
//! reader accepts the same subset. Points always carry three components.
//! Read-back tags keep their name and width but not their transfer
//! policy: point data becomes linearly interpolated, cell data is left
//! untransferred.

use std::io::{BufRead, Write};
use std::sync::Arc;

use crate::dist::Comm;
use crate::error::MeshAdaptError;
use crate::mesh::build::build_from_elems_and_coords;
use crate::mesh::{Mesh, TagData, TransferPolicy, COORDS, VERT};
use crate::topology::simplex::ndown_of;

use super::xml::{parse_tag, XmlTagType};

const VTK_TRIANGLE: u8 = 5;
const VTK_TETRA: u8 = 10;

fn write_f64s<W: Write>(w: &mut W, values: impl Iterator<Item = f64>) -> std::io::Result<()> {
    let mut first = true;
    for v in values {
        if !first {
            write!(w, " ")?;
        }
        write!(w, "{v:?}")?;
        first = false;
    }
    writeln!(w)
}

fn write_ints<W: Write, T: std::fmt::Display>(
    w: &mut W,
    values: impl Iterator<Item = T>,
) -> std::io::Result<()> {
    let mut first = true;
    for v in values {
        if !first {
            write!(w, " ")?;
        }
        write!(w, "{v}")?;
        first = false;
    }
    writeln!(w)
}

/// Write a mesh (and its output-enabled float tags) as a VTU piece.
pub fn write_vtu<W: Write>(w: &mut W, mesh: &Mesh) -> Result<(), MeshAdaptError> {
    let dim = mesh.dim();
    let deg = ndown_of(dim);
    let nverts = mesh.nverts();
    let nelems = mesh.nelems();
    writeln!(
        w,
        "<VTKFile type=\"UnstructuredGrid\" version=\"0.1\" byte_order=\"LittleEndian\">"
    )?;
    writeln!(w, "<UnstructuredGrid>")?;
    writeln!(
        w,
        "<Piece NumberOfPoints=\"{nverts}\" NumberOfCells=\"{nelems}\">"
    )?;
    writeln!(w, "<Points>")?;
    writeln!(
        w,
        "<DataArray type=\"Float64\" Name=\"{COORDS}\" NumberOfComponents=\"3\" format=\"ascii\">"
    )?;
    let coords = mesh.coords();
    write_f64s(
        w,
        (0..nverts).flat_map(|v| {
            (0..3).map(move |c| if c < dim { coords[v * dim + c] } else { 0.0 })
        }),
    )?;
    writeln!(w, "</DataArray>")?;
    writeln!(w, "</Points>")?;
    writeln!(w, "<Cells>")?;
    writeln!(
        w,
        "<DataArray type=\"Int32\" Name=\"connectivity\" format=\"ascii\">"
    )?;
    write_ints(w, mesh.ask_verts_of(dim).iter())?;
    writeln!(w, "</DataArray>")?;
    writeln!(w, "<DataArray type=\"Int32\" Name=\"offsets\" format=\"ascii\">")?;
    write_ints(w, (1..=nelems).map(|e| e * deg))?;
    writeln!(w, "</DataArray>")?;
    writeln!(w, "<DataArray type=\"UInt8\" Name=\"types\" format=\"ascii\">")?;
    let type_tag = if dim == 2 { VTK_TRIANGLE } else { VTK_TETRA };
    write_ints(w, std::iter::repeat(type_tag).take(nelems))?;
    writeln!(w, "</DataArray>")?;
    writeln!(w, "</Cells>")?;
    for (section, ent_dim) in [("PointData", VERT), ("CellData", dim)] {
        writeln!(w, "<{section}>")?;
        for tag in mesh.tags(ent_dim) {
            if !tag.output || tag.name == COORDS {
                continue;
            }
            if let TagData::F64(values) = &tag.data {
                writeln!(
                    w,
                    "<DataArray type=\"Float64\" Name=\"{}\" NumberOfComponents=\"{}\" format=\"ascii\">",
                    tag.name, tag.ncomps
                )?;
                write_f64s(w, values.iter().copied())?;
                writeln!(w, "</DataArray>")?;
            }
        }
        writeln!(w, "</{section}>")?;
    }
    writeln!(w, "</Piece>")?;
    writeln!(w, "</UnstructuredGrid>")?;
    writeln!(w, "</VTKFile>")?;
    Ok(())
}

#[derive(Default)]
struct ArrayInfo {
    name: String,
    ncomps: usize,
    section: String,
    text: String,
}

/// Read a mesh written by [`write_vtu`].
pub fn read_vtu<R: BufRead>(r: R, comm: Arc<dyn Comm>) -> Result<Mesh, MeshAdaptError> {
    let mut section = String::new();
    let mut current: Option<ArrayInfo> = None;
    let mut arrays: Vec<ArrayInfo> = Vec::new();
    for line in r.lines() {
        let line = line?;
        match parse_tag(&line) {
            Some(tag) => match (tag.tag_type, tag.elem_name.as_str()) {
                (XmlTagType::Start, "Points" | "Cells" | "PointData" | "CellData") => {
                    section = tag.elem_name;
                }
                (XmlTagType::Start, "DataArray") => {
                    current = Some(ArrayInfo {
                        name: tag.attribs.get("Name").cloned().unwrap_or_default(),
                        ncomps: tag
                            .attribs
                            .get("NumberOfComponents")
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(1),
                        section: section.clone(),
                        text: String::new(),
                    });
                }
                (XmlTagType::End, "DataArray") => {
                    if let Some(info) = current.take() {
                        arrays.push(info);
                    }
                }
                _ => {}
            },
            None => {
                if let Some(info) = current.as_mut() {
                    info.text.push(' ');
                    info.text.push_str(&line);
                }
            }
        }
    }
    let find = |section: &str, name: &str| -> Option<&ArrayInfo> {
        arrays
            .iter()
            .find(|a| a.section == section && (name.is_empty() || a.name == name))
    };
    let types = parse_numbers::<u8>(
        &find("Cells", "types")
            .ok_or_else(|| MeshAdaptError::BadVtu("missing cell types".into()))?
            .text,
    )?;
    let dim = match types.first() {
        Some(&VTK_TRIANGLE) => 2,
        Some(&VTK_TETRA) => 3,
        _ => return Err(MeshAdaptError::BadVtu("unsupported cell type".into())),
    };
    if types.iter().any(|&t| t != types[0]) {
        return Err(MeshAdaptError::BadVtu("mixed cell types".into()));
    }
    let connectivity = parse_numbers::<u32>(
        &find("Cells", "connectivity")
            .ok_or_else(|| MeshAdaptError::BadVtu("missing connectivity".into()))?
            .text,
    )?;
    let offsets = parse_numbers::<usize>(
        &find("Cells", "offsets")
            .ok_or_else(|| MeshAdaptError::BadVtu("missing offsets".into()))?
            .text,
    )?;
    let deg = ndown_of(dim);
    for (e, &off) in offsets.iter().enumerate() {
        if off != (e + 1) * deg {
            return Err(MeshAdaptError::BadVtu("non-simplicial offsets".into()));
        }
    }
    let points = parse_numbers::<f64>(
        &find("Points", "")
            .ok_or_else(|| MeshAdaptError::BadVtu("missing points".into()))?
            .text,
    )?;
    if points.len() % 3 != 0 {
        return Err(MeshAdaptError::BadVtu("points are not 3-component".into()));
    }
    let coords: Vec<f64> = points
        .chunks_exact(3)
        .flat_map(|p| p[..dim].to_vec())
        .collect();
    let mut mesh = build_from_elems_and_coords(comm, dim, connectivity, coords)?;
    for info in &arrays {
        let (ent_dim, policy) = match info.section.as_str() {
            "PointData" => (VERT, TransferPolicy::Linear),
            "CellData" => (dim, TransferPolicy::None),
            _ => continue,
        };
        let values = parse_numbers::<f64>(&info.text)?;
        mesh.add_tag(
            ent_dim,
            &info.name,
            info.ncomps,
            policy,
            true,
            TagData::F64(values),
        )?;
    }
    Ok(mesh)
}

fn parse_numbers<T: std::str::FromStr>(text: &str) -> Result<Vec<T>, MeshAdaptError> {
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<T>()
                .map_err(|_| MeshAdaptError::BadVtu(format!("bad number `{tok}`")))
        })
        .collect()
}
