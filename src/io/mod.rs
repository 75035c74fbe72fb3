//! File interfaces: the binary mesh stream, the tag-level XML parser, and
//! the VTU subset.

pub mod file;
pub mod vtk;
pub mod xml;
