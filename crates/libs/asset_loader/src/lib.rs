mod error;
mod mesh;

pub use crate::error::{Error, Result};
pub use crate::mesh::{load_file, LoadOptions, MeshData, VertexPosColor};
