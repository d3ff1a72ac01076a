use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use glam::{vec3, Vec3};
use gltf::mesh::Mode;
use rand::prelude::*;

use crate::error::{Error, Result};

/// Interleaved vertex layout shared by the raster pipelines.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexPosColor {
    pub position: Vec3,
    pub color: Vec3,
}

#[derive(Debug)]
pub struct MeshData {
    pub vertices: Vec<VertexPosColor>,
    pub indices: Vec<u16>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// The position stream alone, tightly packed for consumers that read
    /// 12-byte-stride float3 data and ignore the other attributes.
    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|vertex| vertex.position).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Uniform scale applied to every position.
    pub scale: f32,
    /// Negates z and flips triangle winding, for meshes authored in a
    /// right-handed convention.
    pub flip_z: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            flip_z: false,
        }
    }
}

/// Positions within this distance collapse into one vertex.
const POSITION_EPSILON: f32 = 1e-4;

const COLOR_SEED: u64 = 17;

/// Loads every triangle primitive of the file into one vertex and index
/// buffer. Source colors are ignored, each unique position gets a seeded
/// random color instead.
pub fn load_file<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<MeshData> {
    let path = path.as_ref();
    let (document, buffers, _images) = gltf::import(path).map_err(|e| Error::Load(e.to_string()))?;

    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                return Err(Error::Support(format!(
                    "primitive mode {:?}",
                    primitive.mode()
                )));
            }
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
            let pos_reader = reader
                .read_positions()
                .ok_or_else(|| Error::Load("primitive has no positions".to_string()))?;

            let base = positions.len() as u32;
            positions.extend(pos_reader);
            match reader.read_indices() {
                Some(index_reader) => indices.extend(index_reader.into_u32().map(|i| i + base)),
                // Non-indexed primitive, index it trivially
                None => indices.extend(base..positions.len() as u32),
            }
        }
    }

    let mesh = build_mesh(&positions, &indices, options)?;
    log::info!(
        "Loaded {}: {} unique vertices, {} triangles",
        path.display(),
        mesh.vertices.len(),
        mesh.triangle_count(),
    );

    Ok(mesh)
}

fn build_mesh(positions: &[[f32; 3]], indices: &[u32], options: LoadOptions) -> Result<MeshData> {
    if indices.len() % 3 != 0 {
        return Err(Error::Load(format!(
            "index count {} is not a multiple of 3",
            indices.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(COLOR_SEED);
    let mut by_position: HashMap<[i64; 3], u16> = HashMap::new();
    let mut vertices: Vec<VertexPosColor> = Vec::new();
    let mut remapped: Vec<u16> = Vec::with_capacity(indices.len());

    for &index in indices {
        let raw = *positions.get(index as usize).ok_or_else(|| {
            Error::Load(format!(
                "index {} out of bounds for {} positions",
                index,
                positions.len()
            ))
        })?;
        let mut position = Vec3::from(raw) * options.scale;
        if options.flip_z {
            position.z = -position.z;
        }

        let slot = match by_position.entry(quantize(position)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                if vertices.len() > u16::MAX as usize {
                    return Err(Error::IndexOverflow(vertices.len() + 1));
                }
                let slot = vertices.len() as u16;
                vertices.push(VertexPosColor {
                    position,
                    color: vec3(rng.gen(), rng.gen(), rng.gen()),
                });
                entry.insert(slot);
                slot
            }
        };
        remapped.push(slot);
    }

    if options.flip_z {
        // Mirroring reverses facing, swap two corners to keep it.
        for triangle in remapped.chunks_exact_mut(3) {
            triangle.swap(1, 2);
        }
    }

    Ok(MeshData {
        vertices,
        indices: remapped,
    })
}

fn quantize(position: Vec3) -> [i64; 3] {
    (position / POSITION_EPSILON)
        .round()
        .to_array()
        .map(|c| c as i64)
}

#[test]
fn test_dedup_preserves_first_seen_order() {
    // Two triangles sharing an edge, written out as 6 corners.
    let positions = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    let indices: Vec<u32> = (0..6).collect();

    let mesh = build_mesh(&positions, &indices, LoadOptions::default()).unwrap();

    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.indices, vec![0, 1, 2, 1, 3, 2]);
    assert_eq!(mesh.vertices[3].position, vec3(1.0, 1.0, 0.0));
    assert_eq!(mesh.positions()[3], vec3(1.0, 1.0, 0.0));
}

#[test]
fn test_near_coincident_positions_collapse() {
    let positions = [[0.0, 0.0, 0.0], [2e-5, 0.0, 0.0], [1.0, 0.0, 0.0]];

    let mesh = build_mesh(&positions, &[0, 1, 2], LoadOptions::default()).unwrap();

    assert_eq!(mesh.vertices.len(), 2);
    assert_eq!(mesh.indices, vec![0, 0, 1]);
}

#[test]
fn test_flip_z_mirrors_and_rewinds() {
    let positions = [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]];
    let options = LoadOptions {
        scale: 2.0,
        flip_z: true,
    };

    let mesh = build_mesh(&positions, &[0, 1, 2], options).unwrap();

    assert_eq!(mesh.indices, vec![0, 2, 1]);
    assert_eq!(mesh.vertices[0].position, vec3(0.0, 0.0, -2.0));
    assert_eq!(mesh.vertices[1].position, vec3(2.0, 0.0, -2.0));
}

#[test]
fn test_index_overflow_is_an_error() {
    // One more unique position than 16 bit indices can address.
    let positions: Vec<[f32; 3]> = (0..65538).map(|i| [i as f32, 0.0, 0.0]).collect();
    let indices: Vec<u32> = (0..65538).collect();

    let err = build_mesh(&positions, &indices, LoadOptions::default()).unwrap_err();

    assert!(matches!(err, Error::IndexOverflow(_)));
}
