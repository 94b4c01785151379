//! CPU-side mesh draw data and unpacking.
//!
//! Vertex bytes are described by a [`VertexLayout`] of semantic channels.
//! [`MeshDraw::unpack`] reads them back into plain arrays for the static
//! batcher and for bounds fitting. A mesh whose bytes were dropped after GPU
//! upload or are truncated, whose indices run past its vertices, or whose
//! layout lacks a readable position channel, fails with a recoverable error
//! instead of aborting the caller.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::errors::{EngineError, Result};
use crate::resources::bounds::BoundingBox;

/// Meaning of a vertex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    TexCoord,
    Tangent,
    Color,
    JointIndices,
    JointWeights,
}

/// Storage format of a vertex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
    Uint16x4,
}

impl VertexFormat {
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Float32x2 | Self::Uint16x4 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
            Self::Unorm8x4 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub semantic: VertexSemantic,
    pub format: VertexFormat,
    /// Byte offset inside one vertex.
    pub offset: usize,
}

/// Interleaved vertex layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    pub stride: usize,
    pub elements: Vec<VertexElement>,
}

impl VertexLayout {
    /// Packed layout, offsets assigned in declaration order.
    #[must_use]
    pub fn packed(channels: &[(VertexSemantic, VertexFormat)]) -> Self {
        let mut offset = 0;
        let elements = channels
            .iter()
            .map(|&(semantic, format)| {
                let element = VertexElement { semantic, format, offset };
                offset += format.size();
                element
            })
            .collect();
        Self { stride: offset, elements }
    }

    #[must_use]
    pub fn find(&self, semantic: VertexSemantic) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.semantic == semantic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Vertex bytes plus their layout. `data` is `None` once the bytes only live on the GPU.
#[derive(Debug, Clone)]
pub struct VertexBufferData {
    pub layout: VertexLayout,
    pub data: Option<Arc<Vec<u8>>>,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct IndexBufferData {
    pub format: IndexFormat,
    pub data: Option<Arc<Vec<u8>>>,
    pub count: usize,
}

/// Everything needed to draw (or unpack) one mesh.
#[derive(Debug, Clone)]
pub struct MeshDraw {
    pub vertices: VertexBufferData,
    pub indices: Option<IndexBufferData>,
}

/// Plain arrays read back from a [`MeshDraw`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnpackedMesh {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    pub indices: Vec<u32>,
}

impl UnpackedMesh {
    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.positions.iter().copied())
    }
}

impl MeshDraw {
    /// Builds a position-only (optionally normal) mesh with 32-bit indices.
    #[must_use]
    pub fn from_arrays(positions: &[Vec3], normals: Option<&[Vec3]>, indices: &[u32]) -> Self {
        let mut channels = vec![(VertexSemantic::Position, VertexFormat::Float32x3)];
        if normals.is_some() {
            channels.push((VertexSemantic::Normal, VertexFormat::Float32x3));
        }
        let layout = VertexLayout::packed(&channels);

        let mut bytes = Vec::with_capacity(layout.stride * positions.len());
        for (i, p) in positions.iter().enumerate() {
            bytes.extend_from_slice(bytemuck::bytes_of(&p.to_array()));
            if let Some(n) = normals {
                let n = n.get(i).copied().unwrap_or(Vec3::Y);
                bytes.extend_from_slice(bytemuck::bytes_of(&n.to_array()));
            }
        }

        Self {
            vertices: VertexBufferData {
                layout,
                data: Some(Arc::new(bytes)),
                count: positions.len(),
            },
            indices: Some(IndexBufferData {
                format: IndexFormat::Uint32,
                data: Some(Arc::new(bytemuck::cast_slice(indices).to_vec())),
                count: indices.len(),
            }),
        }
    }

    /// Reads positions (required), normals and uvs (optional) and indices.
    ///
    /// Non-indexed meshes get a sequential index list.
    pub fn unpack(&self, mesh_name: &str) -> Result<UnpackedMesh> {
        let layout = &self.vertices.layout;
        let data = self
            .vertices
            .data
            .as_deref()
            .ok_or_else(|| EngineError::MeshDataUnavailable { mesh: mesh_name.to_string() })?;

        let position = layout.find(VertexSemantic::Position).ok_or_else(|| {
            EngineError::UnsupportedVertexLayout {
                mesh: mesh_name.to_string(),
                reason: "no position channel".to_string(),
            }
        })?;
        if position.format != VertexFormat::Float32x3 {
            return Err(EngineError::UnsupportedVertexLayout {
                mesh: mesh_name.to_string(),
                reason: format!("position stored as {:?}", position.format),
            });
        }

        let count = self.vertices.count;
        let unavailable = || EngineError::MeshDataUnavailable { mesh: mesh_name.to_string() };

        // 每个通道都必须覆盖全部 count 个顶点
        let positions = read_channel::<[f32; 3]>(data, layout.stride, position.offset, count)
            .ok_or_else(unavailable)?
            .into_iter()
            .map(Vec3::from_array)
            .collect();

        let normals = match layout.find(VertexSemantic::Normal).filter(|e| e.format == VertexFormat::Float32x3) {
            Some(e) => Some(
                read_channel::<[f32; 3]>(data, layout.stride, e.offset, count)
                    .ok_or_else(unavailable)?
                    .into_iter()
                    .map(Vec3::from_array)
                    .collect(),
            ),
            None => None,
        };

        let uvs = match layout.find(VertexSemantic::TexCoord).filter(|e| e.format == VertexFormat::Float32x2) {
            Some(e) => Some(
                read_channel::<[f32; 2]>(data, layout.stride, e.offset, count)
                    .ok_or_else(unavailable)?
                    .into_iter()
                    .map(Vec2::from_array)
                    .collect(),
            ),
            None => None,
        };

        let indices = match &self.indices {
            None => (0..count as u32).collect(),
            Some(index_buffer) => {
                let bytes = index_buffer.data.as_deref().ok_or_else(unavailable)?;
                let indices = read_indices(bytes, index_buffer.format, index_buffer.count).ok_or_else(unavailable)?;
                // An index past the vertex count points at bytes this mesh does not have.
                if let Some(&bad) = indices.iter().find(|&&i| i as usize >= count) {
                    log::debug!("Mesh '{mesh_name}': index {bad} out of range for {count} vertices");
                    return Err(unavailable());
                }
                indices
            }
        };

        Ok(UnpackedMesh { positions, normals, uvs, indices })
    }
}

/// Reads one channel of `count` vertices. `None` if the bytes do not cover all of them.
fn read_channel<T: bytemuck::Pod>(data: &[u8], stride: usize, offset: usize, count: usize) -> Option<Vec<T>> {
    let size = std::mem::size_of::<T>();
    (0..count)
        .map(|i| {
            let start = i.checked_mul(stride)?.checked_add(offset)?;
            data.get(start..start.checked_add(size)?).map(bytemuck::pod_read_unaligned)
        })
        .collect()
}

fn read_indices(bytes: &[u8], format: IndexFormat, count: usize) -> Option<Vec<u32>> {
    match format {
        IndexFormat::Uint16 => {
            let slice = bytes.get(..count.checked_mul(2)?)?;
            Some(
                slice
                    .chunks_exact(2)
                    .map(|c| u32::from(bytemuck::pod_read_unaligned::<u16>(c)))
                    .collect(),
            )
        }
        IndexFormat::Uint32 => {
            let slice = bytes.get(..count.checked_mul(4)?)?;
            Some(slice.chunks_exact(4).map(bytemuck::pod_read_unaligned::<u32>).collect())
        }
    }
}
