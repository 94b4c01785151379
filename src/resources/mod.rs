//! Resource definitions consumed by the scene core.
//!
//! - [`BoundingBox`] / [`BoundingSphere`]: bounding volumes
//! - [`MeshDraw`]: CPU-side vertex/index bytes and unpacking
//! - [`Material`]: pass list of a material
//! - [`Model`]: meshes, material slots and optional skeleton

pub mod bounds;
pub mod geometry;
pub mod material;
pub mod model;

pub use bounds::{BoundingBox, BoundingSphere};
pub use geometry::{
    IndexBufferData, IndexFormat, MeshDraw, UnpackedMesh, VertexBufferData, VertexElement,
    VertexFormat, VertexLayout, VertexSemantic,
};
pub use material::{Material, MaterialPass};
pub use model::{
    MeshBone, MeshDefinition, Model, ModelMaterial, SkeletonDefinition, SkeletonNodeDefinition,
};
