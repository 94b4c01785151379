//! Static batching.
//!
//! Merges the meshes of immobile model entities into one world-space mesh.
//! Mesh data problems are soft failures: the offending mesh is skipped, the
//! entity lands in [`StaticBatch::failed`] and batching continues.

use glam::{Affine3A, Mat3, Vec3};
use rustc_hash::FxHashSet;

use crate::assets::AssetServer;
use crate::errors::{EngineError, Result};
use crate::resources::geometry::UnpackedMesh;
use crate::resources::model::MeshDefinition;
use crate::scene::{EntityHandle, ModelComponent, Scene};

#[derive(Debug, Default)]
pub struct StaticBatch {
    /// World-space geometry. Normals are kept only if every merged mesh had them.
    pub mesh: UnpackedMesh,
    /// Entities with at least one merged mesh, in input order.
    pub merged: Vec<EntityHandle>,
    /// Entities with at least one mesh that could not be merged.
    pub failed: FxHashSet<EntityHandle>,
    /// Set by the first append, even if that mesh had no vertices.
    appended: bool,
}

impl StaticBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mesh.positions.is_empty()
    }

    fn append(&mut self, unpacked: &UnpackedMesh, world: &Affine3A) {
        let base = self.mesh.positions.len() as u32;
        let first = !std::mem::replace(&mut self.appended, true);

        self.mesh
            .positions
            .extend(unpacked.positions.iter().map(|&p| world.transform_point3(p)));

        let normal_matrix = Mat3::from(world.matrix3).inverse().transpose();
        self.mesh.normals = match (first, self.mesh.normals.take(), &unpacked.normals) {
            (true, _, Some(n)) => Some(n.iter().map(|&v| (normal_matrix * v).normalize_or_zero()).collect()),
            (false, Some(mut acc), Some(n)) => {
                acc.extend(n.iter().map(|&v| (normal_matrix * v).normalize_or_zero()));
                Some(acc)
            }
            _ => None,
        };

        self.mesh.indices.extend(unpacked.indices.iter().map(|&i| i + base));
    }
}

fn mesh_world(component: &ModelComponent, mesh: &MeshDefinition, entity_world: &Affine3A) -> Affine3A {
    component
        .skeleton()
        .and_then(|s| s.node_world_matrix(mesh.node_index))
        .copied()
        .unwrap_or(*entity_world)
}

fn unpack(mesh: &MeshDefinition) -> Result<UnpackedMesh> {
    let draw = mesh.draw.as_ref().ok_or_else(|| EngineError::MeshDataUnavailable {
        mesh: mesh.name.clone(),
    })?;
    draw.unpack(&mesh.name)
}

/// Merges every mesh of `entities` into one world-space mesh.
///
/// Entities without a model component or without a loaded model are ignored.
pub fn batch_static_models(scene: &Scene, assets: &AssetServer, entities: &[EntityHandle]) -> StaticBatch {
    let mut batch = StaticBatch::default();

    for &entity in entities {
        let (Some(component), Some(node)) = (scene.models().get(entity), scene.transform(entity)) else {
            continue;
        };
        let Some(model) = component.model.and_then(|h| assets.get_model(h)) else {
            continue;
        };

        let mut merged_any = false;
        for mesh in &model.meshes {
            match unpack(mesh) {
                Ok(unpacked) => {
                    let world = mesh_world(component, mesh, node.world_matrix());
                    batch.append(&unpacked, &world);
                    merged_any = true;
                }
                Err(err) => {
                    log::warn!("Static batching skipped a mesh of {entity:?}: {err}");
                    batch.failed.insert(entity);
                }
            }
        }

        if merged_any {
            batch.merged.push(entity);
        }
    }

    log::debug!(
        "Static batch: {} vertices from {} entities, {} failed",
        batch.mesh.positions.len(),
        batch.merged.len(),
        batch.failed.len()
    );
    batch
}
