//! Skeleton instances.
//!
//! A [`SkeletonInstance`] is the per-entity, mutable copy of a model's
//! [`SkeletonDefinition`](crate::resources::SkeletonDefinition). Animation
//! writes node poses; the engine then refreshes the matrices in two steps:
//!
//! 1. [`prepare_skeletons`] before the transform pass: rebuild instances whose
//!    model changed and compute model-space matrices. Bone-attached nodes
//!    ([`ModelNodeLink`](crate::scene::ModelNodeLink)) read these.
//! 2. [`finalize_skeletons`] after the transform pass: lift model-space
//!    matrices into world space with the owning entity's world matrix. Skinned
//!    render records read these.

use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3};
use rayon::prelude::*;

use crate::assets::{AssetServer, ModelHandle};
use crate::resources::model::Model;
use crate::scene::Scene;

/// Pose and matrices of one skeleton node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTransformation {
    pub name: String,
    pub parent_index: Option<usize>,

    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    pub(crate) local_matrix: Affine3A,
    /// Relative to the model root.
    pub(crate) model_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,
}

impl NodeTransformation {
    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn model_matrix(&self) -> &Affine3A {
        &self.model_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }
}

#[derive(Debug, Clone)]
pub struct SkeletonInstance {
    source_handle: ModelHandle,
    source: Arc<Model>,
    nodes: Vec<NodeTransformation>,
}

impl SkeletonInstance {
    /// Builds an instance in bind pose. Returns `None` for models without a skeleton.
    #[must_use]
    pub fn new(handle: ModelHandle, model: &Arc<Model>) -> Option<Self> {
        let definition = model.skeleton.as_ref()?;

        let nodes = definition
            .nodes
            .iter()
            .map(|def| NodeTransformation {
                name: def.name.clone(),
                parent_index: def.parent_index,
                position: def.position,
                rotation: def.rotation,
                scale: def.scale,
                local_matrix: Affine3A::IDENTITY,
                model_matrix: Affine3A::IDENTITY,
                world_matrix: Affine3A::IDENTITY,
            })
            .collect();

        let mut instance = Self {
            source_handle: handle,
            source: Arc::clone(model),
            nodes,
        };
        instance.update_model_matrices();
        Some(instance)
    }

    /// True when the instance was built from exactly this model version.
    #[must_use]
    pub fn is_built_from(&self, handle: ModelHandle, model: &Arc<Model>) -> bool {
        self.source_handle == handle && Arc::ptr_eq(&self.source, model)
    }

    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[NodeTransformation] {
        &self.nodes
    }

    #[must_use]
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Writes an animated pose. Matrices follow on the next frame update.
    pub fn set_node_pose(&mut self, index: usize, position: Vec3, rotation: Quat, scale: Vec3) -> bool {
        let Some(node) = self.nodes.get_mut(index) else {
            return false;
        };
        node.position = position;
        node.rotation = rotation;
        node.scale = scale;
        true
    }

    #[inline]
    #[must_use]
    pub fn node_model_matrix(&self, index: usize) -> Option<&Affine3A> {
        self.nodes.get(index).map(|n| &n.model_matrix)
    }

    #[inline]
    #[must_use]
    pub fn node_world_matrix(&self, index: usize) -> Option<&Affine3A> {
        self.nodes.get(index).map(|n| &n.world_matrix)
    }

    /// Composes local matrices and chains them to the model root.
    ///
    /// Parents precede children in the node list, so one forward sweep suffices.
    pub fn update_model_matrices(&mut self) {
        for i in 0..self.nodes.len() {
            let node = &self.nodes[i];
            let local =
                Affine3A::from_scale_rotation_translation(node.scale, node.rotation, node.position);
            let model = match node.parent_index {
                Some(p) if p < i => self.nodes[p].model_matrix * local,
                Some(p) => {
                    log::warn!("Skeleton node '{}' has parent {p} after itself, treated as root", node.name);
                    local
                }
                None => local,
            };
            let node = &mut self.nodes[i];
            node.local_matrix = local;
            node.model_matrix = model;
        }
    }

    pub fn update_world_matrices(&mut self, entity_world: &Affine3A) {
        for node in &mut self.nodes {
            node.world_matrix = *entity_world * node.model_matrix;
        }
    }
}

// ============================================================================
// Frame steps
// ============================================================================

/// Rebuilds stale skeleton instances and refreshes model-space matrices.
///
/// Returns the number of instances that were (re)built.
pub fn prepare_skeletons(scene: &mut Scene, assets: &AssetServer) -> usize {
    let mut components: Vec<_> = scene.models.values_mut().collect();

    components
        .par_iter_mut()
        .map(|component| {
            let current = component
                .model
                .and_then(|handle| assets.get_model(handle).map(|model| (handle, model)));

            let mut rebuilt = 0;
            match current {
                Some((handle, model)) if model.skeleton.is_some() => {
                    let stale = component
                        .skeleton
                        .as_ref()
                        .is_none_or(|sk| !sk.is_built_from(handle, &model));
                    if stale {
                        component.skeleton = SkeletonInstance::new(handle, &model);
                        rebuilt = 1;
                    }
                }
                _ => component.skeleton = None,
            }

            if let Some(skeleton) = component.skeleton.as_mut() {
                skeleton.update_model_matrices();
            }
            rebuilt
        })
        .sum()
}

/// Lifts skeleton matrices into world space using each entity's world matrix.
pub fn finalize_skeletons(scene: &mut Scene) {
    let transforms = &scene.transforms;
    for (entity, component) in &mut scene.models {
        let (Some(skeleton), Some(node)) = (component.skeleton.as_mut(), transforms.get(entity)) else {
            continue;
        };
        skeleton.update_world_matrices(node.world_matrix());
    }
}
