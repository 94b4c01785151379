//! Transform links.
//!
//! A linked node takes its parent matrix from an external provider instead of
//! its scene parent. The provider names the entity it reads from, so the
//! transform pass can schedule the linked node after it.

use glam::Affine3A;
use slotmap::{SecondaryMap, SparseSecondaryMap};

use crate::scene::components::ModelComponent;
use crate::scene::node::TransformNode;
use crate::scene::EntityHandle;

/// Read-only view handed to links during the transform pass.
///
/// World matrices of dependencies are already final when a link is evaluated.
#[derive(Clone, Copy)]
pub struct LinkContext<'a> {
    pub transforms: &'a SecondaryMap<EntityHandle, TransformNode>,
    pub models: &'a SparseSecondaryMap<EntityHandle, ModelComponent>,
}

pub trait TransformLink: Send + Sync {
    /// Entity whose world matrix must be final before this link runs.
    fn dependency(&self) -> Option<EntityHandle>;

    /// Matrix that replaces the parent world matrix. `None` falls back to the
    /// scene parent for this frame.
    fn compute_matrix(&self, ctx: &LinkContext<'_>) -> Option<Affine3A>;
}

/// Attaches a node to a skeleton node of a model entity (bone socket).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNodeLink {
    pub model_entity: EntityHandle,
    pub node_index: usize,
}

impl ModelNodeLink {
    #[must_use]
    pub fn new(model_entity: EntityHandle, node_index: usize) -> Self {
        Self {
            model_entity,
            node_index,
        }
    }

    /// Resolves `node_name` against the entity's current skeleton instance.
    #[must_use]
    pub fn by_name(
        models: &SparseSecondaryMap<EntityHandle, ModelComponent>,
        model_entity: EntityHandle,
        node_name: &str,
    ) -> Option<Self> {
        let index = models.get(model_entity)?.skeleton()?.node_index(node_name)?;
        Some(Self::new(model_entity, index))
    }
}

impl TransformLink for ModelNodeLink {
    fn dependency(&self) -> Option<EntityHandle> {
        Some(self.model_entity)
    }

    fn compute_matrix(&self, ctx: &LinkContext<'_>) -> Option<Affine3A> {
        let target = ctx.transforms.get(self.model_entity)?;
        let skeleton = ctx.models.get(self.model_entity)?.skeleton()?;
        let node_matrix = skeleton.node_model_matrix(self.node_index)?;
        Some(*target.world_matrix() * *node_matrix)
    }
}
