//! Model asset definitions.
//!
//! A [`Model`] is read-only from the scene core's perspective. Meshes refer to
//! model materials by index and to skeleton nodes by index; skinned meshes
//! additionally carry per-bone bind matrices.

use glam::{Affine3A, Quat, Vec3};

use crate::assets::MaterialHandle;
use crate::resources::bounds::BoundingBox;
use crate::resources::geometry::MeshDraw;

/// Binds a mesh to one skeleton node for skinning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBone {
    /// Index into [`SkeletonDefinition::nodes`].
    pub node_index: usize,
    /// Mesh space to bone space, captured at bind time.
    pub bind_matrix: Affine3A,
}

#[derive(Debug, Clone)]
pub struct MeshDefinition {
    pub name: String,
    /// Index into [`Model::materials`].
    pub material_index: usize,
    /// Skeleton node the mesh is attached to (ignored without a skeleton).
    pub node_index: usize,
    /// Unskinned bounds in mesh space.
    pub bounding_box: BoundingBox,
    /// Present for skinned meshes.
    pub bones: Option<Vec<MeshBone>>,
    /// CPU-side copy of the draw data. `None` when the bytes only live on the
    /// GPU; such meshes still render but cannot be statically batched.
    pub draw: Option<MeshDraw>,
}

impl MeshDefinition {
    #[must_use]
    pub fn new(name: &str, material_index: usize, bounding_box: BoundingBox) -> Self {
        Self {
            name: name.to_string(),
            material_index,
            node_index: 0,
            bounding_box,
            bones: None,
            draw: None,
        }
    }

    #[must_use]
    pub fn with_draw(mut self, draw: MeshDraw) -> Self {
        self.draw = Some(draw);
        self
    }

    #[must_use]
    pub fn with_bones(mut self, bones: Vec<MeshBone>) -> Self {
        self.bones = Some(bones);
        self
    }

    #[must_use]
    pub fn with_node(mut self, node_index: usize) -> Self {
        self.node_index = node_index;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_skinned(&self) -> bool {
        self.bones.as_ref().is_some_and(|b| !b.is_empty())
    }
}

/// Material slot of a model, possibly empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelMaterial {
    pub material: Option<MaterialHandle>,
    pub is_shadow_caster: bool,
}

impl ModelMaterial {
    #[must_use]
    pub fn new(material: MaterialHandle) -> Self {
        Self {
            material: Some(material),
            is_shadow_caster: true,
        }
    }
}

/// Bind-pose description of one skeleton node.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonNodeDefinition {
    pub name: String,
    /// Parents always precede their children.
    pub parent_index: Option<usize>,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl SkeletonNodeDefinition {
    #[must_use]
    pub fn new(name: &str, parent_index: Option<usize>, position: Vec3) -> Self {
        Self {
            name: name.to_string(),
            parent_index,
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkeletonDefinition {
    pub nodes: Vec<SkeletonNodeDefinition>,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,
    pub meshes: Vec<MeshDefinition>,
    pub materials: Vec<ModelMaterial>,
    pub skeleton: Option<SkeletonDefinition>,
    /// Overrides the engine default, overridden by the component.
    pub distance_sort_fudge: Option<f32>,
    /// Overrides the engine default, overridden by the component.
    pub small_object_culling_multiplier: Option<f32>,
}

impl Model {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Union of all mesh bounds in model space, ignoring the skeleton.
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.meshes
            .iter()
            .map(|m| m.bounding_box)
            .reduce(|acc, b| acc.union(&b))
    }
}
