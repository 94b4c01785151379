use std::fmt;
use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3};

use crate::scene::link::TransformLink;
use crate::scene::transform::Transform;
use crate::scene::EntityHandle;
use crate::utils::observable::ObservableSet;
use crate::vr::VrHand;

/// How much of the hierarchy is allowed to move after the first update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Immobility {
    #[default]
    FullMotion,
    /// Node and its whole subtree keep their first computed world matrix.
    EverythingImmobile,
    /// Only this node keeps its first computed world matrix; children still move.
    JustMeImmobile,
}

/// How the parent's world matrix is applied to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HierarchyMode {
    #[default]
    Normal,
    /// Cancels the parent's own local rotation, keeping rotation inherited from above it.
    IgnoreFinalRotation,
    /// Inherits translation and scale only.
    IgnoreAllRotation,
}

/// Callback run after a node's world matrix is computed.
///
/// Operations run in registration order and may adjust the node in place,
/// e.g. to clamp a position or snap to a grid.
pub trait TransformOperation: Send + Sync {
    fn process(&self, entity: EntityHandle, node: &mut TransformNode);
}

impl<F> TransformOperation for F
where
    F: Fn(EntityHandle, &mut TransformNode) + Send + Sync,
{
    fn process(&self, entity: EntityHandle, node: &mut TransformNode) {
        self(entity, node);
    }
}

/// Per-frame bookkeeping of the transform pass.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameState {
    /// World matrix has been computed at least once.
    pub computed: bool,
    /// World matrix changed during the last pass.
    pub world_changed: bool,
    /// Local matrix changed during the current pass.
    pub local_changed: bool,
    /// Node belongs to a frozen `EverythingImmobile` subtree.
    pub subtree_frozen: bool,
    /// One forced recomputation requested (reparent, explicit dirty).
    pub refresh_pending: bool,
    /// World matrix moved by a single-node update since the last pass.
    /// Cleared by the next pass, which reports the node as changed.
    pub moved_outside_pass: bool,
}

/// The dependency component every scene-placed entity carries.
///
/// Holds the local transform, cached matrices and the hierarchy links.
/// Parent/child links are owned by the [`Scene`](crate::scene::Scene) and only
/// change through [`Scene::set_parent`](crate::scene::Scene::set_parent).
pub struct TransformNode {
    pub transform: Transform,

    pub immobility: Immobility,
    pub hierarchy_mode: HierarchyMode,

    /// Seeds position/rotation from the context's VR device each frame.
    pub track_vr_hand: Option<VrHand>,

    pub(crate) parent: Option<EntityHandle>,
    pub(crate) children: ObservableSet<EntityHandle>,

    pub(crate) link: Option<Arc<dyn TransformLink>>,
    pub(crate) post_operations: Vec<Arc<dyn TransformOperation>>,

    pub(crate) frame: FrameState,
}

impl TransformNode {
    #[must_use]
    pub fn new() -> Self {
        Self::from_transform(Transform::new())
    }

    #[must_use]
    pub fn from_transform(transform: Transform) -> Self {
        Self {
            transform,
            immobility: Immobility::default(),
            hierarchy_mode: HierarchyMode::default(),
            track_vr_hand: None,
            parent: None,
            children: ObservableSet::new(),
            link: None,
            post_operations: Vec::new(),
            frame: FrameState {
                refresh_pending: true,
                ..FrameState::default()
            },
        }
    }

    // ========================================================================
    // Hierarchy (read-only, mutations go through Scene)
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<EntityHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[EntityHandle] {
        self.children.as_slice()
    }

    #[inline]
    #[must_use]
    pub fn link(&self) -> Option<&Arc<dyn TransformLink>> {
        self.link.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn post_operation_count(&self) -> usize {
        self.post_operations.len()
    }

    // ========================================================================
    // Transform shortcuts
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        self.transform.world_matrix()
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        self.transform.local_matrix()
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.transform.world_position()
    }

    /// Whether the world matrix changed during the last transform pass.
    #[inline]
    #[must_use]
    pub fn world_changed(&self) -> bool {
        self.frame.world_changed
    }

    /// Injects a local matrix, bypassing TRS composition from now on.
    pub fn set_local_matrix(&mut self, mat: Affine3A) {
        self.transform.use_trs = false;
        self.transform.set_local_matrix(mat);
    }

    /// Writes a local matrix and decomposes it into TRS, keeping `use_trs` on.
    pub fn apply_local_matrix(&mut self, mat: Affine3A) {
        self.transform.use_trs = true;
        self.transform.apply_local_matrix(mat);
    }

    /// Replaces the computed world matrix. Intended for post-operations;
    /// children evaluated later in the same pass see the new value.
    pub fn override_world_matrix(&mut self, mat: Affine3A) {
        if mat != *self.transform.world_matrix() {
            self.transform.set_world_matrix(mat);
            self.frame.world_changed = true;
        }
    }

    /// Recomputes this node on the next pass, even if it is immobile.
    pub fn mark_dirty(&mut self) {
        self.transform.mark_dirty();
        self.frame.refresh_pending = true;
    }

    /// Parent world matrix as seen by this node, after the hierarchy mode is applied.
    pub(crate) fn inherited_parent_matrix(
        &self,
        parent_world: &Affine3A,
        parent_local_rotation: Quat,
    ) -> Affine3A {
        match self.hierarchy_mode {
            HierarchyMode::Normal => *parent_world,
            HierarchyMode::IgnoreAllRotation => {
                let (scale, _, translation) = parent_world.to_scale_rotation_translation();
                Affine3A::from_scale_rotation_translation(scale, Quat::IDENTITY, translation)
            }
            HierarchyMode::IgnoreFinalRotation => {
                let (scale, rotation, translation) = parent_world.to_scale_rotation_translation();
                let rotation = (rotation * parent_local_rotation.inverse()).normalize();
                Affine3A::from_scale_rotation_translation(scale, rotation, translation)
            }
        }
    }
}

impl Default for TransformNode {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransformNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformNode")
            .field("transform", &self.transform)
            .field("immobility", &self.immobility)
            .field("hierarchy_mode", &self.hierarchy_mode)
            .field("track_vr_hand", &self.track_vr_hand)
            .field("parent", &self.parent)
            .field("children", &self.children.as_slice())
            .field("linked", &self.link.is_some())
            .field("post_operations", &self.post_operations.len())
            .finish_non_exhaustive()
    }
}
