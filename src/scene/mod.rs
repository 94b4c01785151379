//! Scene graph module
//!
//! Manages the entity hierarchy and per-entity component tables:
//! - [`Scene`]: entities, transform nodes, components and sub-scenes
//! - [`TransformNode`]: local TRS, cached matrices, parent/children links
//! - [`Transform`]: the TRS data with shadow-state dirty checking
//! - [`TransformSystem`]: level-ordered world-matrix propagation
//! - [`SkeletonInstance`]: per-model skeleton node matrices
//! - [`TransformLink`]: external pose providers (bone attachment)

pub mod components;
pub mod link;
pub mod node;
pub mod scene;
pub mod skeleton;
pub mod transform;
pub mod transform_system;

pub use components::{
    ChangeKind, Component, ComponentChange, ComponentId, ComponentKind, ModelComponent,
    SpriteComponent,
};
pub use link::{LinkContext, ModelNodeLink, TransformLink};
pub use node::{HierarchyMode, Immobility, TransformNode, TransformOperation};
pub use scene::{Entity, HierarchyEvent, Scene, SubScene};
pub use skeleton::{NodeTransformation, SkeletonInstance};
pub use transform::Transform;
pub use transform_system::{LevelOrderBatches, TransformStats, TransformSystem};

use slotmap::new_key_type;

new_key_type! {
    pub struct EntityHandle;
    pub struct SceneKey;
}
