//! Render-side synchronization.
//!
//! Nothing here talks to a GPU. Processors mirror scene components into
//! render records and publish them to a [`VisibilityRegistry`] that a
//! renderer walks when it builds draw lists.

pub mod association;
pub mod batch;
pub mod model_sync;
pub mod sprite_sync;
pub mod system;
pub mod visibility;

pub use association::{AssociationKey, AssociationProcessor, ComponentAssociationTable};
pub use batch::{batch_static_models, StaticBatch};
pub use model_sync::{
    synchronize_models, MaterialRange, MeshRecord, ModelProcessor, ModelRenderRecord, ModelSyncStats,
    SyncState,
};
pub use sprite_sync::{synchronize_sprites, RenderSprite, SpriteProcessor};
pub use system::{RenderSyncStats, RenderSystem};
pub use visibility::{
    RenderGroup, RenderGroupMask, RenderObjectId, RenderObjectKind, VisibilityRegistry, VisibleObject,
};
