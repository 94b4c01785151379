#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod assets;
pub mod context;
pub mod engine;
pub mod errors;
pub mod physics;
pub mod render;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod utils;
pub mod vr;

pub use assets::{AssetServer, MaterialHandle, ModelHandle};
pub use context::EngineContext;
pub use engine::{Engine, FrameStats};
pub use errors::{EngineError, HierarchyViolation, Result};
pub use physics::{BodyKind, PhysicsWorld, RigidBody, RigidBodyComponent, SimulationQueue};
pub use render::{RenderSystem, VisibilityRegistry};
pub use resources::{BoundingBox, Material, Model};
pub use scene::{
    EntityHandle, HierarchyMode, Immobility, ModelComponent, Scene, SceneKey, SpriteComponent, Transform,
    TransformNode,
};
pub use settings::EngineSettings;
pub use vr::{DevicePose, TrackingState, VrDevice, VrHand};
