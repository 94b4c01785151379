//! Engine Core Module
//!
//! This module contains [`Engine`], the frame driver of the scene core. It owns
//! the per-frame systems and runs them in a fixed order against a [`Scene`]
//! and an [`AssetServer`] supplied by the caller.
//!
//! # Frame order
//!
//! 1. Physics pull: dynamic body poses flow into transform nodes
//! 2. Component changes: the scene journal reaches the render tables
//! 3. Skeleton prepare: model-space bone matrices
//! 4. Transform pass: world matrices, level by level
//! 5. Skeleton finalize: world-space bone matrices
//! 6. Physics push: kinematic bodies follow their nodes
//! 7. Render sync: check phase, then update phase
//!
//! # Example
//!
//! ```rust,ignore
//! use myth_scene::{Engine, EngineSettings, Scene, AssetServer};
//!
//! let mut engine = Engine::new(EngineSettings::default());
//! let mut scene = engine.create_scene();
//! let assets = AssetServer::new();
//!
//! loop {
//!     let stats = engine.update_frame(&mut scene, &assets);
//!     // ... hand engine.render().registry() to a renderer ...
//! }
//! ```

use std::sync::Arc;

use crate::assets::AssetServer;
use crate::context::EngineContext;
use crate::errors::Result;
use crate::physics;
use crate::render::{RenderSyncStats, RenderSystem};
use crate::scene::skeleton::{finalize_skeletons, prepare_skeletons};
use crate::scene::transform_system::update_world_matrix;
use crate::scene::{EntityHandle, Scene, TransformStats, TransformSystem};
use crate::settings::EngineSettings;
use crate::vr::VrDevice;

/// Summary of one [`Engine::update_frame`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub bodies_pulled: usize,
    pub skeletons_rebuilt: usize,
    pub transforms: TransformStats,
    pub bodies_pushed: usize,
    pub render: RenderSyncStats,
}

pub struct Engine {
    context: EngineContext,
    transforms: TransformSystem,
    render: RenderSystem,

    frame_count: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl Engine {
    #[must_use]
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_context(EngineContext::new(settings))
    }

    #[must_use]
    pub fn with_context(context: EngineContext) -> Self {
        log::info!(
            "Engine created (parallel_min_batch = {}, detect_cycles = {})",
            context.settings.transform.parallel_min_batch,
            context.settings.transform.detect_cycles
        );
        Self {
            render: RenderSystem::new(&context.settings.render),
            transforms: TransformSystem::new(),
            context,
            frame_count: 0,
        }
    }

    /// A scene configured with this engine's transform settings.
    #[must_use]
    pub fn create_scene(&self) -> Scene {
        Scene::with_settings(&self.context.settings.transform)
    }

    pub fn set_vr_device(&mut self, device: Option<Arc<dyn VrDevice>>) {
        self.context.vr = device;
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    #[inline]
    #[must_use]
    pub fn render(&self) -> &RenderSystem {
        &self.render
    }

    #[inline]
    pub fn render_mut(&mut self) -> &mut RenderSystem {
        &mut self.render
    }

    #[inline]
    #[must_use]
    pub fn transforms(&self) -> &TransformSystem {
        &self.transforms
    }

    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Runs one frame.
    pub fn update_frame(&mut self, scene: &mut Scene, assets: &AssetServer) -> FrameStats {
        let mut stats = FrameStats {
            frame: self.frame_count,
            ..FrameStats::default()
        };

        stats.bodies_pulled = physics::pull_dynamic_poses(scene);

        let changes = self.render.apply_changes(scene);

        stats.skeletons_rebuilt = prepare_skeletons(scene, assets);
        stats.transforms = self.transforms.update(scene, &self.context);
        finalize_skeletons(scene);

        stats.bodies_pushed = physics::push_kinematic_poses(scene, self.context.physics.as_ref());

        let revalidated = self.render.validate(scene);
        stats.render = RenderSyncStats {
            changes,
            revalidated,
            ..self.render.synchronize(scene, assets)
        };

        log::trace!(
            "Frame {}: {} transforms updated, {} visible objects",
            stats.frame,
            stats.transforms.updated,
            stats.render.visible_objects
        );

        self.frame_count += 1;
        stats
    }

    /// Refreshes one node (and optionally everything it depends on) between frames.
    pub fn update_world_matrix(
        &self,
        scene: &mut Scene,
        entity: EntityHandle,
        recurse_to_root: bool,
        run_post_ops: bool,
    ) -> Result<()> {
        update_world_matrix(scene, entity, recurse_to_root, run_post_ops, &self.context)
    }
}
