use std::sync::Arc;

use crate::assets::{AssetServer, MaterialHandle};
use crate::render::association::ComponentAssociationTable;
use crate::render::model_sync::{synchronize_models, ModelProcessor, ModelSyncStats};
use crate::render::sprite_sync::{synchronize_sprites, SpriteProcessor};
use crate::render::visibility::VisibilityRegistry;
use crate::scene::Scene;
use crate::settings::RenderSyncSettings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSyncStats {
    /// Journal entries applied this frame.
    pub changes: usize,
    /// Associations regenerated because their component was swapped.
    pub revalidated: usize,
    pub models: ModelSyncStats,
    pub sprites: usize,
    pub visible_objects: usize,
}

/// Owns the render-side association tables and the shared visibility registry.
pub struct RenderSystem {
    registry: Arc<VisibilityRegistry>,
    models: ComponentAssociationTable<ModelProcessor>,
    sprites: ComponentAssociationTable<SpriteProcessor>,
}

impl RenderSystem {
    #[must_use]
    pub fn new(settings: &RenderSyncSettings) -> Self {
        let registry = Arc::new(VisibilityRegistry::new());
        Self {
            models: ComponentAssociationTable::new(ModelProcessor::new(Arc::clone(&registry), settings.clone())),
            sprites: ComponentAssociationTable::new(SpriteProcessor::new(
                Arc::clone(&registry),
                settings.parallel_min_records,
            )),
            registry,
        }
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<VisibilityRegistry> {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn models(&self) -> &ComponentAssociationTable<ModelProcessor> {
        &self.models
    }

    #[inline]
    #[must_use]
    pub fn sprites(&self) -> &ComponentAssociationTable<SpriteProcessor> {
        &self.sprites
    }

    pub fn set_fallback_material(&mut self, material: Option<MaterialHandle>) {
        self.models.processor_mut().fallback_material = material;
    }

    /// Feeds the scene's component journal to every table. Returns the entry count.
    pub fn apply_changes(&mut self, scene: &mut Scene) -> usize {
        let changes = scene.drain_component_changes();
        for change in &changes {
            self.models.on_change(scene, change);
            self.sprites.on_change(scene, change);
        }
        changes.len()
    }

    /// Regenerates associations whose component was replaced in place.
    pub fn validate(&mut self, scene: &Scene) -> usize {
        self.models.validate_all(scene) + self.sprites.validate_all(scene)
    }

    /// Brings every render record in line with the scene. Run after the
    /// transform pass and skeleton finalization.
    pub fn synchronize(&mut self, scene: &Scene, assets: &AssetServer) -> RenderSyncStats {
        RenderSyncStats {
            models: synchronize_models(&mut self.models, scene, assets),
            sprites: synchronize_sprites(&mut self.sprites, scene),
            visible_objects: self.registry.len(),
            ..RenderSyncStats::default()
        }
    }

    /// Journal, validation and synchronization in one call.
    pub fn update(&mut self, scene: &mut Scene, assets: &AssetServer) -> RenderSyncStats {
        let changes = self.apply_changes(scene);
        let revalidated = self.validate(scene);
        RenderSyncStats {
            changes,
            revalidated,
            ..self.synchronize(scene, assets)
        }
    }
}
