//! Sprite render synchronization.

use std::sync::Arc;

use glam::{Affine3A, Vec3};
use rayon::prelude::*;

use crate::assets::MaterialHandle;
use crate::render::association::{AssociationProcessor, ComponentAssociationTable};
use crate::render::visibility::{
    RenderGroup, RenderObjectId, RenderObjectKind, VisibilityRegistry, VisibleObject,
};
use crate::resources::bounds::BoundingBox;
use crate::scene::{Component, ComponentId, EntityHandle, Scene, SpriteComponent};

/// Render-side shadow of one [`SpriteComponent`].
#[derive(Debug, Clone)]
pub struct RenderSprite {
    pub id: RenderObjectId,
    owner: ComponentId,
    entity: EntityHandle,

    pub world_matrix: Affine3A,
    pub bounding_box: BoundingBox,
    pub material: Option<MaterialHandle>,
    pub enabled: bool,
    pub render_group: RenderGroup,

    registered: bool,
}

impl RenderSprite {
    #[inline]
    #[must_use]
    pub fn entity(&self) -> EntityHandle {
        self.entity
    }

    #[inline]
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    fn visible_object(&self) -> VisibleObject {
        VisibleObject {
            id: self.id,
            entity: self.entity,
            kind: RenderObjectKind::Sprite,
            render_group: self.render_group,
        }
    }

    fn place(&mut self, sprite: &SpriteComponent, world: Affine3A) {
        let half = Vec3::new(sprite.size.x * 0.5, sprite.size.y * 0.5, 0.0);
        self.world_matrix = world;
        self.bounding_box = BoundingBox::from_center_half_extents(Vec3::ZERO, half).transform(&world);
        self.material = sprite.material;
    }
}

pub struct SpriteProcessor {
    registry: Arc<VisibilityRegistry>,
    pub parallel_min_records: usize,
}

impl SpriteProcessor {
    #[must_use]
    pub fn new(registry: Arc<VisibilityRegistry>, parallel_min_records: usize) -> Self {
        Self {
            registry,
            parallel_min_records,
        }
    }

    fn update(&self, sprite: &mut RenderSprite, scene: &Scene) {
        let Some(component) = scene.sprites.get(sprite.entity) else {
            return;
        };
        let world = scene
            .transforms
            .get(sprite.entity)
            .map_or(Affine3A::IDENTITY, |n| *n.world_matrix());
        sprite.place(component, world);

        let group_changed = sprite.render_group != component.render_group;
        sprite.render_group = component.render_group;
        sprite.enabled = component.enabled;

        match (sprite.enabled, sprite.registered) {
            (true, false) => {
                self.registry.add(sprite.visible_object());
                sprite.registered = true;
            }
            (false, true) => {
                self.registry.remove(sprite.id);
                sprite.registered = false;
            }
            (true, true) if group_changed => {
                self.registry.set_render_group(sprite.id, sprite.render_group);
            }
            _ => {}
        }
    }
}

impl AssociationProcessor for SpriteProcessor {
    type Component = SpriteComponent;
    type Shadow = RenderSprite;

    fn generate(&self, entity: EntityHandle, component: &SpriteComponent, scene: &Scene) -> RenderSprite {
        let world = scene
            .transforms
            .get(entity)
            .map_or(Affine3A::IDENTITY, |n| *n.world_matrix());
        let mut sprite = RenderSprite {
            id: RenderObjectId::next(),
            owner: component.id(),
            entity,
            world_matrix: Affine3A::IDENTITY,
            bounding_box: BoundingBox::default(),
            material: component.material,
            enabled: component.enabled,
            render_group: component.render_group,
            registered: false,
        };
        sprite.place(component, world);
        sprite
    }

    fn validate(&self, component: &SpriteComponent, shadow: &RenderSprite) -> bool {
        shadow.owner == component.id()
    }

    fn on_adding(&self, entity: EntityHandle, component: &SpriteComponent, shadow: &mut RenderSprite) {
        log::trace!("Associating sprite {:?} of {entity:?} as {:?}", component.id(), shadow.id);
    }

    fn register(&self, shadow: &mut RenderSprite) {
        if shadow.enabled {
            shadow.registered = self.registry.add(shadow.visible_object()) || shadow.registered;
        }
    }

    fn on_removed(&self, _entity: EntityHandle, shadow: RenderSprite) {
        if shadow.registered {
            self.registry.remove(shadow.id);
        }
    }
}

/// Refreshes placement and registry membership of every sprite.
pub fn synchronize_sprites(table: &mut ComponentAssociationTable<SpriteProcessor>, scene: &Scene) -> usize {
    let (processor, _, sprites) = table.split_mut();
    let min_len = processor.parallel_min_records.max(1);
    sprites
        .par_iter_mut()
        .with_min_len(min_len)
        .for_each(|sprite| processor.update(sprite, scene));
    sprites.len()
}
