//! Component association tests
//!
//! Tests for:
//! - Associations waiting for missing dependencies
//! - Dependency removal tearing associations down
//! - Order preservation on removal
//! - In-place replacement detection (journal and validation)

use glam::Vec2;
use parking_lot::Mutex;

use myth_scene::render::{AssociationProcessor, ComponentAssociationTable};
use myth_scene::scene::{Component, ComponentId, EntityHandle, Scene, SpriteComponent, TransformNode};

// ============================================================================
// Helper
// ============================================================================

/// Shadow is the owning component id; every hook call is logged.
#[derive(Default)]
struct Tracker {
    removed: Mutex<Vec<(EntityHandle, ComponentId)>>,
    registered: Mutex<Vec<ComponentId>>,
}

impl AssociationProcessor for Tracker {
    type Component = SpriteComponent;
    type Shadow = ComponentId;

    fn generate(&self, _entity: EntityHandle, component: &SpriteComponent, _scene: &Scene) -> ComponentId {
        component.id()
    }

    fn validate(&self, component: &SpriteComponent, shadow: &ComponentId) -> bool {
        component.id() == *shadow
    }

    fn register(&self, shadow: &mut ComponentId) {
        self.registered.lock().push(*shadow);
    }

    fn on_removed(&self, entity: EntityHandle, shadow: ComponentId) {
        self.removed.lock().push((entity, shadow));
    }
}

fn pump(table: &mut ComponentAssociationTable<Tracker>, scene: &mut Scene) {
    for change in scene.drain_component_changes() {
        table.on_change(scene, &change);
    }
}

fn sprite() -> SpriteComponent {
    SpriteComponent::new(Vec2::ONE)
}

// ============================================================================
// Dependencies
// ============================================================================

#[test]
fn association_waits_for_transform() {
    let mut scene = Scene::new();
    let mut table = ComponentAssociationTable::new(Tracker::default());

    let e = scene.create_bare_entity("late");
    scene.add_component(e, sprite()).unwrap();
    pump(&mut table, &mut scene);
    assert!(!table.contains(e));
    assert!(table.processor().registered.lock().is_empty());

    scene.add_transform(e, TransformNode::new()).unwrap();
    pump(&mut table, &mut scene);
    assert!(table.contains(e));
    assert_eq!(table.len(), 1);
    assert_eq!(table.processor().registered.lock().len(), 1);
}

#[test]
fn removing_transform_drops_association() {
    let mut scene = Scene::new();
    let mut table = ComponentAssociationTable::new(Tracker::default());

    let e = scene.create_entity("e");
    scene.add_component(e, sprite()).unwrap();
    pump(&mut table, &mut scene);
    let id = scene.get_component::<SpriteComponent>(e).unwrap().id();

    scene.remove_transform(e);
    pump(&mut table, &mut scene);

    assert!(!table.contains(e));
    assert_eq!(*table.processor().removed.lock(), vec![(e, id)]);
}

#[test]
fn removing_entity_drops_association_once() {
    let mut scene = Scene::new();
    let mut table = ComponentAssociationTable::new(Tracker::default());

    let e = scene.create_entity("e");
    scene.add_component(e, sprite()).unwrap();
    pump(&mut table, &mut scene);

    scene.remove_entity(e);
    pump(&mut table, &mut scene);

    assert!(table.is_empty());
    assert_eq!(table.processor().removed.lock().len(), 1);
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn removal_preserves_order_of_remaining_associations() {
    let mut scene = Scene::new();
    let mut table = ComponentAssociationTable::new(Tracker::default());

    let entities: Vec<_> = (0..5).map(|i| scene.create_entity(&format!("e{i}"))).collect();
    for &e in &entities {
        scene.add_component(e, sprite()).unwrap();
    }
    pump(&mut table, &mut scene);

    scene.remove_component::<SpriteComponent>(entities[1]);
    scene.remove_component::<SpriteComponent>(entities[3]);
    pump(&mut table, &mut scene);

    let order: Vec<_> = table.keys().iter().map(|k| k.entity).collect();
    assert_eq!(order, vec![entities[0], entities[2], entities[4]]);
    for &e in &[entities[0], entities[2], entities[4]] {
        assert_eq!(table.key(e).map(|k| k.entity), Some(e));
    }
}

// ============================================================================
// Replacement
// ============================================================================

#[test]
fn replaced_component_regenerates_association() {
    let mut scene = Scene::new();
    let mut table = ComponentAssociationTable::new(Tracker::default());

    let e = scene.create_entity("e");
    scene.add_component(e, sprite()).unwrap();
    pump(&mut table, &mut scene);
    let old = table.key(e).unwrap().component;

    scene.add_component(e, sprite()).unwrap();
    pump(&mut table, &mut scene);
    let new = table.key(e).unwrap().component;

    assert_ne!(old, new);
    assert_eq!(table.len(), 1);
    assert_eq!(*table.processor().removed.lock(), vec![(e, old)]);
    assert_eq!(*table.get(e).unwrap(), new);
}

#[test]
fn validate_all_catches_silent_swap() {
    let mut scene = Scene::new();
    let mut table = ComponentAssociationTable::new(Tracker::default());

    let a = scene.create_entity("a");
    let b = scene.create_entity("b");
    scene.add_component(a, sprite()).unwrap();
    scene.add_component(b, sprite()).unwrap();
    pump(&mut table, &mut scene);
    assert_eq!(table.validate_all(&scene), 0);

    // Swap through a mutable borrow, bypassing the journal.
    *scene.get_component_mut::<SpriteComponent>(a).unwrap() = sprite();
    scene.drain_component_changes();

    assert_eq!(table.validate_all(&scene), 1);
    let current = scene.get_component::<SpriteComponent>(a).unwrap().id();
    assert_eq!(table.key(a).unwrap().component, current);
    assert_eq!(table.len(), 2);
}

#[test]
fn clear_tears_down_everything() {
    let mut scene = Scene::new();
    let mut table = ComponentAssociationTable::new(Tracker::default());
    for i in 0..3 {
        let e = scene.create_entity(&format!("e{i}"));
        scene.add_component(e, sprite()).unwrap();
    }
    pump(&mut table, &mut scene);

    table.clear();
    assert!(table.is_empty());
    assert_eq!(table.processor().removed.lock().len(), 3);
}
