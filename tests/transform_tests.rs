//! Transform and TransformSystem tests
//!
//! Tests for:
//! - Transform TRS operations and dirty checking
//! - World matrix propagation through chains (rotation + non-uniform scale)
//! - Idempotence of repeated passes
//! - Immobility, hierarchy modes and direct matrix injection
//! - Sub-scene offsets
//! - Post-operations
//! - Single-node updates with and without recursion
//! - Link scheduling when a link falls back to the parent
//! - VR hand seeding

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
use std::sync::Arc;

use glam::{Affine3A, Mat4, Quat, Vec2, Vec3};
use parking_lot::Mutex;

use myth_scene::context::EngineContext;
use myth_scene::scene::transform_system::update_world_matrix;
use myth_scene::scene::{
    EntityHandle, HierarchyMode, Immobility, LinkContext, Scene, Transform, TransformLink, TransformNode,
    TransformSystem,
};
use myth_scene::vr::{DevicePose, TrackingState, VrButton, VrDevice, VrHand};

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-5;

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    a.abs_diff_eq(b, EPSILON)
}

fn mat_approx(a: &Affine3A, b: &Affine3A) -> bool {
    Mat4::from(*a).abs_diff_eq(Mat4::from(*b), 1e-4)
}

fn world_of(scene: &Scene, e: EntityHandle) -> Affine3A {
    *scene.transform(e).unwrap().world_matrix()
}

fn local_of(scene: &Scene, e: EntityHandle) -> Affine3A {
    *scene.transform(e).unwrap().local_matrix()
}

/// a -> b -> c with rotations and non-uniform scale at every level.
fn build_chain(scene: &mut Scene) -> (EntityHandle, EntityHandle, EntityHandle) {
    let a = scene
        .build_entity("a")
        .with_position(1.0, 2.0, 3.0)
        .with_rotation(Quat::from_rotation_y(FRAC_PI_4))
        .build()
        .unwrap();
    let b = scene
        .build_entity("b")
        .with_position(0.0, 5.0, 0.0)
        .with_rotation(Quat::from_rotation_x(FRAC_PI_2))
        .with_parent(a)
        .build()
        .unwrap();
    let c = scene
        .build_entity("c")
        .with_position(-2.0, 0.0, 1.0)
        .with_parent(b)
        .build()
        .unwrap();

    scene.transform_mut(a).unwrap().transform.scale = Vec3::new(2.0, 1.0, 1.0);
    scene.transform_mut(b).unwrap().transform.scale = Vec3::new(1.0, 3.0, 0.5);
    (a, b, c)
}

// ============================================================================
// Transform Unit Tests
// ============================================================================

#[test]
fn transform_default_is_identity() {
    let t = Transform::new();
    assert_eq!(t.position, Vec3::ZERO);
    assert_eq!(t.rotation, Quat::IDENTITY);
    assert_eq!(t.scale, Vec3::ONE);
    assert!(t.use_trs);
}

#[test]
fn transform_update_local_matrix_dirty_check() {
    let mut t = Transform::new();

    // First call always reports a change
    assert!(t.update_local_matrix());
    assert!(!t.update_local_matrix());

    t.position = Vec3::new(1.0, 2.0, 3.0);
    assert!(t.update_local_matrix());
    assert!(!t.update_local_matrix());

    t.rotation = Quat::from_rotation_y(FRAC_PI_2);
    assert!(t.update_local_matrix());
    assert!(!t.update_local_matrix());

    t.scale = Vec3::splat(2.0);
    assert!(t.update_local_matrix());
    assert!(!t.update_local_matrix());

    t.mark_dirty();
    assert!(t.update_local_matrix());
}

#[test]
fn transform_euler_roundtrip() {
    let mut t = Transform::new();
    let (x, y, z) = (0.3, 0.7, 1.2);
    t.set_rotation_euler(x, y, z);

    let euler = t.rotation_euler();
    assert!(vec3_approx(euler, Vec3::new(x, y, z)));
}

#[test]
fn transform_apply_local_matrix_decomposes() {
    let mut t = Transform::new();
    let m = Affine3A::from_scale_rotation_translation(
        Vec3::new(1.0, 2.0, 3.0),
        Quat::from_rotation_z(FRAC_PI_4),
        Vec3::new(4.0, 5.0, 6.0),
    );
    t.apply_local_matrix(m);

    assert!(vec3_approx(t.position, Vec3::new(4.0, 5.0, 6.0)));
    assert!(vec3_approx(t.scale, Vec3::new(1.0, 2.0, 3.0)));
    assert!(t.rotation.abs_diff_eq(Quat::from_rotation_z(FRAC_PI_4), EPSILON));
    assert!(t.update_local_matrix());
    assert!(mat_approx(t.local_matrix(), &m));
}

// ============================================================================
// Propagation
// ============================================================================

#[test]
fn chain_world_equals_product_of_locals() {
    let mut scene = Scene::new();
    let (a, b, c) = build_chain(&mut scene);

    let mut system = TransformSystem::new();
    system.update(&mut scene, &EngineContext::default());

    let expected = local_of(&scene, a) * local_of(&scene, b) * local_of(&scene, c);
    assert!(mat_approx(&world_of(&scene, c), &expected));
    assert!(mat_approx(&world_of(&scene, a), &local_of(&scene, a)));
}

#[test]
fn repeated_pass_is_idempotent() {
    let mut scene = Scene::new();
    let (a, b, c) = build_chain(&mut scene);
    let ctx = EngineContext::default();

    let mut system = TransformSystem::new();
    let first = system.update(&mut scene, &ctx);
    assert_eq!(first.updated, 3);
    assert!(first.batches_rebuilt);

    let before: Vec<_> = [a, b, c].iter().map(|&e| world_of(&scene, e)).collect();
    let second = system.update(&mut scene, &ctx);
    let after: Vec<_> = [a, b, c].iter().map(|&e| world_of(&scene, e)).collect();

    assert_eq!(before, after);
    assert_eq!(second.updated, 0);
    assert!(!second.batches_rebuilt);
}

#[test]
fn parent_change_propagates_to_descendants() {
    let mut scene = Scene::new();
    let (a, _, c) = build_chain(&mut scene);
    let ctx = EngineContext::default();
    let mut system = TransformSystem::new();
    system.update(&mut scene, &ctx);

    let before = world_of(&scene, c);
    scene.transform_mut(a).unwrap().transform.position += Vec3::new(0.0, 10.0, 0.0);
    let stats = system.update(&mut scene, &ctx);

    assert_eq!(stats.updated, 3);
    let delta = Vec3::from(world_of(&scene, c).translation) - Vec3::from(before.translation);
    assert!(vec3_approx(delta, Vec3::new(0.0, 10.0, 0.0)));
}

#[test]
fn reparent_updates_world_on_next_pass() {
    let mut scene = Scene::new();
    let p1 = scene.build_entity("p1").with_position(10.0, 0.0, 0.0).build().unwrap();
    let p2 = scene.build_entity("p2").with_position(0.0, 10.0, 0.0).build().unwrap();
    let child = scene.build_entity("child").with_parent(p1).build().unwrap();
    let ctx = EngineContext::default();
    let mut system = TransformSystem::new();
    system.update(&mut scene, &ctx);
    assert!(vec3_approx(scene.transform(child).unwrap().world_position(), Vec3::new(10.0, 0.0, 0.0)));

    scene.set_parent(child, Some(p2)).unwrap();
    let stats = system.update(&mut scene, &ctx);
    assert!(stats.batches_rebuilt);
    assert!(vec3_approx(scene.transform(child).unwrap().world_position(), Vec3::new(0.0, 10.0, 0.0)));
}

// ============================================================================
// Immobility
// ============================================================================

#[test]
fn just_me_immobile_freezes_only_the_node() {
    let mut scene = Scene::new();
    let statue = scene.create_entity("statue");
    let bird = scene.build_entity("bird").with_parent(statue).build().unwrap();
    scene.transform_mut(statue).unwrap().immobility = Immobility::JustMeImmobile;

    let ctx = EngineContext::default();
    let mut system = TransformSystem::new();
    system.update(&mut scene, &ctx);

    scene.transform_mut(statue).unwrap().transform.position = Vec3::X * 5.0;
    scene.transform_mut(bird).unwrap().transform.position = Vec3::Y;
    let stats = system.update(&mut scene, &ctx);

    assert_eq!(stats.frozen, 1);
    assert!(vec3_approx(scene.transform(statue).unwrap().world_position(), Vec3::ZERO));
    assert!(vec3_approx(scene.transform(bird).unwrap().world_position(), Vec3::Y));

    // An explicit refresh picks up the pending position once.
    scene.transform_mut(statue).unwrap().mark_dirty();
    system.update(&mut scene, &ctx);
    assert!(vec3_approx(scene.transform(statue).unwrap().world_position(), Vec3::X * 5.0));
}

#[test]
fn everything_immobile_freezes_subtree() {
    let mut scene = Scene::new();
    let building = scene.create_entity("building");
    let window = scene.build_entity("window").with_parent(building).build().unwrap();
    scene.transform_mut(building).unwrap().immobility = Immobility::EverythingImmobile;

    let ctx = EngineContext::default();
    let mut system = TransformSystem::new();
    system.update(&mut scene, &ctx);

    scene.transform_mut(window).unwrap().transform.position = Vec3::Z * 3.0;
    let stats = system.update(&mut scene, &ctx);

    assert_eq!(stats.frozen, 2);
    assert!(vec3_approx(scene.transform(window).unwrap().world_position(), Vec3::ZERO));
}

// ============================================================================
// Hierarchy modes & matrix injection
// ============================================================================

#[test]
fn ignore_all_rotation_inherits_translation_only() {
    let mut scene = Scene::new();
    let turret = scene
        .build_entity("turret")
        .with_position(0.0, 1.0, 0.0)
        .with_rotation(Quat::from_rotation_y(FRAC_PI_2))
        .build()
        .unwrap();
    let label = scene
        .build_entity("label")
        .with_position(1.0, 0.0, 0.0)
        .with_parent(turret)
        .build()
        .unwrap();
    scene.transform_mut(label).unwrap().hierarchy_mode = HierarchyMode::IgnoreAllRotation;

    let mut system = TransformSystem::new();
    system.update(&mut scene, &EngineContext::default());

    let (_, rotation, translation) = world_of(&scene, label).to_scale_rotation_translation();
    assert!(rotation.abs_diff_eq(Quat::IDENTITY, EPSILON));
    assert!(vec3_approx(translation, Vec3::new(1.0, 1.0, 0.0)));
}

#[test]
fn injected_local_matrix_is_used_verbatim() {
    let mut scene = Scene::new();
    let e = scene.create_entity("tracked");
    let m = Affine3A::from_scale_rotation_translation(Vec3::ONE, Quat::from_rotation_x(0.3), Vec3::new(7.0, 0.0, 0.0));
    scene.transform_mut(e).unwrap().set_local_matrix(m);

    let mut system = TransformSystem::new();
    system.update(&mut scene, &EngineContext::default());
    assert!(mat_approx(&world_of(&scene, e), &m));
}

// ============================================================================
// Sub-scenes
// ============================================================================

#[test]
fn sub_scene_offset_places_roots() {
    let mut scene = Scene::new();
    let level = scene
        .add_sub_scene(scene.root_scene(), "level", Vec3::new(100.0, 0.0, 0.0))
        .unwrap();
    let crate_entity = scene.create_entity_in(level, "crate").unwrap();
    scene.transform_mut(crate_entity).unwrap().transform.position = Vec3::Y;

    let ctx = EngineContext::default();
    let mut system = TransformSystem::new();
    system.update(&mut scene, &ctx);
    assert!(vec3_approx(
        scene.transform(crate_entity).unwrap().world_position(),
        Vec3::new(100.0, 1.0, 0.0)
    ));

    scene.set_scene_offset(level, Vec3::new(-100.0, 0.0, 0.0)).unwrap();
    system.update(&mut scene, &ctx);
    assert!(vec3_approx(
        scene.transform(crate_entity).unwrap().world_position(),
        Vec3::new(-100.0, 1.0, 0.0)
    ));
}

// ============================================================================
// Post-operations
// ============================================================================

#[test]
fn post_operations_run_in_order_after_world() {
    let mut scene = Scene::new();
    let e = scene.build_entity("e").with_position(0.0, -5.0, 0.0).build().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&log);
    scene
        .add_post_operation(
            e,
            Arc::new(move |_: EntityHandle, node: &mut TransformNode| {
                first.lock().push(("first", node.world_position().y));
            }),
        )
        .unwrap();

    let second = Arc::clone(&log);
    scene
        .add_post_operation(
            e,
            Arc::new(move |_: EntityHandle, node: &mut TransformNode| {
                // Clamp above the ground plane.
                let mut world = *node.world_matrix();
                world.translation.y = world.translation.y.max(0.0);
                node.override_world_matrix(world);
                second.lock().push(("second", node.world_position().y));
            }),
        )
        .unwrap();

    let mut system = TransformSystem::new();
    system.update(&mut scene, &EngineContext::default());

    assert_eq!(*log.lock(), vec![("first", -5.0), ("second", 0.0)]);
    assert!(vec3_approx(scene.transform(e).unwrap().world_position(), Vec3::ZERO));
}

// ============================================================================
// Single-node update
// ============================================================================

#[test]
fn single_update_recurses_to_root() {
    let mut scene = Scene::new();
    let root = scene.create_entity("root");
    let mid = scene.build_entity("mid").with_parent(root).build().unwrap();
    let leaf = scene.build_entity("leaf").with_position(0.0, 0.0, 1.0).with_parent(mid).build().unwrap();

    let ctx = EngineContext::default();
    let mut system = TransformSystem::new();
    system.update(&mut scene, &ctx);

    scene.transform_mut(root).unwrap().transform.position = Vec3::X * 4.0;

    // Without recursion the stale parent world is used.
    update_world_matrix(&mut scene, leaf, false, false, &ctx).unwrap();
    assert!(vec3_approx(scene.transform(leaf).unwrap().world_position(), Vec3::Z));

    update_world_matrix(&mut scene, leaf, true, false, &ctx).unwrap();
    assert!(vec3_approx(scene.transform(leaf).unwrap().world_position(), Vec3::new(4.0, 0.0, 1.0)));
    assert!(vec3_approx(scene.transform(mid).unwrap().world_position(), Vec3::X * 4.0));
}

#[test]
fn single_update_of_unknown_entity_fails() {
    let mut scene = Scene::new();
    let e = scene.create_entity("gone");
    scene.remove_entity(e);
    assert!(update_world_matrix(&mut scene, e, true, true, &EngineContext::default()).is_err());
}

#[test]
fn full_pass_after_single_update_refreshes_siblings() {
    let mut scene = Scene::new();
    let root = scene.create_entity("root");
    let a = scene.build_entity("a").with_parent(root).build().unwrap();
    let b = scene.build_entity("b").with_position(0.0, 0.0, 1.0).with_parent(root).build().unwrap();

    let ctx = EngineContext::default();
    let mut system = TransformSystem::new();
    system.update(&mut scene, &ctx);

    // Refreshing `a` with recursion consumes the root's local change.
    scene.transform_mut(root).unwrap().transform.position = Vec3::X * 4.0;
    update_world_matrix(&mut scene, a, true, false, &ctx).unwrap();
    system.update(&mut scene, &ctx);

    assert!(vec3_approx(scene.transform(root).unwrap().world_position(), Vec3::X * 4.0));
    assert!(vec3_approx(scene.transform(b).unwrap().world_position(), Vec3::new(4.0, 0.0, 1.0)));

    let idle = system.update(&mut scene, &ctx);
    assert_eq!(idle.updated, 0);
}

// ============================================================================
// Links
// ============================================================================

/// Link that never produces a matrix, so the node falls back to its parent.
struct DetachedLink(EntityHandle);

impl TransformLink for DetachedLink {
    fn dependency(&self) -> Option<EntityHandle> {
        Some(self.0)
    }

    fn compute_matrix(&self, _ctx: &LinkContext<'_>) -> Option<Affine3A> {
        None
    }
}

#[test]
fn link_fallback_reads_current_parent_world() {
    let mut scene = Scene::new();
    let target = scene.create_entity("target");
    let p0 = scene.create_entity("p0");
    let p1 = scene.build_entity("p1").with_parent(p0).build().unwrap();
    let x = scene.build_entity("x").with_parent(p1).build().unwrap();
    scene.set_link(x, Some(Arc::new(DetachedLink(target)))).unwrap();

    let ctx = EngineContext::default();
    let mut system = TransformSystem::new();
    system.update(&mut scene, &ctx);

    scene.transform_mut(p0).unwrap().transform.position = Vec3::Y * 3.0;
    system.update(&mut scene, &ctx);

    assert_eq!(system.batches().level_of(x), Some(2));
    assert!(vec3_approx(scene.transform(x).unwrap().world_position(), Vec3::new(0.0, 3.0, 0.0)));
}

// ============================================================================
// VR seeding
// ============================================================================

struct FakeHeadset {
    right: Mutex<DevicePose>,
}

impl VrDevice for FakeHeadset {
    fn hand_pose(&self, hand: VrHand) -> DevicePose {
        match hand {
            VrHand::Right => *self.right.lock(),
            VrHand::Left => DevicePose::default(),
        }
    }

    fn button_pressed(&self, _hand: VrHand, _button: VrButton) -> bool {
        false
    }

    fn axis(&self, _hand: VrHand) -> Vec2 {
        Vec2::ZERO
    }
}

#[test]
fn tracked_hand_keeps_last_pose_when_tracking_is_lost() {
    let headset = Arc::new(FakeHeadset {
        right: Mutex::new(DevicePose::valid(Vec3::new(0.2, 1.4, -0.3), Quat::IDENTITY)),
    });
    let ctx = EngineContext::default().with_vr(headset.clone());

    let mut scene = Scene::new();
    let hand = scene.create_entity("right_hand");
    scene.transform_mut(hand).unwrap().track_vr_hand = Some(VrHand::Right);

    let mut system = TransformSystem::new();
    system.update(&mut scene, &ctx);
    assert!(vec3_approx(scene.transform(hand).unwrap().world_position(), Vec3::new(0.2, 1.4, -0.3)));

    *headset.right.lock() = DevicePose {
        state: TrackingState::OutOfRange,
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };
    system.update(&mut scene, &ctx);
    assert!(vec3_approx(scene.transform(hand).unwrap().world_position(), Vec3::new(0.2, 1.4, -0.3)));
}
