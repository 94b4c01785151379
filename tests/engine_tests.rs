//! Engine frame tests
//!
//! Tests for:
//! - Frame ordering and statistics
//! - Physics pose exchange (dynamic pull, kinematic push, thread funnel)
//! - Bone sockets through model node links
//! - Sprite synchronization
//! - Settings loaded from JSON

use std::sync::Arc;

use glam::{Quat, Vec2, Vec3};

use myth_scene::assets::AssetServer;
use myth_scene::render::{RenderGroup, RenderGroupMask};
use myth_scene::resources::{BoundingBox, MeshDefinition, Model, SkeletonDefinition, SkeletonNodeDefinition};
use myth_scene::scene::{ModelComponent, ModelNodeLink, SpriteComponent};
use myth_scene::{
    BodyKind, Engine, EngineContext, EngineSettings, PhysicsWorld, RigidBodyComponent, SimulationQueue,
};

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-5;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    a.abs_diff_eq(b, EPSILON)
}

fn arm_model() -> Model {
    let mut model = Model::new("arm");
    model.skeleton = Some(SkeletonDefinition {
        nodes: vec![
            SkeletonNodeDefinition::new("shoulder", None, Vec3::new(0.0, 1.0, 0.0)),
            SkeletonNodeDefinition::new("hand", Some(0), Vec3::new(2.0, 0.0, 0.0)),
        ],
    });
    model
        .meshes
        .push(MeshDefinition::new("arm", 0, BoundingBox::new(Vec3::ZERO, Vec3::ONE)));
    model
}

// ============================================================================
// Frame
// ============================================================================

#[test]
fn frame_counter_and_stats() {
    init_logger();
    let assets = AssetServer::new();
    let mut engine = Engine::default();
    let mut scene = engine.create_scene();
    let root = scene.create_entity("root");
    scene.build_entity("child").with_parent(root).build().unwrap();

    let first = engine.update_frame(&mut scene, &assets);
    let second = engine.update_frame(&mut scene, &assets);

    assert_eq!(first.frame, 0);
    assert_eq!(second.frame, 1);
    assert_eq!(engine.frame_count(), 2);
    assert_eq!(first.transforms.levels, 2);
    assert_eq!(first.transforms.updated, 2);
    assert_eq!(second.transforms.updated, 0);
    assert!(first.render.changes >= 2);
    assert_eq!(second.render.changes, 0);
}

#[test]
fn engine_update_world_matrix_between_frames() {
    let assets = AssetServer::new();
    let mut engine = Engine::default();
    let mut scene = engine.create_scene();
    let root = scene.create_entity("root");
    let leaf = scene.build_entity("leaf").with_parent(root).build().unwrap();
    engine.update_frame(&mut scene, &assets);

    scene.transform_mut(root).unwrap().transform.position = Vec3::Y * 2.0;
    engine.update_world_matrix(&mut scene, leaf, true, true).unwrap();

    assert!(vec3_approx(scene.transform(leaf).unwrap().world_position(), Vec3::Y * 2.0));
}

// ============================================================================
// Physics
// ============================================================================

#[test]
fn dynamic_body_drives_transform() {
    let assets = AssetServer::new();
    let queue = SimulationQueue::new();
    queue.bind_current_thread();
    let mut physics = PhysicsWorld::new(queue);
    let body = physics.create_body(Vec3::ZERO, Quat::IDENTITY);
    body.set_linear_velocity(Vec3::new(0.0, -1.0, 0.0));

    let mut engine = Engine::default();
    let mut scene = engine.create_scene();
    let crate_entity = scene.create_entity("crate");
    scene
        .add_component(crate_entity, RigidBodyComponent::new(body.clone(), BodyKind::Dynamic))
        .unwrap();

    physics.step(2.0);
    let stats = engine.update_frame(&mut scene, &assets);

    assert_eq!(stats.bodies_pulled, 1);
    assert_eq!(stats.bodies_pushed, 0);
    assert!(vec3_approx(
        scene.transform(crate_entity).unwrap().world_position(),
        Vec3::new(0.0, -2.0, 0.0)
    ));
}

#[test]
fn dynamic_body_under_parent_keeps_world_pose() {
    let assets = AssetServer::new();
    let queue = SimulationQueue::new();
    queue.bind_current_thread();
    let mut physics = PhysicsWorld::new(queue);
    let body = physics.create_body(Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY);

    let mut engine = Engine::default();
    let mut scene = engine.create_scene();
    let platform = scene.build_entity("platform").with_position(3.0, 0.0, 0.0).build().unwrap();
    let cargo = scene.build_entity("cargo").with_parent(platform).build().unwrap();
    scene
        .add_component(cargo, RigidBodyComponent::new(body, BodyKind::Dynamic))
        .unwrap();

    // First frame settles the platform, second frame pulls against it.
    engine.update_frame(&mut scene, &assets);
    engine.update_frame(&mut scene, &assets);

    let node = scene.transform(cargo).unwrap();
    assert!(vec3_approx(node.world_position(), Vec3::new(5.0, 0.0, 0.0)));
    assert!(vec3_approx(node.transform.position, Vec3::new(2.0, 0.0, 0.0)));
}

#[test]
fn kinematic_body_follows_transform() {
    let assets = AssetServer::new();
    let queue = SimulationQueue::new();
    queue.bind_current_thread();
    let mut physics = PhysicsWorld::new(queue);
    let body = physics.create_body(Vec3::ZERO, Quat::IDENTITY);

    let mut engine = Engine::default();
    let mut scene = engine.create_scene();
    let door = scene.build_entity("door").with_position(0.0, 0.0, 7.0).build().unwrap();
    scene
        .add_component(door, RigidBodyComponent::new(body.clone(), BodyKind::Kinematic))
        .unwrap();

    let stats = engine.update_frame(&mut scene, &assets);

    assert_eq!(stats.bodies_pushed, 1);
    assert!(vec3_approx(body.position(), Vec3::new(0.0, 0.0, 7.0)));
}

#[test]
fn kinematic_push_is_queued_off_the_simulation_thread() {
    init_logger();
    let assets = AssetServer::new();
    let queue = SimulationQueue::new();
    let sim = queue.clone();
    std::thread::spawn(move || sim.bind_current_thread()).join().unwrap();

    let mut physics = PhysicsWorld::new(queue.clone());
    let body = physics.create_body(Vec3::ZERO, Quat::IDENTITY);

    let mut engine = Engine::default();
    let mut scene = engine.create_scene();
    let lift = scene.build_entity("lift").with_position(0.0, 9.0, 0.0).build().unwrap();
    scene
        .add_component(lift, RigidBodyComponent::new(body.clone(), BodyKind::Kinematic))
        .unwrap();

    engine.update_frame(&mut scene, &assets);
    assert_eq!(queue.pending(), 1);
    assert_eq!(body.position(), Vec3::ZERO);

    queue.run_pending();
    assert!(vec3_approx(body.position(), Vec3::new(0.0, 9.0, 0.0)));
}

#[test]
fn context_queue_carries_all_kinematic_poses_in_one_job() {
    init_logger();
    let assets = AssetServer::new();
    let queue = SimulationQueue::new();
    let sim = queue.clone();
    std::thread::spawn(move || sim.bind_current_thread()).join().unwrap();

    let mut physics = PhysicsWorld::new(queue.clone());
    let left = physics.create_body(Vec3::ZERO, Quat::IDENTITY);
    let right = physics.create_body(Vec3::ZERO, Quat::IDENTITY);

    let mut engine = Engine::with_context(EngineContext::default().with_physics(queue.clone()));
    let mut scene = engine.create_scene();
    let a = scene.build_entity("left_door").with_position(-1.0, 0.0, 0.0).build().unwrap();
    let b = scene.build_entity("right_door").with_position(1.0, 0.0, 0.0).build().unwrap();
    scene.add_component(a, RigidBodyComponent::new(left.clone(), BodyKind::Kinematic)).unwrap();
    scene.add_component(b, RigidBodyComponent::new(right.clone(), BodyKind::Kinematic)).unwrap();

    let stats = engine.update_frame(&mut scene, &assets);
    assert_eq!(stats.bodies_pushed, 2);
    assert_eq!(queue.pending(), 1);

    assert_eq!(queue.run_pending(), 1);
    assert!(vec3_approx(left.position(), Vec3::new(-1.0, 0.0, 0.0)));
    assert!(vec3_approx(right.position(), Vec3::new(1.0, 0.0, 0.0)));
}

// ============================================================================
// Links
// ============================================================================

#[test]
fn socket_follows_skeleton_node() {
    let assets = AssetServer::new();
    let arm = assets.models.add(arm_model());

    let mut engine = Engine::default();
    let mut scene = engine.create_scene();
    let body = scene.build_entity("body").with_position(10.0, 0.0, 0.0).build().unwrap();
    scene.add_component(body, ModelComponent::new(arm)).unwrap();
    let sword = scene.build_entity("sword").with_position(0.0, 0.5, 0.0).build().unwrap();

    // The skeleton instance exists after the first frame.
    engine.update_frame(&mut scene, &assets);
    let link = ModelNodeLink::by_name(scene.models(), body, "hand").expect("hand node");
    assert_eq!(link.node_index, 1);
    scene.set_link(sword, Some(Arc::new(link))).unwrap();

    engine.update_frame(&mut scene, &assets);
    assert!(vec3_approx(
        scene.transform(sword).unwrap().world_position(),
        Vec3::new(12.0, 1.5, 0.0)
    ));
    assert_eq!(engine.transforms().batches().level_of(sword), Some(1));

    // Moving the owner moves the socket in the same frame.
    scene.transform_mut(body).unwrap().transform.position = Vec3::ZERO;
    engine.update_frame(&mut scene, &assets);
    assert!(vec3_approx(
        scene.transform(sword).unwrap().world_position(),
        Vec3::new(2.0, 1.5, 0.0)
    ));
}

// ============================================================================
// Sprites
// ============================================================================

#[test]
fn sprites_register_and_follow_transform() {
    let assets = AssetServer::new();
    let mut engine = Engine::default();
    let mut scene = engine.create_scene();
    let icon = scene.build_entity("icon").with_position(0.0, 3.0, 0.0).build().unwrap();
    scene.add_component(icon, SpriteComponent::new(Vec2::new(2.0, 1.0))).unwrap();

    let stats = engine.update_frame(&mut scene, &assets);
    assert_eq!(stats.render.sprites, 1);
    assert_eq!(stats.render.visible_objects, 1);

    let sprite = engine.render().sprites().get(icon).unwrap();
    assert!(sprite.is_registered());
    assert!(vec3_approx(sprite.bounding_box.min, Vec3::new(-1.0, 2.5, 0.0)));

    {
        let c = scene.get_component_mut::<SpriteComponent>(icon).unwrap();
        c.enabled = false;
    }
    engine.update_frame(&mut scene, &assets);
    assert!(engine.render().registry().is_empty());

    {
        let c = scene.get_component_mut::<SpriteComponent>(icon).unwrap();
        c.enabled = true;
        c.render_group = RenderGroup::new(2);
    }
    engine.update_frame(&mut scene, &assets);
    let visible = engine.render().registry().collect_visible(RenderGroupMask::GROUP_2);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].entity, icon);
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn settings_from_json_configure_scenes() -> anyhow::Result<()> {
    let settings =
        EngineSettings::from_json_str(r#"{ "transform": { "detect_cycles": false, "parallel_min_batch": 1 } }"#)?;
    let engine = Engine::new(settings);
    assert_eq!(engine.context().settings.transform.parallel_min_batch, 1);

    let mut scene = engine.create_scene();
    let a = scene.create_entity("a");
    let b = scene.build_entity("b").with_parent(a).build()?;

    // Without cycle detection the caller owns the invariant.
    scene.set_parent(a, Some(b))?;
    assert_eq!(scene.parent(a), Some(b));
    Ok(())
}
