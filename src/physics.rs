//! Physics bridge.
//!
//! Rigid bodies are owned by a simulation that runs on one designated
//! thread. Anything that touches body state from elsewhere goes through
//! [`SimulationQueue::safe_run`]: on the simulation thread the closure runs
//! immediately, on any other thread it is queued and drained at the start of
//! the next [`PhysicsWorld::step`].
//!
//! The transform side only sees poses:
//! - [`pull_dynamic_poses`] copies simulated poses of dynamic bodies into
//!   their transform nodes before the transform pass.
//! - [`push_kinematic_poses`] sends world poses of kinematic bodies to the
//!   simulation after the transform pass.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use flume::{Receiver, Sender};
use glam::{Affine3A, Quat, Vec3};
use parking_lot::Mutex;

use crate::scene::{ComponentId, Scene};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Funnel for work that must run on the simulation thread.
#[derive(Clone)]
pub struct SimulationQueue {
    sim_thread: Arc<Mutex<Option<ThreadId>>>,
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl Default for SimulationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationQueue {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sim_thread: Arc::new(Mutex::new(None)),
            sender,
            receiver,
        }
    }

    /// Makes the calling thread the simulation thread.
    pub fn bind_current_thread(&self) {
        *self.sim_thread.lock() = Some(thread::current().id());
    }

    #[must_use]
    pub fn is_simulation_thread(&self) -> bool {
        *self.sim_thread.lock() == Some(thread::current().id())
    }

    /// Runs `job` now on the simulation thread, otherwise queues it.
    pub fn safe_run(&self, job: impl FnOnce() + Send + 'static) {
        if self.is_simulation_thread() {
            job();
        } else if self.sender.send(Box::new(job)).is_ok() {
            log::trace!("Queued a physics job for the simulation thread");
        } else {
            log::error!("Simulation queue is closed, dropping a physics job");
        }
    }

    /// Runs every queued job. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        for job in self.receiver.try_iter() {
            job();
            count += 1;
        }
        count
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

// ============================================================================
// Rigid bodies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    /// Axis * radians per second.
    pub angular_velocity: Vec3,
    last_position: Vec3,
    last_rotation: Quat,
}

impl BodyState {
    fn at(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            last_position: position,
            last_rotation: rotation,
        }
    }
}

/// Shared handle to one simulated body. Clones refer to the same body.
#[derive(Clone)]
pub struct RigidBody {
    state: Arc<Mutex<BodyState>>,
    queue: SimulationQueue,
}

impl RigidBody {
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.state.lock().position
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.state.lock().rotation
    }

    #[must_use]
    pub fn state(&self) -> BodyState {
        *self.state.lock()
    }

    /// Translation during the last simulation step.
    #[must_use]
    pub fn linear_delta(&self) -> Vec3 {
        let s = self.state.lock();
        s.position - s.last_position
    }

    /// Rotation during the last simulation step.
    #[must_use]
    pub fn angular_delta(&self) -> Quat {
        let s = self.state.lock();
        (s.rotation * s.last_rotation.inverse()).normalize()
    }

    pub fn set_pose(&self, position: Vec3, rotation: Quat) {
        let body = self.clone();
        self.queue.safe_run(move || body.write_pose(position, rotation));
    }

    /// Writes the pose without going through the queue. Simulation thread only.
    fn write_pose(&self, position: Vec3, rotation: Quat) {
        let mut s = self.state.lock();
        s.position = position;
        s.rotation = rotation;
    }

    pub fn set_linear_velocity(&self, velocity: Vec3) {
        let state = Arc::clone(&self.state);
        self.queue.safe_run(move || state.lock().linear_velocity = velocity);
    }

    pub fn set_angular_velocity(&self, velocity: Vec3) {
        let state = Arc::clone(&self.state);
        self.queue.safe_run(move || state.lock().angular_velocity = velocity);
    }
}

/// Minimal integrator standing in for a physics backend.
pub struct PhysicsWorld {
    queue: SimulationQueue,
    bodies: Vec<RigidBody>,
    pub gravity: Vec3,
}

impl PhysicsWorld {
    #[must_use]
    pub fn new(queue: SimulationQueue) -> Self {
        Self {
            queue,
            bodies: Vec::new(),
            gravity: Vec3::ZERO,
        }
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &SimulationQueue {
        &self.queue
    }

    pub fn create_body(&mut self, position: Vec3, rotation: Quat) -> RigidBody {
        let body = RigidBody {
            state: Arc::new(Mutex::new(BodyState::at(position, rotation))),
            queue: self.queue.clone(),
        };
        self.bodies.push(body.clone());
        body
    }

    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Drains queued jobs, then integrates every body by `dt` seconds.
    ///
    /// Call on the simulation thread.
    pub fn step(&mut self, dt: f32) {
        if !self.queue.is_simulation_thread() {
            log::warn!("PhysicsWorld::step called off the simulation thread");
        }
        self.queue.run_pending();

        for body in &self.bodies {
            let mut s = body.state.lock();
            s.last_position = s.position;
            s.last_rotation = s.rotation;

            s.linear_velocity += self.gravity * dt;
            let velocity = s.linear_velocity;
            s.position += velocity * dt;
            let spin = Quat::from_scaled_axis(s.angular_velocity * dt);
            s.rotation = (spin * s.rotation).normalize();
        }
    }
}

// ============================================================================
// Component & frame steps
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    /// Driven by the simulation; the transform follows the body.
    #[default]
    Dynamic,
    /// Driven by the transform; the body follows the node.
    Kinematic,
}

pub struct RigidBodyComponent {
    pub(crate) id: ComponentId,
    pub body: RigidBody,
    pub kind: BodyKind,
}

impl RigidBodyComponent {
    #[must_use]
    pub fn new(body: RigidBody, kind: BodyKind) -> Self {
        Self {
            id: ComponentId::next(),
            body,
            kind,
        }
    }
}

/// Copies dynamic body poses into transform nodes. Returns the count.
///
/// Body poses are world-space; parented nodes receive them relative to the
/// parent's world matrix of the previous frame.
pub fn pull_dynamic_poses(scene: &mut Scene) -> usize {
    let mut poses = Vec::new();
    for (entity, component) in &scene.bodies {
        if component.kind != BodyKind::Dynamic {
            continue;
        }
        let state = component.body.state();
        let world = Affine3A::from_rotation_translation(state.rotation, state.position);
        let parent_world = scene
            .parent(entity)
            .and_then(|p| scene.transform(p))
            .map(|n| *n.world_matrix());
        let local = match parent_world {
            Some(parent) => parent.inverse() * world,
            None => world,
        };
        poses.push((entity, local));
    }

    let count = poses.len();
    for (entity, local) in poses {
        let Some(node) = scene.transform_mut(entity) else {
            continue;
        };
        let (_, rotation, translation) = local.to_scale_rotation_translation();
        node.transform.position = translation;
        node.transform.rotation = rotation;
    }
    count
}

/// Sends world poses of kinematic bodies to the simulation. Returns the count.
///
/// With a `funnel` (the engine context's queue) all poses of the frame travel
/// as one job; without one each body uses its own queue.
pub fn push_kinematic_poses(scene: &Scene, funnel: Option<&SimulationQueue>) -> usize {
    let mut poses = Vec::new();
    for (entity, component) in &scene.bodies {
        if component.kind != BodyKind::Kinematic {
            continue;
        }
        let Some(node) = scene.transform(entity) else {
            continue;
        };
        let (_, rotation, translation) = node.world_matrix().to_scale_rotation_translation();
        poses.push((component.body.clone(), translation, rotation));
    }

    let count = poses.len();
    match funnel {
        Some(queue) if count > 0 => queue.safe_run(move || {
            for (body, position, rotation) in poses {
                body.write_pose(position, rotation);
            }
        }),
        Some(_) => {}
        None => {
            for (body, position, rotation) in poses {
                body.set_pose(position, rotation);
            }
        }
    }
    count
}
