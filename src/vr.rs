//! VR device abstraction.
//!
//! The transform pass seeds hand-tracked nodes from a [`VrDevice`] carried by
//! the [`EngineContext`](crate::context::EngineContext). There is no global
//! device: scenes without a context device simply keep their authored poses.

use glam::{Quat, Vec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VrHand {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    Valid,
    /// Tracked before, currently lost (e.g. controller behind the user).
    OutOfRange,
    #[default]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrButton {
    Trigger,
    Grip,
    Primary,
    Secondary,
    Menu,
}

/// Pose of a tracked device in tracking space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DevicePose {
    pub state: TrackingState,
    pub position: Vec3,
    pub rotation: Quat,
}

impl DevicePose {
    #[must_use]
    pub fn valid(position: Vec3, rotation: Quat) -> Self {
        Self {
            state: TrackingState::Valid,
            position,
            rotation,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state == TrackingState::Valid
    }
}

impl Default for DevicePose {
    fn default() -> Self {
        Self {
            state: TrackingState::Invalid,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// A tracked VR runtime.
///
/// Queried concurrently from the transform pass workers, hence `Send + Sync`.
pub trait VrDevice: Send + Sync {
    fn hand_pose(&self, hand: VrHand) -> DevicePose;

    fn button_pressed(&self, hand: VrHand, button: VrButton) -> bool;

    /// Thumbstick / touchpad position in `[-1, 1]`.
    fn axis(&self, hand: VrHand) -> Vec2;
}
