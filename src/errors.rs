//! Error Types
//!
//! This module defines the error types used throughout the scene core.
//!
//! # Overview
//!
//! The main error type [`EngineError`] covers two families of failure:
//! - Structural hierarchy violations (self-parenting, cycles, missing transforms).
//!   These indicate a bug in the calling code and are always surfaced.
//! - Mesh data problems (missing buffers, unsupported vertex layouts).
//!   These are expected with real content and are recovered per mesh.
//!
//! A component waiting for a missing dependency is *not* an error: the
//! association simply stays inert until the dependency appears.
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_scene::errors::{EngineError, Result};
//!
//! fn reparent(scene: &mut Scene, child: EntityHandle, parent: EntityHandle) -> Result<()> {
//!     scene.set_parent(child, Some(parent))
//! }
//! ```

use thiserror::Error;

use crate::scene::{EntityHandle, SceneKey};

/// Why a hierarchy operation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyViolation {
    /// The node was asked to become its own parent.
    SelfParent,
    /// The requested parent is a descendant of the node.
    Cycle {
        /// The descendant that was proposed as the new parent.
        ancestor: EntityHandle,
    },
    /// One side of the operation has no transform node.
    MissingTransform,
}

impl std::fmt::Display for HierarchyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfParent => write!(f, "a node cannot be its own parent"),
            Self::Cycle { ancestor } => {
                write!(f, "parent {ancestor:?} is a descendant of the node")
            }
            Self::MissingTransform => write!(f, "entity has no transform node"),
        }
    }
}

/// The main error type for the scene core.
#[derive(Error, Debug)]
pub enum EngineError {
    // ========================================================================
    // Hierarchy Errors
    // ========================================================================
    /// A reparent or attach would break the tree invariants.
    #[error("Invalid hierarchy state for {entity:?}: {reason}")]
    InvalidHierarchyState {
        /// The node being reparented
        entity: EntityHandle,
        /// What went wrong
        reason: HierarchyViolation,
    },

    /// The entity handle is stale or was never issued by this scene.
    #[error("Entity not found: {0:?}")]
    EntityNotFound(EntityHandle),

    /// The sub-scene handle is stale or was never issued by this scene.
    #[error("Scene not found: {0:?}")]
    SceneNotFound(SceneKey),

    // ========================================================================
    // Mesh Data Errors
    // ========================================================================
    /// The mesh has no CPU-side vertex or index bytes to read.
    #[error("Mesh data unavailable: {mesh}")]
    MeshDataUnavailable {
        /// Name of the mesh
        mesh: String,
    },

    /// The vertex layout lacks an expected channel or uses an unknown format.
    #[error("Unsupported vertex layout in mesh {mesh}: {reason}")]
    UnsupportedVertexLayout {
        /// Name of the mesh
        mesh: String,
        /// Which channel or format was the problem
        reason: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigError(#[from] serde_json::Error),
}

/// Alias for `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;
