//! Engine Settings
//!
//! Tunables for the transform pass and the render synchronization pass.
//! Every field has a default, so partial JSON documents are accepted:
//!
//! ```rust,ignore
//! use myth_scene::EngineSettings;
//!
//! let settings = EngineSettings::from_json_str(r#"{ "transform": { "detect_cycles": false } }"#)?;
//! assert!(!settings.transform.detect_cycles);
//! assert_eq!(settings.render.default_small_object_culling_multiplier, 1.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;

// ---------------------------------------------------------------------------
// TransformSettings
// ---------------------------------------------------------------------------

/// Configuration of the hierarchy update pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSettings {
    /// Minimum number of nodes a rayon worker takes from one level batch.
    ///
    /// Small scenes stay effectively single-threaded with the default.
    pub parallel_min_batch: usize,

    /// Walk the ancestor chain on every reparent and reject cycles.
    ///
    /// Disabling this only keeps the direct self-parent check.
    pub detect_cycles: bool,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            parallel_min_batch: 64,
            detect_cycles: true,
        }
    }
}

// ---------------------------------------------------------------------------
// RenderSyncSettings
// ---------------------------------------------------------------------------

/// Configuration of the render-record synchronization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSyncSettings {
    /// Distance-sort fudge used when neither the component nor the model overrides it.
    pub default_distance_sort_fudge: f32,

    /// Small-object culling multiplier used when neither the component nor the model overrides it.
    pub default_small_object_culling_multiplier: f32,

    /// Minimum number of render records a rayon worker takes in the check/update phases.
    pub parallel_min_records: usize,
}

impl Default for RenderSyncSettings {
    fn default() -> Self {
        Self {
            default_distance_sort_fudge: 0.0,
            default_small_object_culling_multiplier: 1.0,
            parallel_min_records: 32,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineSettings
// ---------------------------------------------------------------------------

/// Top-level settings, carried by [`EngineContext`](crate::context::EngineContext).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub transform: TransformSettings,
    pub render: RenderSyncSettings,
}

impl EngineSettings {
    /// Parses settings from a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the settings to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
