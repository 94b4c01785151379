use slotmap::new_key_type;
use std::sync::Arc;

use crate::assets::storage::AssetStorage;
use crate::resources::material::Material;
use crate::resources::model::Model;

// Strongly-typed handles
new_key_type! {
    pub struct ModelHandle;
    pub struct MaterialHandle;
}

/// Central asset storage. Cheap to clone; clones share storage.
///
/// Loading and decoding happen elsewhere: everything here is already resolved
/// by the time the scene core reads it.
#[derive(Clone)]
pub struct AssetServer {
    pub models: Arc<AssetStorage<ModelHandle, Model>>,
    pub materials: Arc<AssetStorage<MaterialHandle, Material>>,
}

impl Default for AssetServer {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetServer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            models: Arc::new(AssetStorage::new()),
            materials: Arc::new(AssetStorage::new()),
        }
    }

    #[inline]
    pub fn get_model(&self, handle: ModelHandle) -> Option<Arc<Model>> {
        self.models.get(handle)
    }

    #[inline]
    pub fn get_material(&self, handle: MaterialHandle) -> Option<Arc<Material>> {
        self.materials.get(handle)
    }
}
