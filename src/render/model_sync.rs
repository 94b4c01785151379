//! Model render synchronization.
//!
//! Every [`ModelComponent`] gets a [`ModelRenderRecord`]: one [`MeshRecord`]
//! per (mesh, material pass), grouped into one [`MaterialRange`] per mesh.
//! Each frame runs two parallel phases over all records:
//!
//! 1. **Check**: resolve the current model and effective materials and decide
//!    whether the record layout is still valid ([`SyncState`]).
//! 2. **Update**: rebuild invalid layouts (unregister old mesh records first,
//!    then allocate new ones), then refresh per-record fields (world matrix,
//!    bounds, skinning matrices, flags) and reconcile registry membership.
//!
//! The model asset is never mutated; a reload is observed as a new `Arc`
//! behind the same handle.

use std::sync::Arc;

use glam::{Affine3A, Mat4};
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::assets::{AssetServer, MaterialHandle, ModelHandle};
use crate::render::association::{AssociationProcessor, ComponentAssociationTable};
use crate::render::visibility::{
    RenderGroup, RenderObjectId, RenderObjectKind, VisibilityRegistry, VisibleObject,
};
use crate::resources::bounds::{BoundingBox, BoundingSphere};
use crate::resources::material::Material;
use crate::resources::model::{MeshDefinition, Model};
use crate::scene::{Component, ComponentId, EntityHandle, ModelComponent, Scene, SkeletonInstance};
use crate::settings::RenderSyncSettings;

// ============================================================================
// Records
// ============================================================================

/// Consecutive mesh records of one mesh, one per material pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialRange {
    pub material: Option<MaterialHandle>,
    pub mesh_start: usize,
    pub mesh_count: usize,
}

impl MaterialRange {
    #[inline]
    #[must_use]
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.mesh_start..self.mesh_start + self.mesh_count
    }
}

/// Drawable state of one mesh pass.
#[derive(Debug, Clone)]
pub struct MeshRecord {
    pub id: RenderObjectId,
    pub entity: EntityHandle,
    pub mesh_index: usize,
    pub pass_index: usize,

    pub material: Option<MaterialHandle>,
    pub enabled: bool,
    pub render_group: RenderGroup,

    pub world_matrix: Affine3A,
    pub bounding_box: BoundingBox,
    pub bounding_sphere: BoundingSphere,
    /// Skinning matrices (bone world * bind), `None` for rigid meshes.
    pub blend_matrices: Option<Vec<Mat4>>,

    pub is_shadow_caster: bool,
    pub depth_write: bool,
    pub distance_sort_fudge: f32,
    pub small_object_culling_multiplier: f32,

    registered: bool,
}

impl MeshRecord {
    fn new(entity: EntityHandle, mesh_index: usize, pass_index: usize) -> Self {
        Self {
            id: RenderObjectId::next(),
            entity,
            mesh_index,
            pass_index,
            material: None,
            enabled: false,
            render_group: RenderGroup::default(),
            world_matrix: Affine3A::IDENTITY,
            bounding_box: BoundingBox::default(),
            bounding_sphere: BoundingSphere::default(),
            blend_matrices: None,
            is_shadow_caster: true,
            depth_write: true,
            distance_sort_fudge: 0.0,
            small_object_culling_multiplier: 1.0,
            registered: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    #[must_use]
    pub fn visible_object(&self) -> VisibleObject {
        VisibleObject {
            id: self.id,
            entity: self.entity,
            kind: RenderObjectKind::Mesh,
            render_group: self.render_group,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NoModel,
    UpToDate,
    NeedsFullRebuild,
}

/// Effective material of one mesh for the current frame.
#[derive(Debug, Clone, Default)]
struct ResolvedMaterial {
    handle: Option<MaterialHandle>,
    material: Option<Arc<Material>>,
}

impl ResolvedMaterial {
    fn pass_count(&self) -> usize {
        self.material.as_ref().map_or(1, |m| m.pass_count())
    }
}

/// Render-side shadow of one [`ModelComponent`].
#[derive(Debug)]
pub struct ModelRenderRecord {
    owner: ComponentId,
    entity: EntityHandle,

    model: Option<(ModelHandle, Arc<Model>)>,
    mesh_records: Vec<MeshRecord>,
    material_ranges: Vec<MaterialRange>,
    unique_mesh_count: usize,
    state: SyncState,

    // Check-phase results, consumed by the update phase.
    resolved_model: Option<(ModelHandle, Arc<Model>)>,
    resolved_materials: Vec<ResolvedMaterial>,
}

impl ModelRenderRecord {
    fn new(entity: EntityHandle, owner: ComponentId) -> Self {
        Self {
            owner,
            entity,
            model: None,
            mesh_records: Vec::new(),
            material_ranges: Vec::new(),
            unique_mesh_count: 0,
            state: SyncState::NoModel,
            resolved_model: None,
            resolved_materials: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    #[inline]
    #[must_use]
    pub fn entity(&self) -> EntityHandle {
        self.entity
    }

    #[must_use]
    pub fn model_handle(&self) -> Option<ModelHandle> {
        self.model.as_ref().map(|(h, _)| *h)
    }

    /// The model version the records were built from.
    #[must_use]
    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref().map(|(_, m)| m)
    }

    #[inline]
    #[must_use]
    pub fn mesh_records(&self) -> &[MeshRecord] {
        &self.mesh_records
    }

    #[inline]
    #[must_use]
    pub fn material_ranges(&self) -> &[MaterialRange] {
        &self.material_ranges
    }

    #[inline]
    #[must_use]
    pub fn unique_mesh_count(&self) -> usize {
        self.unique_mesh_count
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Records of mesh `mesh_index`, one per material pass.
    #[must_use]
    pub fn records_for_mesh(&self, mesh_index: usize) -> &[MeshRecord] {
        self.material_ranges
            .get(mesh_index)
            .map(|r| &self.mesh_records[r.indices()])
            .unwrap_or(&[])
    }

    fn registered_ids(&self) -> SmallVec<[RenderObjectId; 8]> {
        self.mesh_records
            .iter()
            .filter(|r| r.registered)
            .map(|r| r.id)
            .collect()
    }
}

// ============================================================================
// Placement
// ============================================================================

/// World matrix, world bounds and skinning matrices of one mesh.
fn mesh_placement(
    mesh: &MeshDefinition,
    skeleton: Option<&SkeletonInstance>,
    entity_world: &Affine3A,
) -> (Affine3A, BoundingBox, Option<Vec<Mat4>>) {
    if let (Some(bones), Some(skeleton)) = (mesh.bones.as_deref().filter(|b| !b.is_empty()), skeleton) {
        let mut blend = Vec::with_capacity(bones.len());
        let mut bounds: Option<BoundingBox> = None;

        for bone in bones {
            let Some(node_world) = skeleton.node_world_matrix(bone.node_index) else {
                log::warn!("Mesh '{}' references missing skeleton node {}", mesh.name, bone.node_index);
                blend.push(Mat4::from(*entity_world));
                continue;
            };
            let m = *node_world * bone.bind_matrix;
            let bone_bounds = mesh.bounding_box.transform(&m);
            bounds = Some(match bounds {
                Some(acc) => acc.union(&bone_bounds),
                None => bone_bounds,
            });
            blend.push(Mat4::from(m));
        }

        let bounds = bounds.unwrap_or_else(|| mesh.bounding_box.transform(entity_world));
        return (*entity_world, bounds, Some(blend));
    }

    let world = skeleton
        .and_then(|s| s.node_world_matrix(mesh.node_index))
        .copied()
        .unwrap_or(*entity_world);
    (world, mesh.bounding_box.transform(&world), None)
}

// ============================================================================
// Processor
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelSyncStats {
    pub records: usize,
    pub rebuilt: usize,
    pub mesh_records: usize,
    pub registered: usize,
    pub unregistered: usize,
}

impl ModelSyncStats {
    fn merge(self, other: Self) -> Self {
        Self {
            records: self.records + other.records,
            rebuilt: self.rebuilt + other.rebuilt,
            mesh_records: self.mesh_records + other.mesh_records,
            registered: self.registered + other.registered,
            unregistered: self.unregistered + other.unregistered,
        }
    }
}

pub struct ModelProcessor {
    registry: Arc<VisibilityRegistry>,
    /// Used when neither the component nor the model names a material.
    pub fallback_material: Option<MaterialHandle>,
    pub settings: RenderSyncSettings,
}

impl ModelProcessor {
    #[must_use]
    pub fn new(registry: Arc<VisibilityRegistry>, settings: RenderSyncSettings) -> Self {
        Self {
            registry,
            fallback_material: None,
            settings,
        }
    }

    fn resolve_material(
        &self,
        component: &ModelComponent,
        model: &Model,
        mesh: &MeshDefinition,
        assets: &AssetServer,
    ) -> ResolvedMaterial {
        let handle = component
            .materials
            .get(&mesh.material_index)
            .copied()
            .or_else(|| model.materials.get(mesh.material_index).and_then(|m| m.material))
            .or(self.fallback_material);

        let material = handle.and_then(|h| assets.get_material(h));
        if handle.is_some() && material.is_none() {
            log::debug!("Material of mesh '{}' is not loaded, assuming one pass", mesh.name);
        }
        ResolvedMaterial { handle, material }
    }

    // ========================================================================
    // Phase 1: check
    // ========================================================================

    fn check(&self, record: &mut ModelRenderRecord, component: Option<&ModelComponent>, assets: &AssetServer) {
        record.resolved_materials.clear();
        record.resolved_model = component
            .and_then(|c| c.model)
            .and_then(|h| assets.get_model(h).map(|m| (h, m)));

        let (Some(component), Some((_, model))) = (component, record.resolved_model.as_ref()) else {
            record.state = if record.model.is_some() || !record.mesh_records.is_empty() {
                SyncState::NeedsFullRebuild
            } else {
                SyncState::NoModel
            };
            return;
        };

        record.resolved_materials = model
            .meshes
            .iter()
            .map(|mesh| self.resolve_material(component, model, mesh, assets))
            .collect();

        let same_model = match (&record.model, &record.resolved_model) {
            (Some((h0, m0)), Some((h1, m1))) => h0 == h1 && Arc::ptr_eq(m0, m1),
            _ => false,
        };

        let layout_valid = same_model
            && record.material_ranges.len() == record.resolved_materials.len()
            && record
                .material_ranges
                .iter()
                .zip(&record.resolved_materials)
                .all(|(range, resolved)| range.mesh_count == resolved.pass_count());

        record.state = if layout_valid {
            SyncState::UpToDate
        } else {
            SyncState::NeedsFullRebuild
        };
    }

    // ========================================================================
    // Phase 2: update
    // ========================================================================

    fn rebuild(&self, record: &mut ModelRenderRecord, stats: &mut ModelSyncStats) {
        let old = record.registered_ids();
        if !old.is_empty() {
            stats.unregistered += self.registry.remove_many(old);
        }

        record.mesh_records.clear();
        record.material_ranges.clear();
        record.unique_mesh_count = 0;
        record.model = record.resolved_model.take();
        stats.rebuilt += 1;

        let Some((_, model)) = record.model.as_ref() else {
            record.state = SyncState::NoModel;
            return;
        };

        for (mesh_index, resolved) in record.resolved_materials.iter().enumerate() {
            let mesh_count = resolved.pass_count();
            record.material_ranges.push(MaterialRange {
                material: resolved.handle,
                mesh_start: record.mesh_records.len(),
                mesh_count,
            });
            for pass_index in 0..mesh_count {
                record
                    .mesh_records
                    .push(MeshRecord::new(record.entity, mesh_index, pass_index));
            }
        }
        record.unique_mesh_count = model.meshes.len();
        record.state = SyncState::UpToDate;

        log::trace!(
            "Rebuilt render records of {:?}: {} meshes, {} records",
            record.entity,
            record.unique_mesh_count,
            record.mesh_records.len()
        );
    }

    fn refresh(
        &self,
        record: &mut ModelRenderRecord,
        component: &ModelComponent,
        entity_world: &Affine3A,
        stats: &mut ModelSyncStats,
    ) {
        let Some((handle, model)) = record.model.as_ref() else {
            return;
        };
        let skeleton = component.skeleton().filter(|s| s.is_built_from(*handle, model));

        let fudge = component
            .distance_sort_fudge
            .or(model.distance_sort_fudge)
            .unwrap_or(self.settings.default_distance_sort_fudge);
        let culling = component
            .small_object_culling_multiplier
            .or(model.small_object_culling_multiplier)
            .unwrap_or(self.settings.default_small_object_culling_multiplier);

        let mut to_add: SmallVec<[VisibleObject; 8]> = SmallVec::new();
        let mut to_remove: SmallVec<[RenderObjectId; 8]> = SmallVec::new();

        for (mesh_index, mesh) in model.meshes.iter().enumerate() {
            let (Some(range), Some(resolved)) = (
                record.material_ranges.get_mut(mesh_index),
                record.resolved_materials.get(mesh_index),
            ) else {
                continue;
            };
            range.material = resolved.handle;
            let range = range.indices();

            let (world, bounding_box, blend) = mesh_placement(mesh, skeleton, entity_world);
            let bounding_sphere = BoundingSphere::from_box(&bounding_box);
            let shadow_caster = component.is_shadow_caster
                && model
                    .materials
                    .get(mesh.material_index)
                    .is_none_or(|m| m.is_shadow_caster);

            for r in &mut record.mesh_records[range] {
                r.material = resolved.handle;
                r.depth_write = resolved
                    .material
                    .as_ref()
                    .is_none_or(|m| m.depth_write(r.pass_index));
                r.world_matrix = world;
                r.bounding_box = bounding_box;
                r.bounding_sphere = bounding_sphere;
                r.blend_matrices.clone_from(&blend);
                r.is_shadow_caster = shadow_caster;
                r.distance_sort_fudge = fudge;
                r.small_object_culling_multiplier = culling;

                let group_changed = r.render_group != component.render_group;
                r.render_group = component.render_group;
                r.enabled = component.enabled;

                match (r.enabled, r.registered) {
                    (true, false) => {
                        to_add.push(r.visible_object());
                        r.registered = true;
                    }
                    (false, true) => {
                        to_remove.push(r.id);
                        r.registered = false;
                    }
                    (true, true) if group_changed => {
                        to_remove.push(r.id);
                        to_add.push(r.visible_object());
                    }
                    _ => {}
                }
            }
        }

        if !to_remove.is_empty() {
            stats.unregistered += self.registry.remove_many(to_remove);
        }
        if !to_add.is_empty() {
            stats.registered += self.registry.add_many(to_add);
        }
    }

    fn update(&self, record: &mut ModelRenderRecord, scene: &Scene) -> ModelSyncStats {
        let mut stats = ModelSyncStats {
            records: 1,
            ..ModelSyncStats::default()
        };

        if record.state == SyncState::NeedsFullRebuild {
            self.rebuild(record, &mut stats);
        }

        if record.state == SyncState::UpToDate
            && let Some(component) = scene.models.get(record.entity)
        {
            let entity_world = scene
                .transforms
                .get(record.entity)
                .map_or(Affine3A::IDENTITY, |n| *n.world_matrix());
            self.refresh(record, component, &entity_world, &mut stats);
        }

        stats.mesh_records = record.mesh_records.len();
        record.resolved_materials.clear();
        record.resolved_model = None;
        stats
    }
}

impl AssociationProcessor for ModelProcessor {
    type Component = ModelComponent;
    type Shadow = ModelRenderRecord;

    fn generate(&self, entity: EntityHandle, component: &ModelComponent, _scene: &Scene) -> ModelRenderRecord {
        ModelRenderRecord::new(entity, component.id())
    }

    fn validate(&self, component: &ModelComponent, shadow: &ModelRenderRecord) -> bool {
        shadow.owner == component.id()
    }

    fn on_adding(&self, entity: EntityHandle, component: &ModelComponent, _shadow: &mut ModelRenderRecord) {
        log::trace!("Associating model component {:?} of {entity:?}", component.id());
    }

    fn on_removed(&self, entity: EntityHandle, shadow: ModelRenderRecord) {
        let ids = shadow.registered_ids();
        let removed = self.registry.remove_many(ids);
        log::trace!("Dropped render record of {entity:?}, {removed} mesh record(s) unregistered");
    }
}

/// Runs the check and update phases over every model association.
pub fn synchronize_models(
    table: &mut ComponentAssociationTable<ModelProcessor>,
    scene: &Scene,
    assets: &AssetServer,
) -> ModelSyncStats {
    let (processor, keys, records) = table.split_mut();
    let min_len = processor.settings.parallel_min_records.max(1);

    records
        .par_iter_mut()
        .zip(keys.par_iter())
        .with_min_len(min_len)
        .for_each(|(record, key)| processor.check(record, scene.models.get(key.entity), assets));

    records
        .par_iter_mut()
        .with_min_len(min_len)
        .map(|record| processor.update(record, scene))
        .reduce(ModelSyncStats::default, ModelSyncStats::merge)
}
