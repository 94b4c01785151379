use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3};
use slotmap::{SecondaryMap, SlotMap, SparseSecondaryMap};

use crate::errors::{EngineError, HierarchyViolation, Result};
use crate::physics::RigidBodyComponent;
use crate::scene::components::{
    ChangeKind, Component, ComponentChange, ComponentKind, ModelComponent, SpriteComponent,
};
use crate::scene::link::{LinkContext, TransformLink};
use crate::scene::node::{TransformNode, TransformOperation};
use crate::scene::{EntityHandle, SceneKey};
use crate::settings::TransformSettings;
use crate::utils::observable::{CollectionChange, ObservableSet};

/// Entity record. Components live in the scene's tables, not here.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub(crate) scene: SceneKey,
}

impl Entity {
    #[inline]
    #[must_use]
    pub fn scene(&self) -> SceneKey {
        self.scene
    }
}

/// A scene inside the scene tree.
///
/// Every entity belongs to exactly one sub-scene. Parentless entities of a
/// sub-scene are placed relative to its world matrix, which chains the
/// `offset` of every ancestor sub-scene.
#[derive(Debug, Clone)]
pub struct SubScene {
    pub name: String,
    pub(crate) parent: Option<SceneKey>,
    pub(crate) children: Vec<SceneKey>,
    pub(crate) offset: Vec3,
    pub(crate) world_matrix: Affine3A,
    pub(crate) matrix_changed: bool,
    pub(crate) root_entities: Vec<EntityHandle>,
}

impl SubScene {
    fn new(name: &str, parent: Option<SceneKey>, offset: Vec3) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            offset,
            world_matrix: Affine3A::from_translation(offset),
            matrix_changed: true,
            root_entities: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<SceneKey> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[SceneKey] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn root_entities(&self) -> &[EntityHandle] {
        &self.root_entities
    }
}

/// A child was added to or removed from a parent (or a scene's root list when
/// `parent` is `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyEvent {
    pub parent: Option<EntityHandle>,
    pub scene: SceneKey,
    pub child: EntityHandle,
    pub change: ChangeKind,
}

/// 场景图结构
///
/// Scene 是纯数据层：实体、Transform 节点、组件表和子场景树。
/// Systems (transform pass, render sync) read and write it once per frame.
pub struct Scene {
    pub(crate) entities: SlotMap<EntityHandle, Entity>,

    // ==== 组件表 ====
    pub(crate) transforms: SecondaryMap<EntityHandle, TransformNode>,
    pub(crate) models: SparseSecondaryMap<EntityHandle, ModelComponent>,
    pub(crate) sprites: SparseSecondaryMap<EntityHandle, SpriteComponent>,
    pub(crate) bodies: SparseSecondaryMap<EntityHandle, RigidBodyComponent>,

    // ==== 子场景树 ====
    pub(crate) scenes: SlotMap<SceneKey, SubScene>,
    root_scene: SceneKey,

    // ==== 变更记录 ====
    changes: Vec<ComponentChange>,
    hierarchy_events: Vec<HierarchyEvent>,
    hierarchy_version: u64,

    detect_cycles: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        let mut scenes = SlotMap::with_key();
        let root_scene = scenes.insert(SubScene::new("Root", None, Vec3::ZERO));
        Self {
            entities: SlotMap::with_key(),
            transforms: SecondaryMap::new(),
            models: SparseSecondaryMap::new(),
            sprites: SparseSecondaryMap::new(),
            bodies: SparseSecondaryMap::new(),
            scenes,
            root_scene,
            changes: Vec::new(),
            hierarchy_events: Vec::new(),
            hierarchy_version: 0,
            detect_cycles: true,
        }
    }

    #[must_use]
    pub fn with_settings(settings: &TransformSettings) -> Self {
        let mut scene = Self::new();
        scene.detect_cycles = settings.detect_cycles;
        scene
    }

    pub fn set_cycle_detection(&mut self, enabled: bool) {
        self.detect_cycles = enabled;
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Creates an entity with a transform in the root scene.
    pub fn create_entity(&mut self, name: &str) -> EntityHandle {
        let scene = self.root_scene;
        self.spawn(name, scene, Some(TransformNode::new()))
    }

    /// Creates an entity with a transform in sub-scene `scene`.
    pub fn create_entity_in(&mut self, scene: SceneKey, name: &str) -> Result<EntityHandle> {
        if !self.scenes.contains_key(scene) {
            return Err(EngineError::SceneNotFound(scene));
        }
        Ok(self.spawn(name, scene, Some(TransformNode::new())))
    }

    /// Creates an entity without a transform. It stays a root until it gets one.
    pub fn create_bare_entity(&mut self, name: &str) -> EntityHandle {
        let scene = self.root_scene;
        self.spawn(name, scene, None)
    }

    pub fn build_entity(&'_ mut self, name: &str) -> EntityBuilder<'_> {
        EntityBuilder::new(self, name)
    }

    fn spawn(&mut self, name: &str, scene: SceneKey, node: Option<TransformNode>) -> EntityHandle {
        let entity = self.entities.insert(Entity {
            name: name.to_string(),
            scene,
        });

        if let Some(node) = node {
            self.transforms.insert(entity, node);
            self.changes.push(ComponentChange {
                entity,
                kind: ComponentKind::Transform,
                change: ChangeKind::Added,
            });
        }

        self.push_root(scene, entity);
        self.hierarchy_version += 1;
        entity
    }

    /// 移除实体 (连同所有子节点)
    pub fn remove_entity(&mut self, entity: EntityHandle) -> bool {
        if !self.entities.contains_key(entity) {
            return false;
        }

        // 1. 先序收集整棵子树，显式栈避免深层级递归
        let mut subtree = Vec::new();
        let mut stack = vec![entity];
        while let Some(e) = stack.pop() {
            subtree.push(e);
            if let Some(node) = self.transforms.get(e) {
                stack.extend(node.children.iter());
            }
        }

        // 2. 逆序移除：子节点先于父节点
        for &e in subtree.iter().rev() {
            self.remove_single(e);
        }

        self.hierarchy_version += 1;
        true
    }

    fn remove_single(&mut self, entity: EntityHandle) {
        // 解除父子关系
        self.detach(entity);

        // 清理组件
        if self.models.remove(entity).is_some() {
            self.record(entity, ComponentKind::Model, ChangeKind::Removed);
        }
        if self.sprites.remove(entity).is_some() {
            self.record(entity, ComponentKind::Sprite, ChangeKind::Removed);
        }
        if self.bodies.remove(entity).is_some() {
            self.record(entity, ComponentKind::RigidBody, ChangeKind::Removed);
        }
        if self.transforms.remove(entity).is_some() {
            self.record(entity, ComponentKind::Transform, ChangeKind::Removed);
        }

        self.entities.remove(entity);
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, entity: EntityHandle) -> bool {
        self.entities.contains_key(entity)
    }

    #[inline]
    #[must_use]
    pub fn entity(&self, entity: EntityHandle) -> Option<&Entity> {
        self.entities.get(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityHandle, &Entity)> {
        self.entities.iter()
    }

    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn find_entity(&self, name: &str) -> Option<EntityHandle> {
        self.entities.iter().find(|(_, e)| e.name == name).map(|(h, _)| h)
    }

    // ========================================================================
    // Transform component
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn transform(&self, entity: EntityHandle) -> Option<&TransformNode> {
        self.transforms.get(entity)
    }

    #[inline]
    pub fn transform_mut(&mut self, entity: EntityHandle) -> Option<&mut TransformNode> {
        self.transforms.get_mut(entity)
    }

    #[inline]
    #[must_use]
    pub fn transforms(&self) -> &SecondaryMap<EntityHandle, TransformNode> {
        &self.transforms
    }

    /// Gives an entity a transform. Returns `Ok(false)` if it already has one.
    pub fn add_transform(&mut self, entity: EntityHandle, node: TransformNode) -> Result<bool> {
        if !self.entities.contains_key(entity) {
            return Err(EngineError::EntityNotFound(entity));
        }
        if self.transforms.contains_key(entity) {
            return Ok(false);
        }

        // Hierarchy links of the incoming node are not trusted.
        let mut node = node;
        node.parent = None;
        node.children = ObservableSet::new();
        node.mark_dirty();

        self.transforms.insert(entity, node);
        self.record(entity, ComponentKind::Transform, ChangeKind::Added);
        self.hierarchy_version += 1;
        Ok(true)
    }

    /// Removes the transform. Children become roots of their scene.
    pub fn remove_transform(&mut self, entity: EntityHandle) -> Option<TransformNode> {
        let children: Vec<EntityHandle> = self.transforms.get(entity)?.children().to_vec();
        for child in children {
            if let Err(err) = self.set_parent(child, None) {
                log::error!("Failed to orphan {child:?}: {err}");
            }
        }

        let parent = self.transforms.get(entity).and_then(|n| n.parent);
        if parent.is_some() {
            self.detach(entity);
            let scene = self.entities.get(entity).map(|e| e.scene)?;
            self.push_root(scene, entity);
        }

        let node = self.transforms.remove(entity)?;
        self.record(entity, ComponentKind::Transform, ChangeKind::Removed);
        self.hierarchy_version += 1;
        Some(node)
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// 核心逻辑：建立父子关系
    ///
    /// Moves `child` (with its subtree) under `parent`, or to the root list of
    /// its scene when `parent` is `None`. A child placed under a parent of
    /// another sub-scene moves to that sub-scene.
    ///
    /// Reparenting to the current parent is a no-op. Self-parenting and, with
    /// cycle detection on, parenting under a descendant are rejected and leave
    /// the hierarchy untouched.
    pub fn set_parent(&mut self, child: EntityHandle, parent: Option<EntityHandle>) -> Result<()> {
        if !self.entities.contains_key(child) {
            return Err(EngineError::EntityNotFound(child));
        }
        let Some(current) = self.transforms.get(child).map(|n| n.parent) else {
            return Err(self.reject(child, HierarchyViolation::MissingTransform));
        };

        if let Some(p) = parent {
            if p == child {
                return Err(self.reject(child, HierarchyViolation::SelfParent));
            }
            if !self.entities.contains_key(p) {
                return Err(EngineError::EntityNotFound(p));
            }
            if !self.transforms.contains_key(p) {
                return Err(self.reject(child, HierarchyViolation::MissingTransform));
            }
        }

        if current == parent {
            return Ok(());
        }

        if let Some(p) = parent
            && self.detect_cycles
            && self.is_ancestor(child, p)
        {
            return Err(self.reject(child, HierarchyViolation::Cycle { ancestor: p }));
        }

        // 1. Detach from old
        self.detach(child);

        // 2. Attach to new
        match parent {
            Some(p) => {
                let target_scene = self.entities[p].scene;
                if self.entities[child].scene != target_scene {
                    self.move_subtree_to_scene(child, target_scene);
                }
                if let Some(parent_node) = self.transforms.get_mut(p) {
                    parent_node.children.insert(child);
                }
                self.flush_child_events(p);
            }
            None => {
                let scene = self.entities[child].scene;
                self.push_root(scene, child);
            }
        }

        // 3. Update child
        if let Some(node) = self.transforms.get_mut(child) {
            node.parent = parent;
            node.mark_dirty(); // 强制标记脏，确保矩阵更新
        }

        self.hierarchy_version += 1;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn parent(&self, entity: EntityHandle) -> Option<EntityHandle> {
        self.transforms.get(entity).and_then(|n| n.parent)
    }

    #[must_use]
    pub fn children(&self, entity: EntityHandle) -> &[EntityHandle] {
        self.transforms.get(entity).map(|n| n.children()).unwrap_or(&[])
    }

    /// True if `ancestor` appears on the parent chain of `entity` (or is `entity`).
    #[must_use]
    pub fn is_ancestor(&self, ancestor: EntityHandle, entity: EntityHandle) -> bool {
        let mut current = Some(entity);
        // Bounded so an undetected cycle cannot hang the walk.
        let mut budget = self.transforms.len() + 1;
        while let Some(e) = current {
            if e == ancestor {
                return true;
            }
            if budget == 0 {
                return false;
            }
            budget -= 1;
            current = self.transforms.get(e).and_then(|n| n.parent);
        }
        false
    }

    /// Replaces the pose provider of `entity`.
    pub fn set_link(&mut self, entity: EntityHandle, link: Option<Arc<dyn TransformLink>>) -> Result<()> {
        let node = self
            .transforms
            .get_mut(entity)
            .ok_or(EngineError::EntityNotFound(entity))?;
        node.link = link;
        node.mark_dirty();
        // Links change the evaluation order.
        self.hierarchy_version += 1;
        Ok(())
    }

    pub fn add_post_operation(
        &mut self,
        entity: EntityHandle,
        operation: Arc<dyn TransformOperation>,
    ) -> Result<()> {
        let node = self
            .transforms
            .get_mut(entity)
            .ok_or(EngineError::EntityNotFound(entity))?;
        node.post_operations.push(operation);
        Ok(())
    }

    pub fn clear_post_operations(&mut self, entity: EntityHandle) {
        if let Some(node) = self.transforms.get_mut(entity) {
            node.post_operations.clear();
        }
    }

    /// Read-only view used by links during the transform pass.
    #[must_use]
    pub fn link_context(&self) -> LinkContext<'_> {
        LinkContext {
            transforms: &self.transforms,
            models: &self.models,
        }
    }

    /// Bumped on every structural change (reparent, spawn, removal, links).
    #[inline]
    #[must_use]
    pub fn hierarchy_version(&self) -> u64 {
        self.hierarchy_version
    }

    pub fn drain_hierarchy_events(&mut self) -> Vec<HierarchyEvent> {
        std::mem::take(&mut self.hierarchy_events)
    }

    fn reject(&self, entity: EntityHandle, reason: HierarchyViolation) -> EngineError {
        log::error!("Rejected hierarchy change for {entity:?}: {reason}");
        EngineError::InvalidHierarchyState { entity, reason }
    }

    /// Unlinks `entity` from its parent or from its scene's root list.
    fn detach(&mut self, entity: EntityHandle) {
        let parent = self.transforms.get(entity).and_then(|n| n.parent);
        match parent {
            Some(p) => {
                if let Some(parent_node) = self.transforms.get_mut(p) {
                    parent_node.children.remove(entity);
                }
                self.flush_child_events(p);
                if let Some(node) = self.transforms.get_mut(entity) {
                    node.parent = None;
                }
            }
            None => {
                let Some(scene) = self.entities.get(entity).map(|e| e.scene) else {
                    return;
                };
                if let Some(sub) = self.scenes.get_mut(scene)
                    && let Some(i) = sub.root_entities.iter().position(|&x| x == entity)
                {
                    sub.root_entities.remove(i);
                    self.hierarchy_events.push(HierarchyEvent {
                        parent: None,
                        scene,
                        child: entity,
                        change: ChangeKind::Removed,
                    });
                }
            }
        }
    }

    fn push_root(&mut self, scene: SceneKey, entity: EntityHandle) {
        if let Some(sub) = self.scenes.get_mut(scene)
            && !sub.root_entities.contains(&entity)
        {
            sub.root_entities.push(entity);
            self.hierarchy_events.push(HierarchyEvent {
                parent: None,
                scene,
                child: entity,
                change: ChangeKind::Added,
            });
        }
    }

    fn flush_child_events(&mut self, parent: EntityHandle) {
        let Some(scene) = self.entities.get(parent).map(|e| e.scene) else {
            return;
        };
        let Some(node) = self.transforms.get_mut(parent) else {
            return;
        };
        for change in node.children.drain_changes() {
            let (child, change) = match change {
                CollectionChange::Added(c) => (c, ChangeKind::Added),
                CollectionChange::Removed(c) => (c, ChangeKind::Removed),
            };
            self.hierarchy_events.push(HierarchyEvent {
                parent: Some(parent),
                scene,
                child,
                change,
            });
        }
    }

    fn move_subtree_to_scene(&mut self, root: EntityHandle, scene: SceneKey) {
        let mut stack = vec![root];
        while let Some(e) = stack.pop() {
            if let Some(entity) = self.entities.get_mut(e) {
                entity.scene = scene;
            }
            if let Some(node) = self.transforms.get(e) {
                stack.extend(node.children.iter());
            }
        }
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// Adds (or replaces) a component. Returns the replaced value.
    pub fn add_component<C: Component>(&mut self, entity: EntityHandle, component: C) -> Result<Option<C>> {
        if !self.entities.contains_key(entity) {
            return Err(EngineError::EntityNotFound(entity));
        }
        let old = C::storage_mut(self).insert(entity, component);
        self.record(entity, C::KIND, ChangeKind::Added);
        Ok(old)
    }

    pub fn remove_component<C: Component>(&mut self, entity: EntityHandle) -> Option<C> {
        let removed = C::storage_mut(self).remove(entity)?;
        self.record(entity, C::KIND, ChangeKind::Removed);
        Some(removed)
    }

    #[inline]
    #[must_use]
    pub fn get_component<C: Component>(&self, entity: EntityHandle) -> Option<&C> {
        C::storage(self).get(entity)
    }

    #[inline]
    pub fn get_component_mut<C: Component>(&mut self, entity: EntityHandle) -> Option<&mut C> {
        C::storage_mut(self).get_mut(entity)
    }

    #[must_use]
    pub fn has_component(&self, entity: EntityHandle, kind: ComponentKind) -> bool {
        match kind {
            ComponentKind::Transform => self.transforms.contains_key(entity),
            ComponentKind::Model => self.models.contains_key(entity),
            ComponentKind::Sprite => self.sprites.contains_key(entity),
            ComponentKind::RigidBody => self.bodies.contains_key(entity),
        }
    }

    /// All dependencies of `C` are present on `entity`.
    #[must_use]
    pub fn dependencies_met<C: Component>(&self, entity: EntityHandle) -> bool {
        C::DEPENDENCIES.iter().all(|&kind| self.has_component(entity, kind))
    }

    #[inline]
    #[must_use]
    pub fn models(&self) -> &SparseSecondaryMap<EntityHandle, ModelComponent> {
        &self.models
    }

    #[inline]
    #[must_use]
    pub fn sprites(&self) -> &SparseSecondaryMap<EntityHandle, SpriteComponent> {
        &self.sprites
    }

    #[inline]
    #[must_use]
    pub fn bodies(&self) -> &SparseSecondaryMap<EntityHandle, RigidBodyComponent> {
        &self.bodies
    }

    /// Component changes recorded since the last drain, in order.
    #[inline]
    #[must_use]
    pub fn pending_changes(&self) -> &[ComponentChange] {
        &self.changes
    }

    pub fn drain_component_changes(&mut self) -> Vec<ComponentChange> {
        std::mem::take(&mut self.changes)
    }

    fn record(&mut self, entity: EntityHandle, kind: ComponentKind, change: ChangeKind) {
        self.changes.push(ComponentChange { entity, kind, change });
    }

    // ========================================================================
    // Sub-scenes
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn root_scene(&self) -> SceneKey {
        self.root_scene
    }

    #[inline]
    #[must_use]
    pub fn sub_scene(&self, key: SceneKey) -> Option<&SubScene> {
        self.scenes.get(key)
    }

    #[must_use]
    pub fn root_entities(&self, key: SceneKey) -> &[EntityHandle] {
        self.scenes.get(key).map(|s| s.root_entities()).unwrap_or(&[])
    }

    pub fn add_sub_scene(&mut self, parent: SceneKey, name: &str, offset: Vec3) -> Result<SceneKey> {
        if !self.scenes.contains_key(parent) {
            return Err(EngineError::SceneNotFound(parent));
        }
        let key = self.scenes.insert(SubScene::new(name, Some(parent), offset));
        self.scenes[parent].children.push(key);
        self.hierarchy_version += 1;
        Ok(key)
    }

    /// Removes a sub-scene, its child scenes and every entity in them.
    pub fn remove_sub_scene(&mut self, key: SceneKey) -> Result<()> {
        if key == self.root_scene {
            log::warn!("The root scene cannot be removed");
            return Ok(());
        }
        let Some(sub) = self.scenes.get(key) else {
            return Err(EngineError::SceneNotFound(key));
        };

        let children = sub.children.clone();
        let roots = sub.root_entities.clone();
        let parent = sub.parent;

        for child in children {
            self.remove_sub_scene(child)?;
        }
        for entity in roots {
            self.remove_entity(entity);
        }

        if let Some(p) = parent
            && let Some(parent_scene) = self.scenes.get_mut(p)
        {
            parent_scene.children.retain(|&c| c != key);
        }
        self.scenes.remove(key);
        self.hierarchy_version += 1;
        Ok(())
    }

    pub fn set_scene_offset(&mut self, key: SceneKey, offset: Vec3) -> Result<()> {
        let sub = self.scenes.get_mut(key).ok_or(EngineError::SceneNotFound(key))?;
        sub.offset = offset;
        Ok(())
    }

    #[must_use]
    pub fn scene_world_matrix(&self, key: SceneKey) -> Option<&Affine3A> {
        self.scenes.get(key).map(|s| &s.world_matrix)
    }

    /// Sub-scenes in parent-before-child order, starting at the root scene.
    #[must_use]
    pub fn scene_order(&self) -> Vec<SceneKey> {
        let mut order = Vec::with_capacity(self.scenes.len());
        let mut stack = vec![self.root_scene];
        while let Some(key) = stack.pop() {
            order.push(key);
            if let Some(sub) = self.scenes.get(key) {
                stack.extend(sub.children.iter().rev());
            }
        }
        order
    }

    /// Chains sub-scene offsets into world matrices. Returns whether any changed.
    pub(crate) fn update_scene_matrices(&mut self) -> bool {
        let mut any = false;
        for key in self.scene_order() {
            let parent_world = self.scenes[key]
                .parent
                .and_then(|p| self.scenes.get(p))
                .map_or(Affine3A::IDENTITY, |p| p.world_matrix);

            let sub = &mut self.scenes[key];
            let world = parent_world * Affine3A::from_translation(sub.offset);
            sub.matrix_changed = world != sub.world_matrix;
            sub.world_matrix = world;
            any |= sub.matrix_changed;
        }
        any
    }
}

// ============================================================================
// EntityBuilder
// ============================================================================

pub struct EntityBuilder<'a> {
    scene: &'a mut Scene,
    name: String,
    node: TransformNode,
    parent: Option<EntityHandle>,
    sub_scene: Option<SceneKey>,
}

impl<'a> EntityBuilder<'a> {
    pub fn new(scene: &'a mut Scene, name: &str) -> Self {
        Self {
            scene,
            name: name.to_string(),
            node: TransformNode::new(),
            parent: None,
            sub_scene: None,
        }
    }

    // === 链式配置方法 ===

    #[must_use]
    pub fn with_position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.node.transform.position = Vec3::new(x, y, z);
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.node.transform.rotation = rotation;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, s: f32) -> Self {
        self.node.transform.scale = Vec3::splat(s);
        self
    }

    #[must_use]
    pub fn with_node(mut self, node: TransformNode) -> Self {
        self.node = node;
        self
    }

    /// 设置父节点
    #[must_use]
    pub fn with_parent(mut self, parent: EntityHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn in_scene(mut self, scene: SceneKey) -> Self {
        self.sub_scene = Some(scene);
        self
    }

    // === 终结方法 ===

    /// Inserts the entity. A rejected parent leaves it as a scene root.
    pub fn build(self) -> Result<EntityHandle> {
        let scene_key = match self.sub_scene {
            Some(key) if self.scene.scenes.contains_key(key) => key,
            Some(key) => return Err(EngineError::SceneNotFound(key)),
            None => self.scene.root_scene,
        };
        let entity = self.scene.spawn(&self.name, scene_key, Some(self.node));
        if let Some(parent) = self.parent {
            self.scene.set_parent(entity, Some(parent))?;
        }
        Ok(entity)
    }
}
