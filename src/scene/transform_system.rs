//! 变换系统 (Transform System)
//!
//! 负责场景图的矩阵层级更新。
//!
//! # 并行化
//!
//! 场景图按层级（BFS顺序）分批：
//! 1. 第一层：所有根节点（无依赖，可并行）
//! 2. 第二层：根节点的直接子节点，以及链接到第一层的节点
//! 3. ...以此类推
//!
//! A node linked through a [`TransformLink`](crate::scene::TransformLink) is
//! scheduled one level below the deeper of its link target and its parent, so
//! every dependency is final before the node is evaluated.
//!
//! Batches are cached and only rebuilt when [`Scene::hierarchy_version`] moves.
//! Within a level, world matrices are computed on rayon workers against an
//! immutable view of the scene and written back afterwards, followed by the
//! post-operations of each updated node in batch order.

use glam::{Affine3A, Quat};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::context::EngineContext;
use crate::errors::{EngineError, Result};
use crate::scene::link::LinkContext;
use crate::scene::node::{Immobility, TransformNode};
use crate::scene::scene::{Entity, SubScene};
use crate::scene::{EntityHandle, Scene, SceneKey};
use crate::vr::VrDevice;

/// 层级批次信息
#[derive(Debug, Default)]
pub struct LevelOrderBatches {
    /// batches[0] 是根节点层，batches[1] 是第一层依赖节点...
    pub batches: Vec<Vec<EntityHandle>>,
    /// Transform nodes no root reaches (only possible with cycle detection off).
    pub unreachable: usize,
}

impl LevelOrderBatches {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空并复用内存
    pub fn clear(&mut self) {
        for batch in &mut self.batches {
            batch.clear();
        }
        self.unreachable = 0;
    }

    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.batches.iter().take_while(|b| !b.is_empty()).count()
    }

    /// Level of `entity`, if scheduled.
    #[must_use]
    pub fn level_of(&self, entity: EntityHandle) -> Option<usize> {
        self.batches.iter().position(|b| b.contains(&entity))
    }
}

/// Nodes whose world matrix must be final before `entity` is evaluated:
/// the link target, then the scene parent.
///
/// A linked node keeps its parent as a prerequisite because a link that
/// yields no matrix falls back to the parent for that frame.
fn prerequisites(
    entity: EntityHandle,
    node: &TransformNode,
    transforms: &slotmap::SecondaryMap<EntityHandle, TransformNode>,
) -> SmallVec<[EntityHandle; 2]> {
    let mut deps = SmallVec::new();
    if let Some(target) = node.link.as_ref().and_then(|l| l.dependency())
        && target != entity
        && transforms.contains_key(target)
    {
        deps.push(target);
    }
    if let Some(parent) = node.parent
        && transforms.contains_key(parent)
        && !deps.contains(&parent)
    {
        deps.push(parent);
    }
    deps
}

/// 构建按层级排序的节点批次（BFS顺序）
///
/// Roots are taken scene by scene in scene-tree order. A node lands one level
/// below the deepest of its prerequisites.
pub fn build_level_order_batches(scene: &Scene, output: &mut LevelOrderBatches) {
    output.clear();
    let transforms = &scene.transforms;

    // link target -> linked nodes
    let mut dependents: FxHashMap<EntityHandle, SmallVec<[EntityHandle; 2]>> = FxHashMap::default();
    for (entity, node) in transforms {
        if let Some(target) = node.link.as_ref().and_then(|l| l.dependency())
            && target != entity
            && transforms.contains_key(target)
        {
            dependents.entry(target).or_default().push(entity);
        }
    }

    // entity -> assigned level
    let mut levels: FxHashMap<EntityHandle, usize> = FxHashMap::default();

    // 第一层：根节点
    let mut current_level: Vec<EntityHandle> = Vec::new();
    for key in scene.scene_order() {
        for &entity in scene.root_entities(key) {
            let Some(node) = transforms.get(entity) else {
                continue;
            };
            if prerequisites(entity, node, transforms).is_empty() && !levels.contains_key(&entity) {
                levels.insert(entity, 0);
                current_level.push(entity);
            }
        }
    }

    let mut depth = 0;
    while !current_level.is_empty() {
        let mut next_level = Vec::new();

        for &entity in &current_level {
            let children = transforms.get(entity).map(|n| n.children.iter()).into_iter().flatten();
            let linked = dependents.get(&entity).into_iter().flatten().copied();

            for candidate in children.chain(linked) {
                if levels.contains_key(&candidate) {
                    continue;
                }
                let Some(node) = transforms.get(candidate) else {
                    continue;
                };
                let ready = prerequisites(candidate, node, transforms)
                    .iter()
                    .all(|p| levels.get(p).is_some_and(|&l| l <= depth));
                if ready {
                    levels.insert(candidate, depth + 1);
                    next_level.push(candidate);
                }
            }
        }

        // 保存当前层，复用已分配的内存
        if depth < output.batches.len() {
            output.batches[depth] = current_level;
        } else {
            output.batches.push(current_level);
        }
        depth += 1;

        current_level = next_level;
    }

    output.batches.truncate(depth);
    output.unreachable = transforms.len() - levels.len();
    if output.unreachable > 0 {
        log::warn!(
            "{} transform node(s) are not reachable from any root and will not be updated",
            output.unreachable
        );
    }
}

// ============================================================================
// World matrix evaluation
// ============================================================================

/// Immutable view shared by the workers of one level.
#[derive(Clone, Copy)]
struct PassView<'a> {
    link: LinkContext<'a>,
    entities: &'a SlotMap<EntityHandle, Entity>,
    scenes: &'a SlotMap<SceneKey, SubScene>,
}

impl<'a> PassView<'a> {
    fn new(scene: &'a Scene) -> Self {
        Self {
            link: scene.link_context(),
            entities: &scene.entities,
            scenes: &scene.scenes,
        }
    }
}

/// Matrix the node's local matrix is composed onto.
struct Inherited {
    matrix: Affine3A,
    changed: bool,
    frozen: bool,
}

fn inherited_matrix(entity: EntityHandle, node: &TransformNode, view: &PassView<'_>) -> Inherited {
    if let Some(link) = &node.link
        && let Some(matrix) = link.compute_matrix(&view.link)
    {
        // Link targets may animate without a world matrix change, so always re-evaluate.
        return Inherited {
            matrix,
            changed: true,
            frozen: false,
        };
    }

    if let Some(parent) = node.parent.and_then(|p| view.link.transforms.get(p)) {
        let parent_rotation = if parent.transform.use_trs {
            parent.transform.rotation
        } else {
            local_rotation(parent.local_matrix())
        };
        return Inherited {
            matrix: node.inherited_parent_matrix(parent.world_matrix(), parent_rotation),
            changed: parent.frame.world_changed,
            frozen: parent.frame.subtree_frozen,
        };
    }

    let sub = view
        .entities
        .get(entity)
        .and_then(|e| view.scenes.get(e.scene));
    match sub {
        Some(sub) => Inherited {
            matrix: sub.world_matrix,
            changed: sub.matrix_changed,
            frozen: false,
        },
        None => Inherited {
            matrix: Affine3A::IDENTITY,
            changed: false,
            frozen: false,
        },
    }
}

fn local_rotation(local: &Affine3A) -> Quat {
    local.to_scale_rotation_translation().1
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Updated(Affine3A),
    Unchanged,
    Frozen { subtree: bool },
}

fn evaluate(entity: EntityHandle, view: &PassView<'_>) -> Option<Outcome> {
    let node = view.link.transforms.get(entity)?;
    let frame = node.frame;
    let inherited = inherited_matrix(entity, node, view);

    let settled = frame.computed && !frame.refresh_pending && !frame.moved_outside_pass;
    if settled {
        if inherited.frozen {
            return Some(Outcome::Frozen { subtree: true });
        }
        match node.immobility {
            Immobility::EverythingImmobile => return Some(Outcome::Frozen { subtree: true }),
            Immobility::JustMeImmobile => return Some(Outcome::Frozen { subtree: false }),
            Immobility::FullMotion => {}
        }
        if !frame.local_changed && !inherited.changed {
            return Some(Outcome::Unchanged);
        }
    }

    Some(Outcome::Updated(inherited.matrix * *node.local_matrix()))
}

/// Writes an outcome back. Returns whether the world matrix was recomputed.
fn apply_outcome(entity: EntityHandle, node: &mut TransformNode, outcome: Outcome, run_post_ops: bool) -> bool {
    match outcome {
        Outcome::Updated(world) => {
            let moved = std::mem::take(&mut node.frame.moved_outside_pass);
            let changed = moved || !node.frame.computed || world != *node.world_matrix();
            node.transform.set_world_matrix(world);
            node.frame.world_changed = changed;
            node.frame.computed = true;
            node.frame.refresh_pending = false;
            node.frame.subtree_frozen = false;

            if run_post_ops && !node.post_operations.is_empty() {
                let ops = std::mem::take(&mut node.post_operations);
                for op in &ops {
                    op.process(entity, node);
                }
                node.post_operations = ops;
            }
            true
        }
        Outcome::Unchanged => {
            node.frame.world_changed = false;
            node.frame.subtree_frozen = false;
            false
        }
        Outcome::Frozen { subtree } => {
            node.frame.world_changed = false;
            node.frame.subtree_frozen = subtree;
            false
        }
    }
}

/// Overwrites position/rotation with the tracked hand pose when it is valid.
fn seed_from_vr(node: &mut TransformNode, vr: Option<&dyn VrDevice>) {
    let (Some(hand), Some(device)) = (node.track_vr_hand, vr) else {
        return;
    };
    let pose = device.hand_pose(hand);
    if pose.is_valid() {
        node.transform.position = pose.position;
        node.transform.rotation = pose.rotation;
    } else {
        log::trace!("{hand:?} hand not tracked ({:?}), keeping last pose", pose.state);
    }
}

// ============================================================================
// TransformSystem
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub levels: usize,
    /// Nodes whose world matrix was recomputed.
    pub updated: usize,
    /// Nodes skipped because of immobility.
    pub frozen: usize,
    pub batches_rebuilt: bool,
}

/// Full-scene hierarchy update.
#[derive(Debug, Default)]
pub struct TransformSystem {
    batches: LevelOrderBatches,
    batches_version: Option<u64>,
}

impl TransformSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn batches(&self) -> &LevelOrderBatches {
        &self.batches
    }

    /// Updates every reachable transform node, parents before children.
    pub fn update(&mut self, scene: &mut Scene, ctx: &EngineContext) -> TransformStats {
        let mut stats = TransformStats::default();
        let min_len = ctx.settings.transform.parallel_min_batch.max(1);

        scene.update_scene_matrices();

        if self.batches_version != Some(scene.hierarchy_version()) {
            build_level_order_batches(scene, &mut self.batches);
            self.batches_version = Some(scene.hierarchy_version());
            stats.batches_rebuilt = true;
            log::debug!(
                "Rebuilt transform batches: {} nodes in {} levels",
                self.batches.total_nodes(),
                self.batches.depth()
            );
        }

        // 1. Local matrices (no cross-node dependencies)
        let vr = ctx.vr.as_deref();
        let mut nodes: Vec<&mut TransformNode> = scene.transforms.values_mut().collect();
        nodes.par_iter_mut().with_min_len(min_len).for_each(|node| {
            seed_from_vr(node, vr);
            node.frame.local_changed = node.transform.update_local_matrix();
            node.frame.world_changed = false;
        });
        drop(nodes);

        // 2. World matrices, level by level
        for batch in &self.batches.batches {
            let outcomes: Vec<(EntityHandle, Outcome)> = {
                let view = PassView::new(scene);
                batch
                    .par_iter()
                    .with_min_len(min_len)
                    .filter_map(|&entity| evaluate(entity, &view).map(|o| (entity, o)))
                    .collect()
            };

            for (entity, outcome) in outcomes {
                let Some(node) = scene.transforms.get_mut(entity) else {
                    continue;
                };
                if matches!(outcome, Outcome::Frozen { .. }) {
                    stats.frozen += 1;
                }
                if apply_outcome(entity, node, outcome, true) {
                    stats.updated += 1;
                }
            }
            stats.levels += 1;
        }

        stats
    }
}

// ============================================================================
// Single-node update
// ============================================================================

/// Nodes `entity` depends on, each after its own prerequisites. `entity` itself
/// is not included.
fn dependency_chain(scene: &Scene, entity: EntityHandle) -> Vec<EntityHandle> {
    let transforms = &scene.transforms;
    let mut order = Vec::new();
    let mut seen: FxHashSet<EntityHandle> = FxHashSet::default();
    seen.insert(entity);

    let mut stack: Vec<(EntityHandle, bool)> = match transforms.get(entity) {
        Some(node) => prerequisites(entity, node, transforms)
            .into_iter()
            .rev()
            .map(|p| (p, false))
            .collect(),
        None => return order,
    };

    // 后序遍历：依赖先于依赖者
    while let Some((current, expanded)) = stack.pop() {
        if expanded {
            order.push(current);
            continue;
        }
        if !seen.insert(current) {
            continue;
        }
        stack.push((current, true));
        if let Some(node) = transforms.get(current) {
            for p in prerequisites(current, node, transforms).into_iter().rev() {
                if !seen.contains(&p) {
                    stack.push((p, false));
                }
            }
        }
    }

    order
}

fn update_single(scene: &mut Scene, entity: EntityHandle, run_post_ops: bool, vr: Option<&dyn VrDevice>) {
    let Some(node) = scene.transforms.get_mut(entity) else {
        return;
    };
    seed_from_vr(node, vr);
    node.frame.local_changed = node.transform.update_local_matrix();

    let world = {
        let view = PassView::new(scene);
        let Some(node) = view.link.transforms.get(entity) else {
            return;
        };
        inherited_matrix(entity, node, &view).matrix * *node.local_matrix()
    };

    if let Some(node) = scene.transforms.get_mut(entity) {
        let moved_before = std::mem::take(&mut node.frame.moved_outside_pass);
        apply_outcome(entity, node, Outcome::Updated(world), run_post_ops);
        // The next pass must still report this move to dependents.
        node.frame.moved_outside_pass = moved_before || node.frame.world_changed;
    }
}

/// Recomputes one node's world matrix outside the frame pass.
///
/// With `recurse_to_root`, every node it depends on (parents and link targets)
/// is refreshed first, outermost first; post-operations only run for `entity`.
/// Immobility is ignored.
pub fn update_world_matrix(
    scene: &mut Scene,
    entity: EntityHandle,
    recurse_to_root: bool,
    run_post_ops: bool,
    ctx: &EngineContext,
) -> Result<()> {
    if !scene.transforms.contains_key(entity) {
        return Err(EngineError::EntityNotFound(entity));
    }
    let vr = ctx.vr.as_deref();

    if recurse_to_root {
        scene.update_scene_matrices();
        for dependency in dependency_chain(scene, entity) {
            update_single(scene, dependency, false, vr);
        }
    }

    update_single(scene, entity, run_post_ops, vr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::link::TransformLink;
    use std::sync::Arc;

    struct FollowLink(EntityHandle);

    impl TransformLink for FollowLink {
        fn dependency(&self) -> Option<EntityHandle> {
            Some(self.0)
        }

        fn compute_matrix(&self, ctx: &LinkContext<'_>) -> Option<Affine3A> {
            ctx.transforms.get(self.0).map(|n| *n.world_matrix())
        }
    }

    #[test]
    fn batches_follow_depth() {
        let mut scene = Scene::new();
        let a = scene.create_entity("a");
        let b = scene.create_entity("b");
        let c = scene.create_entity("c");
        scene.set_parent(b, Some(a)).unwrap();
        scene.set_parent(c, Some(b)).unwrap();

        let mut batches = LevelOrderBatches::new();
        build_level_order_batches(&scene, &mut batches);

        assert_eq!(batches.depth(), 3);
        assert_eq!(batches.level_of(a), Some(0));
        assert_eq!(batches.level_of(b), Some(1));
        assert_eq!(batches.level_of(c), Some(2));
        assert_eq!(batches.unreachable, 0);
    }

    #[test]
    fn linked_node_is_scheduled_after_target() {
        let mut scene = Scene::new();
        let root = scene.create_entity("root");
        let deep = scene.create_entity("deep");
        let deeper = scene.create_entity("deeper");
        scene.set_parent(deep, Some(root)).unwrap();
        scene.set_parent(deeper, Some(deep)).unwrap();

        let follower = scene.create_entity("follower");
        scene.set_link(follower, Some(Arc::new(FollowLink(deeper)))).unwrap();

        let mut batches = LevelOrderBatches::new();
        build_level_order_batches(&scene, &mut batches);

        assert_eq!(batches.level_of(follower), Some(3));
        assert_eq!(batches.total_nodes(), 4);
    }

    #[test]
    fn linked_node_waits_for_deeper_parent() {
        let mut scene = Scene::new();
        let target = scene.create_entity("target");
        let p0 = scene.create_entity("p0");
        let p1 = scene.create_entity("p1");
        scene.set_parent(p1, Some(p0)).unwrap();

        let x = scene.create_entity("x");
        scene.set_parent(x, Some(p1)).unwrap();
        scene.set_link(x, Some(Arc::new(FollowLink(target)))).unwrap();

        let mut batches = LevelOrderBatches::new();
        build_level_order_batches(&scene, &mut batches);

        assert_eq!(batches.level_of(x), Some(2));
        assert_eq!(batches.unreachable, 0);
        assert_eq!(dependency_chain(&scene, x), vec![target, p0, p1]);
    }

    #[test]
    fn dependency_chain_walks_links_and_parents() {
        let mut scene = Scene::new();
        let a = scene.create_entity("a");
        let b = scene.create_entity("b");
        let c = scene.create_entity("c");
        scene.set_parent(b, Some(a)).unwrap();
        scene.set_link(c, Some(Arc::new(FollowLink(b)))).unwrap();

        assert_eq!(dependency_chain(&scene, c), vec![a, b]);
        assert!(dependency_chain(&scene, a).is_empty());
    }
}
