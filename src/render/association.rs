//! Component association tables.
//!
//! A [`ComponentAssociationTable`] keeps one processor-private shadow value
//! (a render record) per live component of one kind. It follows the scene's
//! component journal, so shadows appear when the component and all of its
//! dependencies are present and disappear as soon as either goes away.
//!
//! Associations are stored densely in insertion order. Removal preserves the
//! relative order of the remaining entries, which keeps per-frame iteration
//! deterministic.

use rustc_hash::FxHashMap;

use crate::scene::{ChangeKind, Component, ComponentChange, ComponentId, EntityHandle, Scene};

/// Identity of one association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssociationKey {
    pub entity: EntityHandle,
    pub component: ComponentId,
}

/// Per-kind hooks that build and tear down shadow records.
pub trait AssociationProcessor: Send + Sync {
    type Component: Component;
    type Shadow: Send + Sync;

    /// Creates the shadow record for a newly associated component.
    fn generate(&self, entity: EntityHandle, component: &Self::Component, scene: &Scene) -> Self::Shadow;

    /// Whether `shadow` still belongs to `component`.
    fn validate(&self, component: &Self::Component, shadow: &Self::Shadow) -> bool;

    /// Runs after generation, before the shadow is registered.
    fn on_adding(&self, _entity: EntityHandle, _component: &Self::Component, _shadow: &mut Self::Shadow) {}

    /// Publishes the shadow to external registries.
    fn register(&self, _shadow: &mut Self::Shadow) {}

    /// Runs once the association is gone. Must unregister everything `register` published.
    fn on_removed(&self, entity: EntityHandle, shadow: Self::Shadow);
}

pub struct ComponentAssociationTable<P: AssociationProcessor> {
    processor: P,
    keys: Vec<AssociationKey>,
    values: Vec<P::Shadow>,
    lookup: FxHashMap<EntityHandle, usize>,
}

impl<P: AssociationProcessor> ComponentAssociationTable<P> {
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            keys: Vec::new(),
            values: Vec::new(),
            lookup: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn processor(&self) -> &P {
        &self.processor
    }

    #[inline]
    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn contains(&self, entity: EntityHandle) -> bool {
        self.lookup.contains_key(&entity)
    }

    pub fn get(&self, entity: EntityHandle) -> Option<&P::Shadow> {
        self.lookup.get(&entity).map(|&i| &self.values[i])
    }

    pub fn key(&self, entity: EntityHandle) -> Option<AssociationKey> {
        self.lookup.get(&entity).map(|&i| self.keys[i])
    }

    /// Associations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&AssociationKey, &P::Shadow)> {
        self.keys.iter().zip(self.values.iter())
    }

    pub fn keys(&self) -> &[AssociationKey] {
        &self.keys
    }

    /// Splits the table for a synchronization pass over all shadows.
    pub fn split_mut(&mut self) -> (&P, &[AssociationKey], &mut [P::Shadow]) {
        (&self.processor, &self.keys, &mut self.values)
    }

    // ========================================================================
    // Journal handling
    // ========================================================================

    /// Associates the entity's component if it and its dependencies exist.
    ///
    /// Returns whether a new association was created. A component whose
    /// dependencies are missing is left alone; it is picked up when the
    /// dependency is added.
    pub fn on_component_added(&mut self, scene: &Scene, entity: EntityHandle) -> bool {
        let Some(component) = <P::Component as Component>::storage(scene).get(entity) else {
            return false;
        };

        if !scene.dependencies_met::<P::Component>(entity) {
            log::trace!("{entity:?}: {:?} waits for its dependencies", P::Component::KIND);
            return false;
        }

        if let Some(&i) = self.lookup.get(&entity) {
            if self.keys[i].component == component.id()
                && self.processor.validate(component, &self.values[i])
            {
                return false;
            }
            // Replaced in place; drop the stale association first.
            self.on_component_removed(entity);
        }

        let mut shadow = self.processor.generate(entity, component, scene);
        self.processor.on_adding(entity, component, &mut shadow);
        self.processor.register(&mut shadow);

        self.lookup.insert(entity, self.keys.len());
        self.keys.push(AssociationKey {
            entity,
            component: component.id(),
        });
        self.values.push(shadow);
        true
    }

    /// Drops the entity's association, if any. Returns whether one existed.
    pub fn on_component_removed(&mut self, entity: EntityHandle) -> bool {
        let Some(index) = self.lookup.remove(&entity) else {
            return false;
        };

        self.keys.remove(index);
        let shadow = self.values.remove(index);
        for slot in self.lookup.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }

        self.processor.on_removed(entity, shadow);
        true
    }

    /// Applies one journal entry.
    pub fn on_change(&mut self, scene: &Scene, change: &ComponentChange) {
        let own = change.kind == P::Component::KIND;
        let dependency = P::Component::DEPENDENCIES.contains(&change.kind);
        if !own && !dependency {
            return;
        }

        match change.change {
            ChangeKind::Added => {
                self.on_component_added(scene, change.entity);
            }
            ChangeKind::Removed if own => {
                self.on_component_removed(change.entity);
            }
            ChangeKind::Removed => {
                if !scene.dependencies_met::<P::Component>(change.entity) {
                    self.on_component_removed(change.entity);
                }
            }
        }
    }

    /// Regenerates associations whose component was replaced or removed
    /// without going through the journal. Returns the number fixed.
    pub fn validate_all(&mut self, scene: &Scene) -> usize {
        let storage = <P::Component as Component>::storage(scene);
        let stale: Vec<EntityHandle> = self
            .keys
            .iter()
            .zip(self.values.iter())
            .filter(|(key, shadow)| {
                storage.get(key.entity).is_none_or(|component| {
                    component.id() != key.component || !self.processor.validate(component, shadow)
                })
            })
            .map(|(key, _)| key.entity)
            .collect();

        for &entity in &stale {
            log::debug!("{entity:?}: {:?} was swapped in place, regenerating", P::Component::KIND);
            self.on_component_removed(entity);
            self.on_component_added(scene, entity);
        }
        stale.len()
    }

    /// Drops every association.
    pub fn clear(&mut self) {
        self.lookup.clear();
        let keys = std::mem::take(&mut self.keys);
        let values = std::mem::take(&mut self.values);
        for (key, shadow) in keys.into_iter().zip(values) {
            self.processor.on_removed(key.entity, shadow);
        }
    }
}
