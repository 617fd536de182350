//! Predicates over the committed membership view.
//!
//! A [`Filter`] selects entities by component conditions: every `with` type
//! present, every `without` type absent. Filters evaluate against the world's
//! *committed* view — the membership as of the last
//! [`World::commit`](crate::world::World::commit) — so structural changes
//! queued mid-tick stay invisible until they are committed. That lag is load
//! bearing for the state processor's one-cycle cleanup deferral.
//!
//! Build a filter with [`World::filter`]:
//!
//! ```ignore
//! let burning = world.filter().with::<Burning>().without::<Extinguished>().build();
//! for entity in burning.entities(&world) { /* ... */ }
//! ```

use std::collections::BTreeSet;

use crate::component::ComponentTypeId;
use crate::entity::EntityId;
use crate::world::World;

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// An immutable predicate over entity component sets.
///
/// Filters are plain values holding component type ids; they borrow nothing
/// from the world and can outlive any number of structural changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    with: Vec<ComponentTypeId>,
    without: Vec<ComponentTypeId>,
}

impl Filter {
    pub(crate) fn from_parts(
        mut with: Vec<ComponentTypeId>,
        mut without: Vec<ComponentTypeId>,
    ) -> Self {
        with.sort();
        with.dedup();
        without.sort();
        without.dedup();
        Self { with, without }
    }

    /// A filter matching every entity that holds the single given type.
    pub(crate) fn with_id(type_id: ComponentTypeId) -> Self {
        Self {
            with: vec![type_id],
            without: Vec::new(),
        }
    }

    /// Refine this filter with a "lacks component type `T`" condition.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered in `world`.
    pub fn without<T: 'static>(&self, world: &World) -> Filter {
        let type_id = world
            .registry()
            .lookup::<T>()
            .expect("component type not registered -- call world.register_component::<T>() first");
        self.without_id(type_id)
    }

    pub(crate) fn without_id(&self, type_id: ComponentTypeId) -> Filter {
        let mut without = self.without.clone();
        without.push(type_id);
        Filter::from_parts(self.with.clone(), without)
    }

    fn matches_set(&self, set: &BTreeSet<ComponentTypeId>) -> bool {
        self.with.iter().all(|id| set.contains(id))
            && !self.without.iter().any(|id| set.contains(id))
    }

    /// Whether `entity` matches in the committed view.
    pub fn matches(&self, world: &World, entity: EntityId) -> bool {
        world
            .committed
            .get(&entity)
            .is_some_and(|set| self.matches_set(set))
    }

    /// Iterate entities matching in the committed view, in id order.
    pub fn entities<'w>(&'w self, world: &'w World) -> impl Iterator<Item = EntityId> + 'w {
        world
            .committed
            .iter()
            .filter(|(_, set)| self.matches_set(set))
            .map(|(&entity, _)| entity)
    }

    /// Whether no entity matches in the committed view.
    pub fn is_empty(&self, world: &World) -> bool {
        self.entities(world).next().is_none()
    }
}

// ---------------------------------------------------------------------------
// FilterBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Filter`]s, obtained from [`World::filter`].
pub struct FilterBuilder<'w> {
    world: &'w World,
    with: Vec<ComponentTypeId>,
    without: Vec<ComponentTypeId>,
}

impl<'w> FilterBuilder<'w> {
    fn lookup<T: 'static>(&self) -> ComponentTypeId {
        self.world
            .registry()
            .lookup::<T>()
            .expect("component type not registered -- call world.register_component::<T>() first")
    }

    /// Require component `T` to be present.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn with<T: 'static>(mut self) -> Self {
        let id = self.lookup::<T>();
        self.with.push(id);
        self
    }

    /// Require component `T` to be absent.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn without<T: 'static>(mut self) -> Self {
        let id = self.lookup::<T>();
        self.without.push(id);
        self
    }

    /// Finish, yielding an owned [`Filter`].
    pub fn build(self) -> Filter {
        Filter::from_parts(self.with, self.without)
    }
}

impl World {
    /// Start building a [`Filter`] against this world's registry.
    pub fn filter(&self) -> FilterBuilder<'_> {
        FilterBuilder {
            world: self,
            with: Vec::new(),
            without: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
