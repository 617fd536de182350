//! The [`World`] is the top-level container for the store. It owns the entity
//! allocator, the component registry, all stashes, and the committed
//! membership view that filters evaluate against.
//!
//! Structural semantics: component *data* changes (set/remove) take effect
//! immediately in the stashes, but filter *membership* lags until
//! [`commit`](World::commit) folds the queued changes. Entity destruction is
//! the exception — it is a structural event in its own right and takes effect
//! at once, including the destruction notification hook.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::component::{
    short_type_name, ComponentKind, ComponentRegistry, ComponentTypeId, StateRecord,
};
use crate::disposer::{DisposerId, DisposerRegistry};
use crate::entity::{EntityAllocator, EntityId};
use crate::processor::StateInfo;
use crate::stash::{AnyStash, Stash};
use crate::EcsError;

/// Destruction notification callback. Runs before teardown of the destroyed
/// entity's components, so it can still observe and relocate them.
type DestroyHook = Box<dyn FnMut(&mut World, EntityId)>;

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The component store.
pub struct World {
    /// Entity ID allocator.
    allocator: EntityAllocator,
    /// Component type registry (also the state-record classification cache).
    registry: ComponentRegistry,
    /// One stash per registered component type, indexed by `ComponentTypeId.0`.
    pub(crate) stashes: Vec<Box<dyn AnyStash>>,
    /// Membership as of the last commit: entity -> component types it held.
    pub(crate) committed: BTreeMap<EntityId, BTreeSet<ComponentTypeId>>,
    /// Entities whose live data diverged from the committed view.
    dirty: BTreeSet<EntityId>,
    /// Per-state-type cleanup ownership.
    disposers: DisposerRegistry,
    /// Destruction notification hook slot.
    destroy_hook: Option<DestroyHook>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.committed.len())
            .field("component_types", &self.registry.len())
            .field("dirty", &self.dirty.len())
            .finish()
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            stashes: Vec::new(),
            committed: BTreeMap::new(),
            dirty: BTreeSet::new(),
            disposers: DisposerRegistry::new(),
            destroy_hook: None,
        }
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // -- registration -------------------------------------------------------

    /// Register an ordinary data component type under `name`.
    ///
    /// Idempotent per Rust type: re-registration returns the existing id.
    pub fn register_component<T>(&mut self, name: &str) -> ComponentTypeId
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        self.register_with_kind::<T>(name, ComponentKind::Data)
    }

    /// Register a state-record component type under `name`.
    ///
    /// Marks the type with [`ComponentKind::State`] (the capability the
    /// destruction migrator keys on) and registers + pairs its bookkeeping
    /// co-component. If `S` was previously registered as plain data it is
    /// promoted. Idempotent per Rust type.
    pub fn register_state<S: StateRecord>(&mut self, name: &str) -> ComponentTypeId {
        let state_id = match self.registry.lookup::<S>() {
            Some(existing) => {
                self.registry.promote_to_state(existing);
                existing
            }
            None => self.register_with_kind::<S>(name, ComponentKind::State),
        };

        let already_paired = self
            .registry
            .get_info(state_id)
            .and_then(|info| info.paired_info)
            .is_some();
        if !already_paired {
            let info_name = format!("{}.info", self.registry.name_of(state_id));
            let info_id = self.register_with_kind::<StateInfo<S>>(&info_name, ComponentKind::Data);
            self.registry.set_paired_info(state_id, info_id);
        }
        state_id
    }

    /// Register `S` as a state record under its Rust type path if it is not
    /// registered yet, and return `(state, info)` type ids.
    pub(crate) fn ensure_state_registered<S: StateRecord>(
        &mut self,
    ) -> (ComponentTypeId, ComponentTypeId) {
        let state_id = match self.registry.lookup::<S>() {
            Some(existing) => {
                let name = self.registry.name_of(existing).to_owned();
                self.register_state::<S>(&name)
            }
            None => self.register_state::<S>(std::any::type_name::<S>()),
        };
        let info_id = self
            .registry
            .get_info(state_id)
            .and_then(|info| info.paired_info)
            .expect("state registration always pairs a StateInfo component");
        (state_id, info_id)
    }

    fn register_with_kind<T>(&mut self, name: &str, kind: ComponentKind) -> ComponentTypeId
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        if let Some(existing) = self.registry.lookup::<T>() {
            return existing;
        }
        let id = self.registry.register::<T>(name, kind);
        self.stashes.push(Box::new(Stash::<T>::new(id)));
        id
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create a fresh entity. Takes effect immediately.
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.allocator.allocate();
        self.committed.insert(entity, BTreeSet::new());
        entity
    }

    /// Create an entity holding a single component.
    ///
    /// The component attachment follows normal structural rules: its filter
    /// membership becomes visible at the next [`commit`](World::commit).
    pub fn spawn_with<T>(&mut self, component: T) -> Result<EntityId, EcsError>
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        let entity = self.create_entity();
        self.set_component(entity, component)?;
        Ok(entity)
    }

    /// Destroy an entity outright.
    ///
    /// Runs the destruction notification hook first (the migrator attaches
    /// there and may relocate state records to a shadow entity), then removes
    /// every remaining component through its stash — firing disposal hooks —
    /// and retires the id. All of this is immediate.
    pub fn destroy_entity(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }

        if let Some(mut hook) = self.destroy_hook.take() {
            hook(self, entity);
            if self.destroy_hook.is_none() {
                self.destroy_hook = Some(hook);
            }
        }

        for stash in &mut self.stashes {
            stash.discard(entity);
        }
        self.committed.remove(&entity);
        self.dirty.remove(&entity);
        self.allocator.deallocate(entity);
        Ok(())
    }

    /// Whether `entity` is currently alive.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of alive entities.
    pub fn entity_count(&self) -> usize {
        self.committed.len()
    }

    // -- component access ---------------------------------------------------

    /// Attach or overwrite a component. Data effect is immediate; membership
    /// is deferred to the next commit.
    pub fn set_component<T>(&mut self, entity: EntityId, value: T) -> Result<(), EcsError>
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        let Some(type_id) = self.registry.lookup::<T>() else {
            return Err(self.unknown_component::<T>());
        };
        self.typed_stash_mut::<T>(type_id).set(entity, value);
        self.dirty.insert(entity);
        Ok(())
    }

    /// Detach a component. A no-op (returning `Ok`) when the entity does not
    /// hold it. When the type's disposal hook is installed, it runs on the
    /// removed value.
    pub fn remove_component<T>(&mut self, entity: EntityId) -> Result<(), EcsError>
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        let Some(type_id) = self.registry.lookup::<T>() else {
            return Err(self.unknown_component::<T>());
        };
        if self.typed_stash_mut::<T>(type_id).remove(entity) {
            self.dirty.insert(entity);
        }
        Ok(())
    }

    /// Immutable access to an entity's component, if attached.
    pub fn get_component<T: 'static>(&self, entity: EntityId) -> Option<&T> {
        let type_id = self.registry.lookup::<T>()?;
        self.typed_stash::<T>(type_id).get(entity)
    }

    /// Mutable access to an entity's component, if attached.
    pub fn get_component_mut<T: 'static>(&mut self, entity: EntityId) -> Option<&mut T> {
        let type_id = self.registry.lookup::<T>()?;
        self.typed_stash_mut::<T>(type_id).get_mut(entity)
    }

    /// Read-only access to the stash for component `T`, if registered.
    ///
    /// All mutation goes through the world so structural changes are queued
    /// correctly; the stash view is for inspection.
    pub fn stash<T: 'static>(&self) -> Option<&Stash<T>> {
        let type_id = self.registry.lookup::<T>()?;
        Some(self.typed_stash::<T>(type_id))
    }

    /// Whether the entity currently holds component `T` (live view).
    pub fn has_component<T: 'static>(&self, entity: EntityId) -> bool {
        match self.registry.lookup::<T>() {
            Some(type_id) => self.stashes[type_id.0 as usize].has(entity),
            None => false,
        }
    }

    // -- structural commit --------------------------------------------------

    /// Fold all queued structural changes into the committed membership view.
    ///
    /// This is the single point where filters learn about attachments and
    /// detachments performed since the previous commit.
    pub fn commit(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let dirty = std::mem::take(&mut self.dirty);
        let mut folded = 0usize;
        for entity in dirty {
            if !self.allocator.is_alive(entity) {
                continue;
            }
            let set = self.live_component_set(entity);
            self.committed.insert(entity, set);
            folded += 1;
        }
        debug!(entities = folded, "commit folded structural changes");
    }

    /// Fold a single entity's membership immediately, leaving every other
    /// queued change untouched. Used by the destruction migrator to publish
    /// the shadow entity outside the tick's deferral discipline.
    pub(crate) fn commit_entity(&mut self, entity: EntityId) {
        if !self.allocator.is_alive(entity) {
            return;
        }
        let set = self.live_component_set(entity);
        self.committed.insert(entity, set);
        self.dirty.remove(&entity);
    }

    fn live_component_set(&self, entity: EntityId) -> BTreeSet<ComponentTypeId> {
        self.stashes
            .iter()
            .filter(|stash| stash.has(entity))
            .map(|stash| stash.component_type_id())
            .collect()
    }

    // -- destruction notification hook --------------------------------------

    /// Install the destruction notification hook. Replaces any previous hook.
    pub fn set_destroy_hook(&mut self, hook: impl FnMut(&mut World, EntityId) + 'static) {
        self.destroy_hook = Some(Box::new(hook));
    }

    /// Remove the destruction notification hook.
    pub fn clear_destroy_hook(&mut self) {
        self.destroy_hook = None;
    }

    /// Whether a destruction notification hook is installed.
    pub fn has_destroy_hook(&self) -> bool {
        self.destroy_hook.is_some()
    }

    // -- disposal-hook plumbing ---------------------------------------------

    /// Claim the disposal slot for `S` and install `hook` in its stash.
    ///
    /// # Errors
    ///
    /// [`EcsError::ConflictingDisposer`] when another owner already holds the
    /// slot.
    pub(crate) fn install_dispose_hook<S: StateRecord>(
        &mut self,
        hook: Box<dyn FnMut(&mut S)>,
    ) -> Result<DisposerId, EcsError> {
        let Some(type_id) = self.registry.lookup::<S>() else {
            return Err(self.unknown_component::<S>());
        };
        let owner = self.disposers.issue();
        self.disposers
            .register(type_id, owner)
            .map_err(|_| EcsError::ConflictingDisposer {
                name: short_type_name::<S>().to_owned(),
            })?;
        self.typed_stash_mut::<S>(type_id).set_dispose_hook(hook);
        Ok(owner)
    }

    /// Release the disposal slot for `S` if `owner` holds it, clearing the
    /// stash hook. Anything else is a guarded no-op.
    pub(crate) fn release_dispose_hook<S: StateRecord>(&mut self, owner: DisposerId) {
        let Some(type_id) = self.registry.lookup::<S>() else {
            return;
        };
        if self.disposers.unregister(type_id, owner) {
            self.stashes[type_id.0 as usize].clear_dispose_hook();
        }
    }

    // -- internal helpers ---------------------------------------------------

    fn typed_stash<T: 'static>(&self, type_id: ComponentTypeId) -> &Stash<T> {
        self.stashes[type_id.0 as usize]
            .as_any()
            .downcast_ref::<Stash<T>>()
            .expect("stash type does not match registered component type")
    }

    fn typed_stash_mut<T: 'static>(&mut self, type_id: ComponentTypeId) -> &mut Stash<T> {
        self.stashes[type_id.0 as usize]
            .as_any_mut()
            .downcast_mut::<Stash<T>>()
            .expect("stash type does not match registered component type")
    }

    fn unknown_component<T>(&self) -> EcsError {
        EcsError::UnknownComponent {
            name: std::any::type_name::<T>().to_owned(),
            registered: self.registry.registered_names().join(", "),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Attachment {
        handle: u32,
    }

    impl StateRecord for Attachment {}

    fn setup() -> World {
        let mut world = World::new();
        world.register_component::<Pos>("position");
        world
    }

    #[test]
    fn set_and_get() {
        let mut world = setup();
        let e = world.create_entity();
        world.set_component(e, Pos { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x: 1.0, y: 2.0 }));
        assert!(world.has_component::<Pos>(e));
    }

    #[test]
    fn set_on_dead_entity_errors() {
        let mut world = setup();
        let e = world.create_entity();
        world.destroy_entity(e).unwrap();
        assert!(matches!(
            world.set_component(e, Pos { x: 0.0, y: 0.0 }),
            Err(EcsError::StaleEntity { .. })
        ));
    }

    #[test]
    fn unregistered_component_errors() {
        let mut world = World::new();
        let e = world.create_entity();
        let err = world.set_component(e, Pos { x: 0.0, y: 0.0 }).unwrap_err();
        assert!(matches!(err, EcsError::UnknownComponent { .. }));
    }

    #[test]
    fn destroy_is_immediate_and_stale_after() {
        let mut world = setup();
        let e = world.create_entity();
        world.set_component(e, Pos { x: 0.0, y: 0.0 }).unwrap();
        world.commit();

        world.destroy_entity(e).unwrap();
        assert!(!world.is_alive(e));
        assert_eq!(world.get_component::<Pos>(e), None);
        assert!(world.destroy_entity(e).is_err());
    }

    #[test]
    fn destroy_fires_dispose_hooks() {
        let mut world = setup();
        world.register_state::<Attachment>("attachment");
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        world
            .install_dispose_hook::<Attachment>(Box::new(move |_| c.set(c.get() + 1)))
            .unwrap();

        let e = world.create_entity();
        world.set_component(e, Attachment { handle: 3 }).unwrap();
        world.commit();

        world.destroy_entity(e).unwrap();
        assert_eq!(count.get(), 1, "teardown must dispose attached state");
    }

    #[test]
    fn dispose_slot_conflicts_and_reuse() {
        let mut world = World::new();
        world.register_state::<Attachment>("attachment");

        let owner = world
            .install_dispose_hook::<Attachment>(Box::new(|_| {}))
            .unwrap();
        let err = world
            .install_dispose_hook::<Attachment>(Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, EcsError::ConflictingDisposer { ref name } if name == "Attachment"));

        world.release_dispose_hook::<Attachment>(owner);
        world
            .install_dispose_hook::<Attachment>(Box::new(|_| {}))
            .unwrap();
    }

    #[test]
    fn destroy_hook_runs_before_teardown() {
        let mut world = setup();
        let observed = Rc::new(Cell::new(false));
        let o = Rc::clone(&observed);
        world.set_destroy_hook(move |world, entity| {
            // The dying entity's components are still attached here.
            o.set(world.has_component::<Pos>(entity));
        });

        let e = world.create_entity();
        world.set_component(e, Pos { x: 0.0, y: 0.0 }).unwrap();
        world.destroy_entity(e).unwrap();
        assert!(observed.get());
    }

    #[test]
    fn register_state_pairs_bookkeeping_type() {
        let mut world = World::new();
        let state_id = world.register_state::<Attachment>("attachment");
        let info = world.registry().get_info(state_id).unwrap();
        assert_eq!(info.kind, ComponentKind::State);
        let paired = info.paired_info.expect("state registration pairs an info type");
        assert_eq!(world.registry().name_of(paired), "attachment.info");
    }

    #[test]
    fn register_state_promotes_existing_data_type() {
        let mut world = World::new();
        let as_data = world.register_component::<Attachment>("attachment");
        let as_state = world.register_state::<Attachment>("ignored");
        assert_eq!(as_data, as_state);
        assert_eq!(
            world.registry().get_info(as_state).unwrap().kind,
            ComponentKind::State
        );
    }
}
