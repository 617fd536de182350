//! Component type registration and capability metadata.
//!
//! Every component type used in the store must be registered at runtime in a
//! [`ComponentRegistry`]. Registration produces a [`ComponentTypeId`] used as
//! the key for stash lookups and filter matching, and records the type's
//! [`ComponentKind`] — the capability metadata the destruction migrator
//! consults to decide which components survive their entity. The kind is
//! computed once, at registration, and never changes afterwards: the registry
//! is the append-only classification cache.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// What role a registered component type plays in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// Ordinary data: dies with its entity.
    Data,
    /// A state record: its lifecycle is driven by a
    /// [`StateProcessor`](crate::processor::StateProcessor), and on entity
    /// destruction it is relocated rather than dropped.
    State,
}

// ---------------------------------------------------------------------------
// StateRecord
// ---------------------------------------------------------------------------

/// Marker trait for component types whose lifecycle is externally managed by
/// a [`StateProcessor`](crate::processor::StateProcessor).
///
/// A state record must not release resources of its own accord: cleanup is
/// always routed through the processor's cleanup callback, so it runs exactly
/// once and is observable in one place. A type that does free a resource in
/// its own `Drop` impl must declare it by setting [`SELF_DISPOSING`] to
/// `true`; every processor constructor rejects such types up front.
///
/// [`SELF_DISPOSING`]: StateRecord::SELF_DISPOSING
pub trait StateRecord:
    Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>
{
    /// Whether the type releases resources in its own `Drop` implementation.
    const SELF_DISPOSING: bool = false;
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// Human-readable name (supplied by the caller, or the Rust type path
    /// for auto-registered state types).
    pub name: String,
    /// Capability classification, fixed at registration.
    pub kind: ComponentKind,
    /// For `ComponentKind::State` types: the bookkeeping component that is
    /// added and removed together with this one.
    pub paired_info: Option<ComponentTypeId>,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to [`ComponentTypeId`]s and their metadata.
///
/// A type can only be registered once; re-registering the same Rust `TypeId`
/// returns the existing [`ComponentTypeId`].
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// TypeId -> ComponentTypeId for dedup.
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Names already taken, to catch two types claiming one name.
    by_name: HashMap<String, ComponentTypeId>,
    /// Indexed by ComponentTypeId.0.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under the given `name` and `kind`.
    ///
    /// If the type is already registered, the existing [`ComponentTypeId`] is
    /// returned and `name`/`kind` are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered for a different type.
    pub fn register<T: 'static>(&mut self, name: &str, kind: ComponentKind) -> ComponentTypeId {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return existing;
        }

        if self.by_name.contains_key(name) {
            panic!("component name '{name}' is already registered for a different type");
        }

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            kind,
            paired_info: None,
            type_id: rust_type_id,
        });
        self.by_type.insert(rust_type_id, id);
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// Reclassify an already-registered type as a state record.
    ///
    /// Used when a processor is constructed for a type that was first
    /// registered as plain data. Classification only ever moves from `Data`
    /// to `State`, keeping the cache append-only.
    pub(crate) fn promote_to_state(&mut self, id: ComponentTypeId) {
        self.infos[id.0 as usize].kind = ComponentKind::State;
    }

    /// Record the bookkeeping component paired with a state type.
    pub(crate) fn set_paired_info(&mut self, state: ComponentTypeId, info: ComponentTypeId) {
        self.infos[state.0 as usize].paired_info = Some(info);
    }

    /// Look up a component type by its Rust `TypeId`.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Get the [`ComponentInfo`] for a registered component type ID.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.0 as usize)
    }

    /// The registered name for a component type ID.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    pub fn name_of(&self, id: ComponentTypeId) -> &str {
        &self.infos[id.0 as usize].name
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.infos.iter().map(|i| i.name.as_str()).collect();
        names.sort();
        names
    }
}

/// The last path segment of a Rust type name, for error messages.
pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
