//! Vestige ECS -- lifecycle tracking for derived state in a component store.
//!
//! This crate manages *derived, secondary state* that must follow the
//! membership of a dynamic entity set: when an entity starts matching a
//! predicate, a setup callback produces a state record attached to it; when
//! it stops matching — by losing components or by being destroyed outright —
//! a cleanup callback runs exactly once. The [`StateProcessor`] performs the
//! per-tick diff, the [`disposer`] registry guarantees a single cleanup owner
//! per state type, and the [`migration`] hook carries records across entity
//! destruction on shadow entities so no cleanup is ever lost.
//!
//! [`StateProcessor`]: processor::StateProcessor
//!
//! # Quick Start
//!
//! ```
//! use vestige_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Burning;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct FireSound { channel: u32 }
//!
//! impl StateRecord for FireSound {}
//!
//! let mut world = World::new();
//! world.register_component::<Burning>("burning");
//!
//! let burning = world.filter().with::<Burning>().build();
//! let mut sounds = StateProcessor::with_cleanup(
//!     &mut world,
//!     burning,
//!     |entity| FireSound { channel: entity.index() },
//!     |sound| { let _ = sound.channel; /* stop playback here */ },
//! )?;
//!
//! let campfire = world.spawn_with(Burning)?;
//! world.commit();
//! sounds.process(&mut world)?;
//! assert!(world.get_component::<FireSound>(campfire).is_some());
//!
//! world.remove_component::<Burning>(campfire)?;
//! sounds.process(&mut world)?; // loss still queued: the record survives
//! sounds.process(&mut world)?; // published last pass: cleaned up now
//! assert!(world.get_component::<FireSound>(campfire).is_none());
//!
//! sounds.dispose(&mut world)?;
//! # Ok::<(), vestige_ecs::EcsError>(())
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod disposer;
pub mod entity;
pub mod filter;
pub mod migration;
pub mod processor;
pub mod stash;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by store and processor operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity} does not exist (stale or never allocated)")]
    StaleEntity {
        entity: entity::EntityId,
    },

    /// A component type was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent {
        name: String,
        registered: String,
    },

    /// The state type declares its own disposal; its lifecycle cannot be
    /// driven by a processor.
    #[error("state type '{name}' declares its own disposal and cannot be driven by a state processor")]
    SelfDisposingState {
        name: String,
    },

    /// A disposing processor for this state type is already active.
    #[error("a disposing state processor for '{name}' is already active on this world")]
    ConflictingDisposer {
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{ComponentInfo, ComponentKind, ComponentRegistry, ComponentTypeId, StateRecord};
    pub use crate::entity::EntityId;
    pub use crate::filter::{Filter, FilterBuilder};
    pub use crate::migration::{attach_state_migrator, migrate_state_records};
    pub use crate::processor::StateProcessor;
    pub use crate::world::World;
    pub use crate::EcsError;
}
