//! The destruction migrator: keeps the exactly-once-cleanup guarantee alive
//! across outright entity destruction.
//!
//! A destroyed entity can no longer be observed by a later reconciliation
//! pass, so any state records it carries would leak their cleanup. The
//! migrator hooks the store's destruction notification and relocates every
//! state record — together with its paired bookkeeping component — onto a
//! freshly created *shadow entity*. The move invokes no callbacks; the next
//! ordinary pass finds the orphaned record with a stale stamp and cleans it
//! up through the normal sweep.

use tracing::debug;

use crate::component::{ComponentKind, ComponentTypeId};
use crate::entity::EntityId;
use crate::stash::AnyStash;
use crate::world::World;

/// Install the migrator on the world's destruction notification hook.
///
/// Replaces any previously installed hook. The migrator is agnostic of which
/// state processors exist; it relocates every component registered with
/// [`ComponentKind::State`].
pub fn attach_state_migrator(world: &mut World) {
    world.set_destroy_hook(|world, entity| {
        migrate_state_records(world, entity);
    });
}

/// Relocate the dying entity's state records to a shadow entity.
///
/// Enumerates the entity's attached component types in type-id order and
/// classifies each through the registry — the classification was fixed at
/// registration, so this is a plain memoized lookup. On the first qualifying
/// type, exactly one shadow entity is created; every qualifying record and
/// its paired bookkeeping component are then *moved* (never copied) onto it.
/// When nothing qualifies, no shadow is created and the world is untouched.
///
/// The shadow's membership is folded into the committed view immediately:
/// destruction is a structural event of its own, outside the tick's deferral
/// discipline, and the very next pass must be able to see the orphan.
///
/// Returns the shadow entity, if one was created.
pub fn migrate_state_records(world: &mut World, entity: EntityId) -> Option<EntityId> {
    let attached: Vec<ComponentTypeId> = world
        .stashes
        .iter()
        .filter(|stash| stash.has(entity))
        .map(|stash| stash.component_type_id())
        .collect();

    let mut shadow: Option<EntityId> = None;
    for type_id in attached {
        let (kind, paired_info) = match world.registry().get_info(type_id) {
            Some(info) => (info.kind, info.paired_info),
            None => continue,
        };
        if kind != ComponentKind::State {
            continue;
        }

        let target = match shadow {
            Some(existing) => existing,
            None => {
                let created = world.create_entity();
                shadow = Some(created);
                created
            }
        };

        world.stashes[type_id.0 as usize].transfer(entity, target);
        if let Some(info_id) = paired_info {
            world.stashes[info_id.0 as usize].transfer(entity, target);
        }
    }

    if let Some(target) = shadow {
        world.commit_entity(target);
        debug!(from = %entity, to = %target, "relocated state records off destroyed entity");
    }
    shadow
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
