//! The state processor: per-tick reconciliation of derived state records
//! against a predicate.
//!
//! A [`StateProcessor`] watches the entities matching a [`Filter`]. When an
//! entity starts matching, the setup callback produces a state record that is
//! attached to it; when it stops matching — or is destroyed and its record
//! migrated — the record is detached and the cleanup callback (if any) runs
//! exactly once. Each record is tracked through a paired bookkeeping
//! component stamped with the frame it was last seen matching.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::component::{short_type_name, StateRecord};
use crate::disposer::DisposerId;
use crate::entity::EntityId;
use crate::filter::Filter;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// StateInfo
// ---------------------------------------------------------------------------

/// Bookkeeping co-component for one state record type.
///
/// Added and removed strictly together with the state record it tracks.
/// `last_seen_frame == current frame` exactly when the entity matched the
/// processor's predicate during the reconciliation pass that set the frame,
/// which lets the sweep answer "did this entity still qualify?" without a
/// separate set structure.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub(crate) struct StateInfo<S> {
    pub(crate) last_seen_frame: u64,
    #[serde(skip)]
    _marker: PhantomData<S>,
}

impl<S> StateInfo<S> {
    fn stamp(frame: u64) -> Self {
        Self {
            last_seen_frame: frame,
            _marker: PhantomData,
        }
    }
}

impl<S> Clone for StateInfo<S> {
    fn clone(&self) -> Self {
        Self {
            last_seen_frame: self.last_seen_frame,
            _marker: PhantomData,
        }
    }
}

impl<S> fmt::Debug for StateInfo<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateInfo")
            .field("last_seen_frame", &self.last_seen_frame)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// StateProcessor
// ---------------------------------------------------------------------------

/// Reconciles one state record type against a predicate, once per tick.
///
/// Holds only non-owning query values into the world; the world is passed to
/// every operation. The frame counter is private to this instance and never
/// shared.
pub struct StateProcessor<S: StateRecord> {
    /// The user predicate: which entities should carry state.
    predicate: Filter,
    /// Predicate refined with "lacks `S`": entities needing setup.
    missing_state: Filter,
    /// Store-wide "holds `S`", independent of the predicate.
    state_holders: Filter,
    setup: Box<dyn FnMut(EntityId) -> S>,
    /// Disposal-slot ownership token, present iff constructed with a cleanup
    /// callback. The callback itself lives in the stash's hook slot.
    disposer: Option<DisposerId>,
    frame: u64,
}

impl<S: StateRecord> StateProcessor<S> {
    /// Construct a processor without a cleanup callback: records are simply
    /// dropped when their entity stops matching.
    ///
    /// # Errors
    ///
    /// [`EcsError::SelfDisposingState`] when `S` declares
    /// [`StateRecord::SELF_DISPOSING`].
    pub fn new(
        world: &mut World,
        predicate: Filter,
        setup: impl FnMut(EntityId) -> S + 'static,
    ) -> Result<Self, EcsError> {
        Self::build(world, predicate, Box::new(setup), None)
    }

    /// Construct a disposing processor: `cleanup` runs by mutable reference
    /// on every record the instant it is detached.
    ///
    /// # Errors
    ///
    /// [`EcsError::SelfDisposingState`] when `S` declares
    /// [`StateRecord::SELF_DISPOSING`]; [`EcsError::ConflictingDisposer`]
    /// when another disposing processor for `S` is already active on this
    /// world.
    pub fn with_cleanup(
        world: &mut World,
        predicate: Filter,
        setup: impl FnMut(EntityId) -> S + 'static,
        cleanup: impl FnMut(&mut S) + 'static,
    ) -> Result<Self, EcsError> {
        Self::build(world, predicate, Box::new(setup), Some(Box::new(cleanup)))
    }

    fn build(
        world: &mut World,
        predicate: Filter,
        setup: Box<dyn FnMut(EntityId) -> S>,
        cleanup: Option<Box<dyn FnMut(&mut S)>>,
    ) -> Result<Self, EcsError> {
        // A state record must never be disposable on its own, with or
        // without a cleanup callback; otherwise its resources could be
        // released outside the processor's control.
        if S::SELF_DISPOSING {
            return Err(EcsError::SelfDisposingState {
                name: short_type_name::<S>().to_owned(),
            });
        }

        let (state_id, _info_id) = world.ensure_state_registered::<S>();

        let disposer = match cleanup {
            Some(hook) => Some(world.install_dispose_hook::<S>(hook)?),
            None => None,
        };

        let missing_state = predicate.without_id(state_id);
        let state_holders = Filter::with_id(state_id);

        Ok(Self {
            predicate,
            missing_state,
            state_holders,
            setup,
            disposer,
            frame: 0,
        })
    }

    /// The predicate this processor reconciles against.
    pub fn predicate(&self) -> &Filter {
        &self.predicate
    }

    /// The current frame counter (number of completed `process` calls).
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Whether this processor owns the cleanup slot for `S`.
    pub fn is_disposing(&self) -> bool {
        self.disposer.is_some()
    }

    /// Run one reconciliation pass.
    ///
    /// 1. Bump the frame counter.
    /// 2. Stamp the bookkeeping component on *every* entity currently
    ///    matching the predicate, before any removal decision — survival of a pass
    ///    depends only on membership at the moment of the call, never on
    ///    iteration order.
    /// 3. Attach a freshly set-up record to every match that lacks one.
    /// 4. For every entity holding a record, regardless of predicate: if its
    ///    stamp is missing or stale, detach info and record. Detaching the
    ///    record through its stash runs the cleanup callback on it.
    /// 5. Publish all queued attachments/detachments as one commit.
    ///
    /// Because filters read the membership view as of the last commit, a
    /// predicate loss still queued when this method runs is invisible to
    /// this pass; the pass's own commit publishes it and the *next* pass
    /// performs the cleanup. That one-cycle deferral is part of the
    /// contract, not an artifact.
    ///
    /// A panicking setup or cleanup callback unwinds through this method
    /// with the pass's structural changes partially applied; callbacks are
    /// expected to be idempotent.
    pub fn process(&mut self, world: &mut World) -> Result<(), EcsError> {
        self.frame += 1;
        let current_frame = self.frame;

        let matching: Vec<EntityId> = self.predicate.entities(world).collect();
        for &entity in &matching {
            world.set_component(entity, StateInfo::<S>::stamp(current_frame))?;
        }

        let missing: Vec<EntityId> = self.missing_state.entities(world).collect();
        let created = missing.len();
        for entity in missing {
            let state = (self.setup)(entity);
            world.set_component(entity, state)?;
        }

        let holders: Vec<EntityId> = self.state_holders.entities(world).collect();
        let mut removed = 0usize;
        for entity in holders {
            let fresh = world
                .get_component::<StateInfo<S>>(entity)
                .is_some_and(|info| info.last_seen_frame == current_frame);
            if fresh {
                continue;
            }
            world.remove_component::<StateInfo<S>>(entity)?;
            world.remove_component::<S>(entity)?;
            removed += 1;
        }

        world.commit();
        debug!(
            state = short_type_name::<S>(),
            frame = current_frame,
            matching = matching.len(),
            created,
            removed,
            "reconciliation pass"
        );
        Ok(())
    }

    /// Detach every record currently held, independent of the predicate,
    /// running the cleanup callback for each.
    ///
    /// Short-circuits without committing when nothing holds a record, so a
    /// second call right after a first is a strict no-op.
    pub fn destroy_all_states(&mut self, world: &mut World) -> Result<(), EcsError> {
        if self.state_holders.is_empty(world) {
            return Ok(());
        }
        let holders: Vec<EntityId> = self.state_holders.entities(world).collect();
        for entity in holders {
            world.remove_component::<StateInfo<S>>(entity)?;
            world.remove_component::<S>(entity)?;
        }
        world.commit();
        Ok(())
    }

    /// Tear the processor down: destroy all remaining records, then release
    /// the cleanup slot so a new disposing processor for `S` may be
    /// constructed on this world.
    pub fn dispose(mut self, world: &mut World) -> Result<(), EcsError> {
        self.destroy_all_states(world)?;
        if let Some(owner) = self.disposer.take() {
            world.release_dispose_hook::<S>(owner);
        }
        Ok(())
    }
}

impl<S: StateRecord> fmt::Debug for StateProcessor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateProcessor")
            .field("state", &short_type_name::<S>())
            .field("frame", &self.frame)
            .field("disposing", &self.disposer.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
