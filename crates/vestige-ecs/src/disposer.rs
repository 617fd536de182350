//! The disposer registry: per-world, per-state-type cleanup ownership.
//!
//! At most one [`StateProcessor`](crate::processor::StateProcessor) with a
//! cleanup callback may be active for a given state type on a given world.
//! This registry is the sole mechanism enforcing that: a disposing processor
//! registers here at construction and unregisters at teardown. The mutual
//! exclusion is settled at those two points — there is no runtime locking.

use std::collections::HashMap;

use tracing::warn;

use crate::component::ComponentTypeId;

/// Token identifying one registration. Issued per processor instance so a
/// late `unregister` from an already-replaced owner cannot clear a slot it
/// no longer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisposerId(u64);

/// Map from state component type to the currently active disposing owner.
///
/// World-scoped: two independent worlds never interfere.
#[derive(Debug, Default)]
pub(crate) struct DisposerRegistry {
    slots: HashMap<ComponentTypeId, DisposerId>,
    next: u64,
}

impl DisposerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh owner token.
    pub(crate) fn issue(&mut self) -> DisposerId {
        let id = DisposerId(self.next);
        self.next += 1;
        id
    }

    /// Claim the slot for `type_id`. Fails when a different owner holds it.
    pub(crate) fn register(
        &mut self,
        type_id: ComponentTypeId,
        owner: DisposerId,
    ) -> Result<(), DisposerId> {
        match self.slots.get(&type_id) {
            Some(&current) if current != owner => Err(current),
            _ => {
                self.slots.insert(type_id, owner);
                Ok(())
            }
        }
    }

    /// Release the slot for `type_id`, but only if `owner` holds it.
    ///
    /// Returns `true` when the slot was cleared. A mismatched or absent
    /// owner is a tolerated no-op; it guards against double-dispose.
    pub(crate) fn unregister(&mut self, type_id: ComponentTypeId, owner: DisposerId) -> bool {
        match self.slots.get(&type_id) {
            Some(&current) if current == owner => {
                self.slots.remove(&type_id);
                true
            }
            Some(&current) => {
                warn!(
                    ?type_id,
                    ?owner,
                    ?current,
                    "unregister skipped: disposal slot held by another owner"
                );
                false
            }
            None => false,
        }
    }

}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TYPE_A: ComponentTypeId = ComponentTypeId(0);
    const TYPE_B: ComponentTypeId = ComponentTypeId(1);

    #[test]
    fn register_then_conflict() {
        let mut reg = DisposerRegistry::new();
        let a = reg.issue();
        let b = reg.issue();
        assert!(reg.register(TYPE_A, a).is_ok());
        assert_eq!(reg.register(TYPE_A, b), Err(a));
        // A different type is an independent slot.
        assert!(reg.register(TYPE_B, b).is_ok());
    }

    #[test]
    fn re_register_same_owner_is_ok() {
        let mut reg = DisposerRegistry::new();
        let a = reg.issue();
        assert!(reg.register(TYPE_A, a).is_ok());
        assert!(reg.register(TYPE_A, a).is_ok());
    }

    #[test]
    fn unregister_only_clears_matching_owner() {
        let mut reg = DisposerRegistry::new();
        let a = reg.issue();
        let b = reg.issue();
        reg.register(TYPE_A, a).unwrap();

        assert!(!reg.unregister(TYPE_A, b), "foreign owner must not clear");
        assert_eq!(reg.register(TYPE_B, a), Ok(()));
        assert_eq!(reg.register(TYPE_A, b), Err(a), "slot still held by a");

        assert!(reg.unregister(TYPE_A, a));
        assert!(reg.register(TYPE_A, b).is_ok(), "slot free after release");

        // Unregister after losing the slot is an idempotent no-op.
        assert!(!reg.unregister(TYPE_A, a));
    }

    #[test]
    fn slot_reusable_after_release() {
        let mut reg = DisposerRegistry::new();
        let a = reg.issue();
        reg.register(TYPE_A, a).unwrap();
        reg.unregister(TYPE_A, a);
        let b = reg.issue();
        assert!(reg.register(TYPE_A, b).is_ok());
    }
}
