//! Property tests for the reconciliation pass.
//!
//! Random sequences of membership churn, commits, and passes are run against
//! a small reference model. The model captures the whole contract in two
//! lines: an entity's record after a pass exists iff the entity matched in
//! the committed view when the pass began, and every record gained costs one
//! setup / every record lost costs one cleanup.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use proptest::prelude::*;
use vestige_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Hot;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Glow {
    owner: u32,
}

impl StateRecord for Glow {}

const POOL: usize = 8;

/// One step of a generated schedule.
#[derive(Debug, Clone)]
enum Step {
    /// Flip `Hot` on pool entity `i` (data immediate, membership queued).
    Toggle(usize),
    /// Publish queued membership changes.
    Commit,
    /// Run one reconciliation pass.
    Process,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..POOL).prop_map(Step::Toggle),
        1 => Just(Step::Commit),
        2 => Just(Step::Process),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn reconciliation_matches_reference_model(steps in prop::collection::vec(step_strategy(), 1..60)) {
        let mut world = World::new();
        world.register_component::<Hot>("hot");

        let setups: Rc<RefCell<HashMap<u32, u32>>> = Rc::new(RefCell::new(HashMap::new()));
        let cleanups: Rc<RefCell<HashMap<u32, u32>>> = Rc::new(RefCell::new(HashMap::new()));
        let s = Rc::clone(&setups);
        let c = Rc::clone(&cleanups);

        let predicate = world.filter().with::<Hot>().build();
        let mut processor = StateProcessor::with_cleanup(
            &mut world,
            predicate,
            move |entity| {
                *s.borrow_mut().entry(entity.index()).or_insert(0) += 1;
                Glow { owner: entity.index() }
            },
            move |glow| {
                *c.borrow_mut().entry(glow.owner).or_insert(0) += 1;
            },
        ).unwrap();

        let entities: Vec<EntityId> = (0..POOL).map(|_| world.create_entity()).collect();

        // Reference model, per entity.
        let mut live_hot = [false; POOL];
        let mut committed_hot = [false; POOL];
        let mut has_record = [false; POOL];
        let mut expected_setups = [0u32; POOL];
        let mut expected_cleanups = [0u32; POOL];

        for step in steps {
            match step {
                Step::Toggle(i) => {
                    if live_hot[i] {
                        world.remove_component::<Hot>(entities[i]).unwrap();
                    } else {
                        world.set_component(entities[i], Hot).unwrap();
                    }
                    live_hot[i] = !live_hot[i];
                }
                Step::Commit => {
                    world.commit();
                    committed_hot = live_hot;
                }
                Step::Process => {
                    processor.process(&mut world).unwrap();

                    // Survival depends only on committed membership at the
                    // start of the pass; the pass's own commit publishes
                    // everything queued.
                    for i in 0..POOL {
                        let stamped = committed_hot[i];
                        if stamped && !has_record[i] {
                            expected_setups[i] += 1;
                        }
                        if !stamped && has_record[i] {
                            expected_cleanups[i] += 1;
                        }
                        has_record[i] = stamped;
                    }
                    committed_hot = live_hot;

                    for i in 0..POOL {
                        prop_assert_eq!(
                            world.has_component::<Glow>(entities[i]),
                            has_record[i],
                            "record presence diverged for entity {}", i
                        );
                    }
                }
            }
        }

        // Callback ledger must match the model exactly.
        for (i, entity) in entities.iter().enumerate() {
            let idx = entity.index();
            prop_assert_eq!(
                setups.borrow().get(&idx).copied().unwrap_or(0),
                expected_setups[i],
                "setup count diverged for entity {}", i
            );
            prop_assert_eq!(
                cleanups.borrow().get(&idx).copied().unwrap_or(0),
                expected_cleanups[i],
                "cleanup count diverged for entity {}", i
            );
        }
    }
}
