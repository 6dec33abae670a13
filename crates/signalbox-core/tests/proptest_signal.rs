//! Property-based tests for aspect aggregation and controller fan-out.
//!
//! Uses proptest to generate random aspect sequences and binding layouts,
//! then verify the aggregation and notification invariants hold.

use proptest::prelude::*;
use signalbox_core::aspect::SignalAspect;
use signalbox_core::config::SignalConfig;
use signalbox_core::controller::SignalNetwork;
use signalbox_core::id::{BlockPos, ControllerKey, Facing, NodeId};
use signalbox_core::node::BoxVariant;
use signalbox_core::receiver::{SimpleSignalReceiver, UNBOUND_ASPECT};
use signalbox_core::test_utils::*;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_aspect() -> impl Strategy<Value = SignalAspect> {
    (0..SignalAspect::COUNT).prop_map(|i| SignalAspect::ALL[i])
}

fn key(i: usize) -> ControllerKey {
    ControllerKey(BlockPos::new(i as i32, 70, 0))
}

fn observers(n: usize) -> Vec<NodeId> {
    let mut sm = slotmap::SlotMap::<NodeId, ()>::with_key();
    (0..n).map(|_| sm.insert(())).collect()
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn worst_of_is_commutative(a in arb_aspect(), b in arb_aspect()) {
        prop_assert_eq!(a.worst_of(b), b.worst_of(a));
    }

    #[test]
    fn worst_of_is_associative(a in arb_aspect(), b in arb_aspect(), c in arb_aspect()) {
        prop_assert_eq!(a.worst_of(b).worst_of(c), a.worst_of(b.worst_of(c)));
    }

    #[test]
    fn worst_of_returns_an_input(a in arb_aspect(), b in arb_aspect()) {
        let w = a.worst_of(b);
        prop_assert!(w == a || w == b);
        prop_assert!(w >= a && w >= b);
    }

    #[test]
    fn most_severe_matches_fold(aspects in proptest::collection::vec(arb_aspect(), 1..12)) {
        let folded = aspects.iter().copied().fold(SignalAspect::SAFE, SignalAspect::worst_of);
        prop_assert_eq!(SignalAspect::most_severe(aspects.iter().copied()), Some(folded));
    }

    /// The receiver aggregate always equals the fold of its stored aspects,
    /// whatever order the pushes arrive in.
    #[test]
    fn receiver_aggregate_tracks_bindings(
        pushes in proptest::collection::vec((0..4usize, arb_aspect()), 0..40)
    ) {
        let mut receiver = SimpleSignalReceiver::new("r", BlockPos::default(), &SignalConfig::default());
        for i in 0..4 {
            receiver.bind(key(i), SignalAspect::SAFE).unwrap();
        }
        for (i, aspect) in pushes {
            receiver.on_controller_aspect_change(key(i), aspect);
            let expected = SignalAspect::most_severe(receiver.bindings().map(|(_, a)| a))
                .unwrap_or(UNBOUND_ASPECT);
            prop_assert_eq!(receiver.aspect(), expected);
        }
    }

    /// Every aspect change notifies every observer exactly once, in
    /// registration order; a repeated aspect notifies nobody.
    #[test]
    fn fan_out_counts(n in 0..16usize, sequence in proptest::collection::vec(arb_aspect(), 1..20)) {
        let mut network = SignalNetwork::new();
        let controller = key(0);
        network.add_controller(controller, "c");
        let ids = observers(n);
        for id in &ids {
            network.register(controller, *id);
        }

        let mut previous = SignalAspect::SAFE;
        for aspect in sequence {
            let mut seen = Vec::new();
            let mut record = |observer: NodeId, _: ControllerKey, _: SignalAspect| seen.push(observer);
            let changed = network.set_aspect(controller, aspect, &mut record);
            prop_assert_eq!(changed, aspect != previous);
            if changed {
                prop_assert_eq!(&seen, &ids);
            } else {
                prop_assert!(seen.is_empty());
            }
            previous = aspect;
        }
    }

    /// A receiver box never powers a neighbouring box, and powers a
    /// non-box neighbour iff the mapping contains the aggregate.
    #[test]
    fn power_output_respects_mapping(
        aspect in arb_aspect(),
        mapped in proptest::collection::vec(arb_aspect(), 0..6),
    ) {
        let mut world = server_world();
        let controller = signal_at(&mut world, far_pos());
        world.set_controller_aspect(controller, aspect).unwrap();
        world.add_box(origin(), BoxVariant::Receiver).unwrap();
        world.bind_receiver(origin(), controller).unwrap();
        for a in SignalAspect::ALL {
            world.do_action_on_aspect(origin(), a, mapped.contains(&a)).unwrap();
        }
        let neighbor = origin().offset(Facing::East);
        world.add_box(neighbor, BoxVariant::Receiver).unwrap();

        prop_assert_eq!(world.power_output(origin(), Facing::East), 0);
        let expected = if mapped.contains(&aspect) { 15 } else { 0 };
        prop_assert_eq!(world.power_output(origin(), Facing::West), expected);
    }
}
