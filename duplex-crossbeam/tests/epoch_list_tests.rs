use duplex_core::common_tests::linearizability::{ScenarioParams, check_random_histories};
use duplex_core::common_tests::list_core_tests::*;
use duplex_core::common_tests::list_stress_tests::*;
use duplex_core::guard::Guard;
use duplex_crossbeam::{EpochGuard, EpochList};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rstest::rstest;
use serial_test::serial;

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_basic<G: Guard>(#[case] _guard: G) {
    test_basic_operations::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_relative_insert<G: Guard>(#[case] _guard: G) {
    test_relative_insertion::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_double_remove<G: Guard>(#[case] _guard: G) {
    test_remove_twice::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_both_directions<G: Guard>(#[case] _guard: G) {
    test_forward_matches_backward::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_removed_unreachable<G: Guard>(#[case] _guard: G) {
    test_removed_nodes_unreachable::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_values<G: Guard>(#[case] _guard: G) {
    test_value_operations::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_conditional_insert<G: Guard + 'static>(#[case] _guard: G) {
    test_insert_after_if_invalidated::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_conditional_insert_write_before_cas<G: Guard>(#[case] _guard: G) {
    test_insert_after_if_value_changes_before_cas::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_insert_after_remove_race<G: Guard + 'static>(#[case] _guard: G) {
    test_insert_after_with_concurrent_remove::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_push_pop<G: Guard + 'static>(#[case] _guard: G) {
    test_concurrent_push_pop::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_remove_once<G: Guard + 'static>(#[case] _guard: G) {
    test_remove_exactly_once::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_cas<G: Guard + 'static>(#[case] _guard: G) {
    test_compare_exchange_single_winner::<G>();
    test_compare_exchange_increments::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_ordered_traversal<G: Guard + 'static>(#[case] _guard: G) {
    test_traversal_during_modifications::<G>();
}

#[rstest]
#[serial]
#[case::epoch_guard(EpochGuard::default())]
fn test_mixed<G: Guard + 'static>(#[case] _guard: G) {
    test_mixed_random_operations::<G>();
}

#[rstest]
#[serial]
#[case::default_shape(ScenarioParams::default())]
#[case::two_executors(ScenarioParams { executors: 2, operations_per_executor: 6, ..ScenarioParams::default() })]
fn test_linearizable(#[case] params: ScenarioParams) {
    let mut rng = StdRng::seed_from_u64(params.executors as u64);
    check_random_histories::<EpochGuard>(&mut rng, &params, 200);
}

#[test_log::test]
#[serial]
fn test_churn_reclaims_while_running() {
    // Far more replaced tuples than any single epoch bag holds.
    let list: EpochList<u64> = EpochList::new();
    let node = list.push_right(0);
    for i in 0..100_000 {
        node.set_value(i).unwrap();
        list.push_left(i);
        list.pop_right_node();
        node.insert_before(i);
    }
    assert_eq!(list.len(), 100_001);
}

#[test]
#[serial]
fn test_values_replaced_on_one_thread_reclaimed_on_another() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    const REPLACEMENTS: usize = 5_000;

    let dropped = Arc::new(AtomicUsize::new(0));
    let list: EpochList<Counted> = EpochList::new();
    let node = list.push_right(Counted(Arc::clone(&dropped)));

    let owner = {
        let dropped = Arc::clone(&dropped);
        thread::spawn(move || {
            for _ in 0..REPLACEMENTS {
                node.set_value(Counted(Arc::clone(&dropped))).unwrap();
            }
        })
    };
    owner.join().unwrap();

    // A thread that never touched the list reclaims what the owner retired.
    let collector = thread::spawn(|| {
        for _ in 0..1_000 {
            crossbeam_epoch::pin().flush();
        }
    });
    collector.join().unwrap();

    assert!(dropped.load(Ordering::SeqCst) <= REPLACEMENTS);
    drop(list);
    for _ in 0..1_000 {
        if dropped.load(Ordering::SeqCst) == REPLACEMENTS + 1 {
            break;
        }
        crossbeam_epoch::pin().flush();
    }
    assert_eq!(dropped.load(Ordering::SeqCst), REPLACEMENTS + 1);
}
