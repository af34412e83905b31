//! Property-based tests for the window and selection invariants.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use puzzlebox::config::TestDefinition;
use puzzlebox::select::AnswerSelector;
use puzzlebox::subject::{AnimalRecord, GlobalRecord, SlidingWindow};

// ============================================================================
// Strategies
// ============================================================================

/// Arbitrary mark sequences: raw trial counts with outcomes.
fn arb_marks() -> impl Strategy<Value = Vec<(usize, bool)>> {
    proptest::collection::vec((0usize..1000, any::<bool>()), 0..64)
}

fn shuffle_test() -> TestDefinition {
    let templates: Vec<String> =
        ["L-L", "R-R", "E-B", "I-N"].iter().map(|t| (*t).to_string()).collect();
    TestDefinition::parse("shuffle1", &templates).unwrap()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The window sum never exceeds the window length, and marking never
    /// changes the length.
    #[test]
    fn prop_window_sum_bounded_by_length(len in 1usize..32, marks in arb_marks()) {
        let mut window = SlidingWindow::new(len);
        for (count, success) in marks {
            window.mark(count, success);
            prop_assert!(window.sum() as usize <= window.len());
            prop_assert_eq!(window.len(), len);
        }
    }

    /// Resetting yields a zeroed window of exactly the requested length.
    #[test]
    fn prop_window_reset_zeroes(len in 1usize..32, next_len in 1usize..32, marks in arb_marks()) {
        let mut window = SlidingWindow::new(len);
        for (count, success) in marks {
            window.mark(count, success);
        }
        window.reset(next_len);
        prop_assert_eq!(window.len(), next_len);
        prop_assert_eq!(window.sum(), 0);
    }

    /// With no failures, the shuffle bag is a valid permutation that is
    /// replaced exactly at list boundaries and held in between.
    #[test]
    fn prop_shuffle_bag_replaced_only_at_boundaries(seed in any::<u64>()) {
        let test = shuffle_test();
        let len = test.trials().len();
        let mut selector = AnswerSelector::with_rng(StdRng::seed_from_u64(seed));
        let mut animal = AnimalRecord::default();
        animal.preference = Some(puzzlebox::Side::Left);
        let mut global = GlobalRecord::default();

        let mut previous_bag: Option<Vec<usize>> = None;
        for count in 0..3 * len {
            animal.trial_count = count;
            selector.next_trial(&test, &mut animal, &mut global).unwrap();

            let mut sorted = global.shuffle_order.clone();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, (0..len).collect::<Vec<_>>());

            if count % len != 0 {
                // Mid-bag the permutation must be untouched.
                prop_assert_eq!(previous_bag.as_ref(), Some(&global.shuffle_order));
            }
            previous_bag = Some(global.shuffle_order.clone());
        }
    }

    /// A failure-retry at a bag boundary must not reshuffle.
    #[test]
    fn prop_shuffle_retry_preserves_bag(seed in any::<u64>()) {
        let test = shuffle_test();
        let len = test.trials().len();
        let mut selector = AnswerSelector::with_rng(StdRng::seed_from_u64(seed));
        let mut animal = AnimalRecord::default();
        animal.preference = Some(puzzlebox::Side::Left);
        let mut global = GlobalRecord::default();

        animal.trial_count = 0;
        selector.next_trial(&test, &mut animal, &mut global).unwrap();
        let bag = global.shuffle_order.clone();

        // The subject failed its way back to a boundary.
        animal.trial_count = len;
        animal.failed_current_trial = 1;
        selector.next_trial(&test, &mut animal, &mut global).unwrap();
        prop_assert_eq!(&global.shuffle_order, &bag);
    }

    /// Sequential selection is pure cycling: the answer depends only on
    /// the trial count modulo the list length.
    #[test]
    fn prop_sequential_selection_cycles(count in 0usize..1000, seed in any::<u64>()) {
        let templates: Vec<String> =
            ["L-L", "R-R", "E-B"].iter().map(|t| (*t).to_string()).collect();
        let test = TestDefinition::parse("fixed_order", &templates).unwrap();
        let mut selector = AnswerSelector::with_rng(StdRng::seed_from_u64(seed));
        let mut animal = AnimalRecord::default();
        animal.trial_count = count;
        let mut global = GlobalRecord::default();

        use puzzlebox::config::Answer;
        let expected = [Answer::Left, Answer::Right, Answer::Either][count % 3];
        let (answer, _) = selector.next_trial(&test, &mut animal, &mut global).unwrap();
        prop_assert_eq!(answer, expected);
    }
}
