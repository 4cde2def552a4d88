//! Property-based tests for eventsync
//!
//! These tests verify invariants that must hold for all inputs:
//! - Local stamps strictly increase, whatever the wall clock does
//! - Sync cursors never move backwards
//! - Conflict resolution depends only on the two stamps
//! - Backoff stays bounded
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// HYBRID CLOCK TESTS
// ============================================================================

mod clock_tests {
    use super::*;
    use eventsync::clock::{HybridClock, ManualClock};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    enum Step {
        Wall(i64),
        Observe(i64),
        Tick,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0i64..1_000_000).prop_map(Step::Wall),
            (0i64..1_000_000).prop_map(Step::Observe),
            Just(Step::Tick),
        ]
    }

    proptest! {
        /// Invariant: every tick is above every stamp issued or observed before it
        #[test]
        fn ticks_strictly_increase(steps in prop::collection::vec(step(), 1..64)) {
            let wall = Arc::new(ManualClock::new(0));
            let clock = HybridClock::new(wall.clone());
            let mut highest: Option<i64> = None;

            for step in steps {
                match step {
                    Step::Wall(now) => wall.set(now),
                    Step::Observe(ts) => {
                        clock.observe(ts);
                        highest = Some(highest.map_or(ts, |h| h.max(ts)));
                    }
                    Step::Tick => {
                        let ts = clock.tick();
                        if let Some(h) = highest {
                            prop_assert!(ts > h, "tick {} not above {}", ts, h);
                        }
                        highest = Some(ts);
                    }
                }
            }
        }

        /// Invariant: a tick never runs behind the wall clock
        #[test]
        fn tick_not_before_wall(now in 0i64..1_000_000, observed in 0i64..1_000_000) {
            let clock = HybridClock::new(Arc::new(ManualClock::new(now)));
            clock.observe(observed);
            let ts = clock.tick();
            prop_assert!(ts >= now);
            prop_assert!(ts > observed);
        }
    }
}

// ============================================================================
// CURSOR TESTS
// ============================================================================

mod cursor_tests {
    use super::*;
    use eventsync::storage::EntityStore;
    use eventsync::sync::{ChangeTracker, CursorKind};
    use eventsync::types::Collection;

    fn collection() -> impl Strategy<Value = Collection> {
        prop::sample::select(Collection::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Invariant: the stored cursor is the running maximum of all advances
        #[test]
        fn advance_is_monotonic(
            collection in collection(),
            targets in prop::collection::vec(0i64..10_000, 1..20),
        ) {
            let tracker = ChangeTracker::new(EntityStore::open_in_memory().unwrap());
            let mut expected = 0i64;

            for target in targets {
                let stored = tracker.advance(collection, CursorKind::Pull, target).unwrap();
                expected = expected.max(target);
                prop_assert_eq!(stored, expected);
                prop_assert_eq!(tracker.cursor_for(collection, CursorKind::Pull).unwrap(), expected);
            }

            // The other cursor is untouched
            prop_assert_eq!(tracker.cursor_for(collection, CursorKind::Push).unwrap(), 0);
        }
    }
}

// ============================================================================
// CONFLICT RESOLUTION TESTS
// ============================================================================

mod resolver_tests {
    use super::*;
    use eventsync::sync::{ConflictResolver, LocalMatch, Resolution};
    use eventsync::types::{LocalId, Venue};

    fn venue(id: Option<i64>, name: &str, last_modified: i64) -> Venue {
        let mut venue = Venue::new(name);
        if let Some(id) = id {
            venue.id = LocalId::Assigned(id);
        }
        venue.last_modified = last_modified;
        venue
    }

    proptest! {
        /// Invariant: the newer stamp wins, ties converge, payloads do not matter
        #[test]
        fn last_writer_wins(
            local_lm in 0i64..1_000,
            remote_lm in 0i64..1_000,
            local_name in "[A-Za-z ]{1,12}",
            remote_name in "[A-Za-z ]{1,12}",
        ) {
            let resolver = ConflictResolver::new();
            let local = LocalMatch::ByRemoteId(venue(Some(7), &local_name, local_lm));
            let remote = venue(None, &remote_name, remote_lm);

            let resolution = resolver.resolve(&local, &remote).unwrap();
            let expected = if remote_lm > local_lm {
                Resolution::RemoteWins { local_id: 7 }
            } else if remote_lm < local_lm {
                Resolution::LocalWins { local_id: 7, bind: false }
            } else {
                Resolution::Converged { local_id: 7, bind: false }
            };
            prop_assert_eq!(resolution, expected);
            prop_assert!(!resolution.needs_binding());
        }

        /// Invariant: resolving the same inputs twice gives the same answer
        #[test]
        fn resolution_is_deterministic(local_lm in 0i64..1_000, remote_lm in 0i64..1_000) {
            let resolver = ConflictResolver::new();
            let local = LocalMatch::ByNaturalKey(vec![venue(Some(3), "Groove", local_lm)]);
            let remote = venue(None, "Groove", remote_lm);

            let first = resolver.resolve(&local, &remote).unwrap();
            let second = resolver.resolve(&local, &remote).unwrap();
            prop_assert_eq!(first, second);
            if remote_lm <= local_lm {
                prop_assert!(first.needs_binding());
            }
        }

        /// Invariant: several local claimants of one key never resolve
        #[test]
        fn duplicate_claimants_always_fail(count in 2usize..6, remote_lm in 0i64..1_000) {
            let resolver = ConflictResolver::new();
            let claimants = (0..count)
                .map(|i| venue(Some(i as i64 + 1), "Groove", i as i64))
                .collect();
            let remote = venue(None, "Groove", remote_lm);

            prop_assert!(resolver.resolve(&LocalMatch::ByNaturalKey(claimants), &remote).is_err());
        }
    }
}

// ============================================================================
// BACKOFF TESTS
// ============================================================================

mod backoff_tests {
    use super::*;
    use eventsync::sync::backoff_delay;
    use eventsync::types::RetryPolicy;
    use std::time::Duration;

    proptest! {
        /// Invariant: delays never shrink between attempts and never pass the cap
        #[test]
        fn bounded_and_non_decreasing(
            base in 1u64..1_000,
            max in 1u64..100_000,
            attempts in 1u32..80,
        ) {
            let policy = RetryPolicy {
                max_attempts: attempts,
                base_delay_ms: base,
                max_delay_ms: max,
            };
            let mut previous = Duration::ZERO;
            for attempt in 0..attempts {
                let delay = backoff_delay(&policy, attempt);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= Duration::from_millis(max));
                previous = delay;
            }
        }
    }
}

// ============================================================================
// COLLECTION NAME TESTS
// ============================================================================

mod collection_tests {
    use super::*;
    use eventsync::types::Collection;

    proptest! {
        /// Invariant: parsing never panics on any string input
        #[test]
        fn parse_never_panics(s in ".*") {
            let _ = s.parse::<Collection>();
        }

        /// Invariant: every collection parses back from its stored name
        #[test]
        fn stored_name_parses_back(collection in prop::sample::select(Collection::ALL.to_vec())) {
            prop_assert_eq!(collection.as_str().parse::<Collection>(), Ok(collection));
        }
    }
}
