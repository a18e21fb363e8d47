use chrono::{Duration, TimeZone, Utc};
use common::{Offsets, Side, SignalEntry};
use engine::gate::{is_sticky, TrailingWindow};
use engine::SignalBook;
use proptest::prelude::*;

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn direction() -> impl Strategy<Value = Option<Side>> {
    prop_oneof![Just(None), side().prop_map(Some)]
}

proptest! {
    /// Once an entry has an outcome, later price and time inputs never change it.
    #[test]
    fn resolution_is_write_once(
        side in side(),
        entry_price in 0.01f64..100_000.0,
        prices in prop::collection::vec(0.0001f64..200_000.0, 1..20),
        step_minutes in 1i64..90,
    ) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut entry = SignalEntry::new(
            "SOL/USDT", side, 0.8, "", entry_price, t0,
            Offsets::default(), Duration::minutes(120),
        );

        let mut first: Option<(common::Outcome, f64, chrono::DateTime<Utc>)> = None;
        for (i, price) in prices.iter().enumerate() {
            let now = t0 + Duration::minutes(step_minutes * (i as i64 + 1));
            let assigned = entry.resolve(*price, now);
            match first {
                None => {
                    if let Some(outcome) = assigned {
                        first = Some((outcome, *price, now));
                    }
                }
                Some(_) => {
                    prop_assert!(assigned.is_none());
                }
            }
        }

        match first {
            Some((outcome, price, at)) => {
                prop_assert_eq!(entry.outcome(), Some(outcome));
                prop_assert_eq!(entry.exit_price(), Some(price));
                prop_assert_eq!(entry.exit_time(), Some(at));
            }
            None => {
                prop_assert!(entry.outcome().is_none());
                prop_assert!(entry.exit_price().is_none());
                prop_assert!(entry.exit_time().is_none());
            }
        }
    }

    /// The book's registry holds exactly the unresolved entries of the log.
    #[test]
    fn registry_matches_unresolved_log_entries(
        sides in prop::collection::vec(side(), 1..12),
        price in 90.0f64..110.0,
    ) {
        let t0 = Utc::now();
        let mut book = SignalBook::new();
        for side in &sides {
            let entry = SignalEntry::new(
                "ETH/USDT", *side, 0.5, "", 100.0, t0,
                Offsets::default(), Duration::minutes(120),
            );
            book.insert(entry).unwrap();
        }
        let ids: Vec<_> = book.log().iter().map(|e| e.id()).collect();
        for id in &ids {
            book.resolve(id, price, t0 + Duration::minutes(5));
        }

        prop_assert_eq!(book.log().len(), sides.len());
        let unresolved = book.log().iter().filter(|e| !e.is_resolved()).count();
        prop_assert_eq!(book.active_len(), unresolved);
        for entry in book.log() {
            prop_assert_eq!(book.is_active(&entry.id()), !entry.is_resolved());
        }
    }

    /// A full trailing window agrees with the pure stickiness rule.
    #[test]
    fn window_unanimity_matches_stickiness(
        history in prop::collection::vec(direction(), 0..10),
        current in side(),
    ) {
        let k = 3;
        let mut window = TrailingWindow::new(k);
        for d in &history {
            window.push(*d);
        }
        window.push(Some(current));
        prop_assert_eq!(window.is_unanimous(current), is_sticky(&history, Some(current), k));
    }
}
