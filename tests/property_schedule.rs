//! Property tests for schedule computation and path handling.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use eventcore::domain::models::{path, Location, ScheduleKind, SunEvent, WeekdayMask};
use eventcore::services::next_fire::next_fire_after;
use proptest::prelude::*;

fn instant(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("valid timestamp")
}

fn schedule_strategy() -> impl Strategy<Value = ScheduleKind> {
    prop_oneof![
        (1u64..86_400_000).prop_map(|every_ms| ScheduleKind::Interval { every_ms }),
        (0u32..24, 0u32..60).prop_map(|(h, m)| ScheduleKind::Daily {
            time: NaiveTime::from_hms_opt(h, m, 0).unwrap()
        }),
        (1u8..128, 0u32..24, 0u32..60).prop_map(|(mask, h, m)| ScheduleKind::Weekly {
            days: WeekdayMask(mask),
            time: NaiveTime::from_hms_opt(h, m, 0).unwrap()
        }),
        (any::<bool>(), -120i32..120).prop_map(|(rise, offset_minutes)| ScheduleKind::Sun {
            event: if rise { SunEvent::Sunrise } else { SunEvent::Sunset },
            offset_minutes,
        }),
    ]
}

fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_]{1,8}"
}

proptest! {
    /// Property: successive fire times strictly advance
    ///
    /// Feeding each computed fire time back in as the new "after" always
    /// yields a later instant.
    #[test]
    fn prop_fire_times_advance(
        schedule in schedule_strategy(),
        start in 0i64..(365 * 86_400),
    ) {
        let location = Some(Location::new(48.85, 2.35).unwrap());
        let mut after = instant(start);
        let anchor = after;
        for _ in 0..5 {
            let next = next_fire_after(&schedule, after, anchor, &Utc, location)
                .unwrap()
                .expect("recurring schedules always have a next fire");
            prop_assert!(next > after, "{:?}: {} is not after {}", schedule, next, after);
            after = next;
        }
    }

    /// Property: interval fires stay on the anchor's phase and skip missed periods
    #[test]
    fn prop_interval_skips_missed_periods(
        every_ms in 1u64..3_600_000,
        late_ms in 0i64..86_400_000,
    ) {
        let anchor = instant(0);
        let after = anchor + Duration::milliseconds(late_ms);
        let next = next_fire_after(&ScheduleKind::Interval { every_ms }, after, anchor, &Utc, None)
            .unwrap()
            .unwrap();
        let every = Duration::milliseconds(i64::try_from(every_ms).unwrap());
        prop_assert!(next > after);
        prop_assert!(next - after <= every);
        prop_assert_eq!((next - anchor).num_milliseconds() % every.num_milliseconds(), 0);
    }

    /// Property: a one-shot never fires again once its time has passed
    #[test]
    fn prop_elapsed_once_is_final(at in 0i64..100_000, later in 0i64..100_000) {
        let at = instant(at);
        let after = at + Duration::seconds(later);
        let kind = ScheduleKind::Once { at };
        prop_assert_eq!(next_fire_after(&kind, after, after, &Utc, None).unwrap(), None);
    }

    /// Property: normalize is idempotent and never leaves empty segments
    #[test]
    fn prop_normalize_idempotent(segments in prop::collection::vec(segment(), 0..6), slashes in 1usize..4) {
        let raw = format!("{}{}", "/".repeat(slashes), segments.join(&"/".repeat(slashes)));
        let once = path::normalize(&raw).unwrap();
        prop_assert_eq!(path::normalize(&once).unwrap(), once.clone());
        prop_assert!(!once.contains("//"));
        prop_assert!(once == path::ROOT || !once.ends_with('/'));
    }

    /// Property: rebasing into another scope and back restores the path
    #[test]
    fn prop_rebase_round_trip(
        old in prop::collection::vec(segment(), 1..3),
        new in prop::collection::vec(segment(), 1..3),
        rest in prop::collection::vec(segment(), 0..3),
    ) {
        let old_scope = format!("/old/{}", old.join("/"));
        let new_scope = format!("/new/{}", new.join("/"));
        let original = path::normalize(&format!("{old_scope}/{}", rest.join("/"))).unwrap();

        let moved = path::rebase(&original, &old_scope, &new_scope).unwrap();
        prop_assert!(path::is_within(&moved, &new_scope));
        prop_assert_eq!(path::rebase(&moved, &new_scope, &old_scope).unwrap(), original);
    }
}
