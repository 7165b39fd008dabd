//! Next-fire computation for every schedule kind.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeDelta, TimeZone, Utc};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Location, ScheduleKind};
use crate::services::solar;

/// Sun-relative search horizon; long enough to cross a polar night.
const SUN_SEARCH_DAYS: u64 = 370;

/// First fire time strictly after `after`.
///
/// `anchor` is the phase reference for interval schedules (creation time,
/// previous due time or resume time). `Ok(None)` means the schedule will
/// never fire again, e.g. an elapsed one-shot.
pub fn next_fire_after<Tz: TimeZone>(
    kind: &ScheduleKind,
    after: DateTime<Utc>,
    anchor: DateTime<Utc>,
    tz: &Tz,
    location: Option<Location>,
) -> DomainResult<Option<DateTime<Utc>>> {
    match kind {
        ScheduleKind::Once { at } => Ok((*at > after).then_some(*at)),
        ScheduleKind::Interval { every_ms } => Ok(next_interval(*every_ms, after, anchor)),
        ScheduleKind::Daily { time } => Ok(next_local(after, tz, 2, |_| true, *time)),
        ScheduleKind::Weekly { days, time } => {
            Ok(next_local(after, tz, 8, |date| days.contains(date.weekday()), *time))
        }
        ScheduleKind::Sun {
            event,
            offset_minutes,
        } => {
            let location = location.ok_or(DomainError::LocationUnavailable)?;
            let offset = TimeDelta::minutes(i64::from(*offset_minutes));
            let start = after.date_naive() - Days::new(1);
            Ok((0..SUN_SEARCH_DAYS)
                .filter_map(|d| start.checked_add_days(Days::new(d)))
                .filter_map(|date| solar::sun_event_utc(date, location, *event))
                .map(|instant| instant + offset)
                .find(|candidate| *candidate > after))
        }
    }
}

fn next_interval(every_ms: u64, after: DateTime<Utc>, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let every = i64::try_from(every_ms).ok().filter(|ms| *ms > 0)?;
    let step = TimeDelta::try_milliseconds(every)?;
    let first = anchor.checked_add_signed(step)?;
    if first > after {
        return Some(first);
    }
    // Skip the periods that were missed rather than firing them in a burst.
    let behind = (after - anchor).num_milliseconds();
    let periods = behind / every + 1;
    let next = anchor.checked_add_signed(TimeDelta::try_milliseconds(periods.checked_mul(every)?)?)?;
    if next > after {
        Some(next)
    } else {
        next.checked_add_signed(step)
    }
}

fn next_local<Tz, F>(
    after: DateTime<Utc>,
    tz: &Tz,
    horizon_days: u64,
    day_filter: F,
    time: chrono::NaiveTime,
) -> Option<DateTime<Utc>>
where
    Tz: TimeZone,
    F: Fn(NaiveDate) -> bool,
{
    let start = after.with_timezone(tz).date_naive();
    (0..=horizon_days)
        .filter_map(|d| start.checked_add_days(Days::new(d)))
        .filter(|date| day_filter(*date))
        // A wall-clock time inside a DST gap does not exist that day.
        .filter_map(|date| tz.from_local_datetime(&date.and_time(time)).earliest())
        .map(|local| local.with_timezone(&Utc))
        .find(|candidate| *candidate > after)
}
