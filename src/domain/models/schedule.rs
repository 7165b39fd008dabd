//! Scheduled (time-driven) event model.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::action::ActionContent;
use crate::domain::errors::{DomainError, DomainResult};

/// Which solar event a sun-relative schedule is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SunEvent {
    Sunrise,
    Sunset,
}

impl fmt::Display for SunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sunrise => write!(f, "sunrise"),
            Self::Sunset => write!(f, "sunset"),
        }
    }
}

/// Days of the week as a bitmask, Sunday = bit 0 through Saturday = bit 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayMask(pub u8);

impl WeekdayMask {
    pub const WEEKDAYS: Self = Self(0b0011_1110);
    pub const WEEKEND: Self = Self(0b0100_0001);
    pub const ALL: Self = Self(0b0111_1111);

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }
}

/// When a scheduled event fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Fire once at a specific instant.
    Once { at: DateTime<Utc> },
    /// Fire every `every_ms` milliseconds, starting one period after creation.
    Interval { every_ms: u64 },
    /// Fire every day at a local wall-clock time.
    Daily { time: NaiveTime },
    /// Fire at a local wall-clock time on the days set in the mask.
    Weekly { days: WeekdayMask, time: NaiveTime },
    /// Fire at an offset (minutes, may be negative) from sunrise or sunset.
    Sun {
        event: SunEvent,
        #[serde(default)]
        offset_minutes: i32,
    },
}

/// Longest accepted interval, roughly one hundred years.
pub const MAX_INTERVAL_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Once { .. } => "once",
            Self::Interval { .. } => "interval",
            Self::Daily { .. } => "daily",
            Self::Weekly { .. } => "weekly",
            Self::Sun { .. } => "sun",
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self, Self::Once { .. })
    }

    pub fn needs_location(&self) -> bool {
        matches!(self, Self::Sun { .. })
    }

    /// Reject parameters that could never produce a fire time.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Interval { every_ms } if *every_ms == 0 => {
                Err("interval must be greater than zero".to_string())
            }
            Self::Interval { every_ms } if *every_ms > MAX_INTERVAL_MS => {
                Err(format!("interval of {every_ms} ms exceeds {MAX_INTERVAL_MS} ms"))
            }
            Self::Weekly { days, .. } if days.is_empty() => {
                Err("weekly schedule has no days selected".to_string())
            }
            Self::Sun { offset_minutes, .. } if offset_minutes.abs() > 12 * 60 => {
                Err(format!("sun offset {offset_minutes} exceeds 12 hours"))
            }
            _ => Ok(()),
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Interval { every_ms } => Some(Duration::from_millis(*every_ms)),
            _ => None,
        }
    }
}

/// Observer position used for sun-relative schedules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> DomainResult<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(DomainError::InvalidLocation {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// A configured time-driven event, keyed by its path.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub path: String,
    pub schedule: ScheduleKind,
    pub action: ActionContent,
    pub paused: bool,
    pub created_at: DateTime<Utc>,
    pub last_fired: Option<DateTime<Utc>>,
    /// `None` while paused or while the fire time cannot be computed yet.
    pub next_fire: Option<DateTime<Utc>>,
    pub fire_count: u64,
}

impl ScheduledEvent {
    pub fn new(path: impl Into<String>, schedule: ScheduleKind, action: ActionContent) -> Self {
        Self {
            path: path.into(),
            schedule,
            action,
            paused: false,
            created_at: Utc::now(),
            last_fired: None,
            next_fire: None,
            fire_count: 0,
        }
    }

    /// Snapshot of the parameters a management client can query.
    pub fn info(&self) -> ScheduleInfo {
        ScheduleInfo {
            path: self.path.clone(),
            schedule: self.schedule.clone(),
            paused: self.paused,
            next_fire: self.next_fire,
            last_fired: self.last_fired,
            fire_count: self.fire_count,
        }
    }
}

/// Result of `QueryScheduleInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInfo {
    pub path: String,
    pub schedule: ScheduleKind,
    pub paused: bool,
    pub next_fire: Option<DateTime<Utc>>,
    pub last_fired: Option<DateTime<Utc>>,
    pub fire_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_mask() {
        assert!(WeekdayMask::WEEKDAYS.contains(Weekday::Mon));
        assert!(WeekdayMask::WEEKDAYS.contains(Weekday::Fri));
        assert!(!WeekdayMask::WEEKDAYS.contains(Weekday::Sun));
        assert!(WeekdayMask::WEEKEND.contains(Weekday::Sat));
        assert!(WeekdayMask(0).is_empty());
    }

    #[test]
    fn test_schedule_serde_shape() {
        let kind = ScheduleKind::Sun {
            event: SunEvent::Sunset,
            offset_minutes: -30,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "sun");
        assert_eq!(json["event"], "sunset");
        let back: ScheduleKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);

        let daily: ScheduleKind =
            serde_json::from_str(r#"{"type":"daily","time":"07:30:00"}"#).unwrap();
        assert_eq!(
            daily,
            ScheduleKind::Daily {
                time: NaiveTime::from_hms_opt(7, 30, 0).unwrap()
            }
        );
    }

    #[test]
    fn test_validate() {
        assert!(ScheduleKind::Interval { every_ms: 0 }.validate().is_err());
        assert!(ScheduleKind::Interval { every_ms: 10 }.validate().is_ok());
        assert!(ScheduleKind::Interval { every_ms: MAX_INTERVAL_MS }.validate().is_ok());
        assert!(ScheduleKind::Interval { every_ms: MAX_INTERVAL_MS + 1 }.validate().is_err());
        assert!(ScheduleKind::Interval { every_ms: u64::MAX }.validate().is_err());
        assert!(ScheduleKind::Weekly {
            days: WeekdayMask(0),
            time: NaiveTime::MIN
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_location_bounds() {
        assert!(Location::new(51.5, -0.12).is_ok());
        assert!(Location::new(91.0, 0.0).is_err());
        assert!(Location::new(0.0, 181.0).is_err());
        assert!(Location::new(f64::NAN, 0.0).is_err());
    }
}
