//! Sunrise and sunset times.
//!
//! Standard sunrise equation with the conventional -0.833 degree altitude
//! (refraction plus solar disc radius). Accurate to roughly a minute at
//! mid latitudes, which is well inside scheduler poll granularity.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::domain::models::{Location, SunEvent};

const J2000: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const OBLIQUITY_DEG: f64 = 23.4397;
const SUN_ALTITUDE_DEG: f64 = -0.833;

/// UTC instant of `event` on the given calendar date at `location`.
///
/// Returns `None` on polar day or polar night, when the sun does not cross
/// the horizon on that date.
pub fn sun_event_utc(date: NaiveDate, location: Location, event: SunEvent) -> Option<DateTime<Utc>> {
    let (rise, set) = sunrise_sunset_jd(date, location)?;
    let jd = match event {
        SunEvent::Sunrise => rise,
        SunEvent::Sunset => set,
    };
    julian_to_utc(jd)
}

fn sunrise_sunset_jd(date: NaiveDate, location: Location) -> Option<(f64, f64)> {
    let noon = date.and_hms_opt(12, 0, 0)?.and_utc();
    let jd_noon = noon.timestamp() as f64 / 86_400.0 + UNIX_EPOCH_JD;
    // Whole days since the J2000 epoch (noon, 2000-01-01).
    let n = (jd_noon - J2000).round();

    // Mean solar time, east longitudes positive.
    let j_star = n - location.longitude / 360.0;
    let m = (357.5291 + 0.985_600_28 * j_star).rem_euclid(360.0);
    let m_rad = m.to_radians();
    let c = 1.9148 * m_rad.sin() + 0.0200 * (2.0 * m_rad).sin() + 0.0003 * (3.0 * m_rad).sin();
    let lambda = (m + c + 180.0 + 102.9372).rem_euclid(360.0);
    let lambda_rad = lambda.to_radians();
    let j_transit = J2000 + j_star + 0.0053 * m_rad.sin() - 0.0069 * (2.0 * lambda_rad).sin();

    let sin_decl = lambda_rad.sin() * OBLIQUITY_DEG.to_radians().sin();
    let cos_decl = sin_decl.asin().cos();
    let lat_rad = location.latitude.to_radians();
    let cos_hour_angle = (SUN_ALTITUDE_DEG.to_radians().sin() - lat_rad.sin() * sin_decl)
        / (lat_rad.cos() * cos_decl);
    if !(-1.0..=1.0).contains(&cos_hour_angle) {
        return None;
    }
    let hour_angle = cos_hour_angle.acos().to_degrees();

    Some((
        j_transit - hour_angle / 360.0,
        j_transit + hour_angle / 360.0,
    ))
}

fn julian_to_utc(jd: f64) -> Option<DateTime<Utc>> {
    let millis = ((jd - UNIX_EPOCH_JD) * 86_400_000.0).round() as i64;
    Utc.timestamp_millis_opt(millis).single()
}
