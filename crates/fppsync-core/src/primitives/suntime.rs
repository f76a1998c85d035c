use chrono::{Datelike, NaiveDate};

use crate::primitives::time::SymbolicToken;

/// Deterministic approximation of a symbolic sun-relative time, expressed
/// as seconds-since-midnight local time. Used ONLY by the ordering engine
/// to place symbolic-time events relative to hard-time events; never
/// written back into identity or state.
///
/// This is a low-precision day-length oscillator, not an astronomical
/// ephemeris: it approximates sunrise/sunset drift across the year with a
/// cosine wave anchored at the winter solstice, scaled by latitude, and
/// offset by a fixed integer-minute longitude/timezone correction. Good
/// enough to put "Dusk" after "SunSet" and before a 9pm hard time; not
/// good enough to schedule an actual light show.
pub fn estimate_symbolic_seconds(
    date: NaiveDate,
    token: SymbolicToken,
    latitude_deg: f64,
    longitude_offset_minutes: i32,
    timezone_offset_minutes: i32,
    step_minutes: i32,
) -> Option<u32> {
    if !(-90.0..=90.0).contains(&latitude_deg) {
        return None;
    }

    let day_of_year = date.ordinal() as f64;
    // Seasonal day-length swing in minutes, peaking near the solstices and
    // scaled down toward the equator. 150 minutes is a mid-latitude
    // ballpark for the solstice-to-equinox daylight swing.
    let seasonal_amplitude_minutes = 150.0 * (latitude_deg.abs() / 90.0);
    let phase = 2.0 * std::f64::consts::PI * (day_of_year - 355.0) / 365.25;
    let swing_minutes = seasonal_amplitude_minutes * phase.cos();

    let base_sunrise_minutes = 6.0 * 60.0 - swing_minutes / 2.0;
    let base_sunset_minutes = 18.0 * 60.0 + swing_minutes / 2.0;

    let raw_minutes = match token {
        SymbolicToken::Dawn => base_sunrise_minutes - 30.0,
        SymbolicToken::SunRise => base_sunrise_minutes,
        SymbolicToken::SunSet => base_sunset_minutes,
        SymbolicToken::Dusk => base_sunset_minutes + 30.0,
    };

    let adjusted_minutes =
        raw_minutes + longitude_offset_minutes as f64 + timezone_offset_minutes as f64;

    let stepped_minutes = if step_minutes > 0 {
        (adjusted_minutes / step_minutes as f64).round() * step_minutes as f64
    } else {
        adjusted_minutes
    };

    let clamped = stepped_minutes.rem_euclid(24.0 * 60.0);
    Some((clamped * 60.0).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn ordering_holds_within_a_day() {
        let date = d(2026, 6, 21);
        let dawn =
            estimate_symbolic_seconds(date, SymbolicToken::Dawn, 40.0, 0, 0, 1).expect("dawn");
        let sunrise =
            estimate_symbolic_seconds(date, SymbolicToken::SunRise, 40.0, 0, 0, 1).expect("rise");
        let sunset =
            estimate_symbolic_seconds(date, SymbolicToken::SunSet, 40.0, 0, 0, 1).expect("set");
        let dusk =
            estimate_symbolic_seconds(date, SymbolicToken::Dusk, 40.0, 0, 0, 1).expect("dusk");

        assert!(dawn < sunrise);
        assert!(sunrise < sunset);
        assert!(sunset < dusk);
    }

    #[test]
    fn invalid_latitude_returns_none() {
        assert!(estimate_symbolic_seconds(d(2026, 1, 1), SymbolicToken::Dawn, 123.0, 0, 0, 1)
            .is_none());
    }

    #[test]
    fn is_deterministic_across_calls() {
        let date = d(2026, 3, 15);
        let a = estimate_symbolic_seconds(date, SymbolicToken::SunSet, 35.0, -12, -300, 5);
        let b = estimate_symbolic_seconds(date, SymbolicToken::SunSet, 35.0, -12, -300, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn summer_sunset_later_than_winter_at_midlatitude() {
        let summer =
            estimate_symbolic_seconds(d(2026, 6, 21), SymbolicToken::SunSet, 45.0, 0, 0, 1)
                .expect("summer");
        let winter =
            estimate_symbolic_seconds(d(2026, 12, 21), SymbolicToken::SunSet, 45.0, 0, 0, 1)
                .expect("winter");
        assert!(summer > winter);
    }
}
