//! Plain-text rendering of a reading snapshot.
//!
//! The newest reading is shown on its own line rounded to whole degrees;
//! the rest follow as a list rounded to tenths.

use std::fmt::{Display, Write as _};

use chrono::{Local, TimeZone};

use super::Reading;

/// Renders `readings` with timestamps in the local time zone.
#[must_use]
pub fn render(readings: &[Reading]) -> String {
    render_in(readings, &Local)
}

/// Renders `readings` with timestamps converted to `tz`.
#[must_use]
pub fn render_in<Tz>(readings: &[Reading], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Some((latest, recent)) = readings.split_first() else {
        return "no readings".to_string();
    };

    let mut out = String::new();
    let _ = write!(
        out,
        "latest  {}  {}°",
        format_timestamp(latest, tz),
        round_to(latest.value, 0)
    );
    for reading in recent {
        let _ = write!(
            out,
            "\n  {}  {}°",
            format_timestamp(reading, tz),
            round_to(reading.value, 1)
        );
    }
    out
}

fn format_timestamp<Tz>(reading: &Reading, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    reading
        .timestamp
        .with_timezone(tz)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Rounds `value` to `decimals` fractional digits, half away from zero.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}
