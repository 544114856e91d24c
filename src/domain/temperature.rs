//! Temperature validation and the write-then-refresh request.

use crate::error::ClientError;
use crate::ws::Connection;

/// Lowest temperature accepted for logging, in degrees.
pub const MIN_TEMPERATURE: f64 = -75.0;

/// Highest temperature accepted for logging, in degrees.
pub const MAX_TEMPERATURE: f64 = 160.0;

/// Returns `true` if `input` parses as a finite number within
/// [`MIN_TEMPERATURE`]..=[`MAX_TEMPERATURE`]. Surrounding whitespace is
/// ignored.
///
/// The whole trimmed input must be a number. Trailing text is not
/// tolerated, so `"65F"` and `"65 degrees"` are invalid even though a
/// leading-prefix parse would read them as `65`.
#[must_use]
pub fn is_valid_temperature(input: &str) -> bool {
    input
        .trim()
        .parse::<f64>()
        .is_ok_and(is_valid_temperature_value)
}

/// Numeric counterpart of [`is_valid_temperature`].
#[must_use]
pub fn is_valid_temperature_value(value: f64) -> bool {
    value.is_finite() && (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&value)
}

/// Writes `value` and requests the newest `read_limit` readings in one batch,
/// so the cache refreshes right after the write lands.
///
/// # Errors
///
/// Returns [`ClientError::InvalidTemperature`] if `value` is out of range,
/// or the errors of [`Connection::build`] and
/// [`RequestBuilder::send`](crate::ws::RequestBuilder::send).
pub fn log_temperature(
    connection: &Connection,
    value: f64,
    read_limit: u32,
) -> Result<(), ClientError> {
    if !is_valid_temperature_value(value) {
        return Err(ClientError::InvalidTemperature(value.to_string()));
    }
    connection
        .build()?
        .write_call(value)
        .and_then()
        .read_latest_call(Some(read_limit))
        .send()?;
    tracing::info!(value, "temperature logged");
    Ok(())
}
