use chrono::{DateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown timezone {0:?}")]
pub struct UnknownTimezone(pub String);

pub fn parse_timezone(name: &str) -> Result<Tz, UnknownTimezone> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| UnknownTimezone(name.to_string()))
}

/// Seconds elapsed since local midnight in `timezone` at the instant `now`.
pub fn seconds_since_local_midnight(
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<u32, UnknownTimezone> {
    let tz = parse_timezone(timezone)?;
    let local = tz.from_utc_datetime(&now.naive_utc());
    Ok(local.num_seconds_from_midnight())
}
