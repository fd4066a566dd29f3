//! Parsing for compact duration values used on the CLI and in config
//! (e.g. "250ms", "30s", "5m").

use std::str::FromStr;
use std::time::Duration;

use crate::{DroverError, DroverResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DroverDuration(pub Duration);

impl FromStr for DroverDuration {
    type Err = DroverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Self)
    }
}

pub fn parse_duration(input: &str) -> DroverResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DroverError::InvalidArgument("empty duration".to_string()));
    }

    // Longest suffix first so "ms" is not consumed as "m".
    for (unit, to_duration) in [
        ("ms", Duration::from_millis as fn(u64) -> Duration),
        ("s", Duration::from_secs),
        ("m", |v| Duration::from_secs(v.saturating_mul(60))),
        ("h", |v| Duration::from_secs(v.saturating_mul(60 * 60))),
    ] {
        if let Some(num) = s.strip_suffix(unit) {
            if num.is_empty() || !num.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DroverError::InvalidArgument(format!(
                    "invalid duration number {num:?} (from {input:?})"
                )));
            }
            let value: u64 = num.parse().map_err(|_| {
                DroverError::InvalidArgument(format!(
                    "duration number out of range: {num} (from {input:?})"
                ))
            })?;
            return Ok(to_duration(value));
        }
    }

    Err(DroverError::InvalidArgument(format!(
        "invalid duration {s:?} (expected <number><ms|s|m|h>)"
    )))
}
