//! Local civil time for a resolved timezone, backed by the compiled IANA
//! database shipped with `chrono-tz`.

use crate::error::{Result, TzError};
use chrono::{DateTime, Offset, Utc};
use chrono_tz::Tz;
use std::fmt;

/// `2002-07-27 08:00:00 CEST+0200`
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z%z";
/// `UTC+0200`
pub const OFFSET_FORMAT: &str = "UTC%z";

/// Outcome of resolving a (zone, instant) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Local(DateTime<Tz>),
    /// No zone covered the coordinate.
    Unresolved,
}

impl Resolved {
    pub fn local(&self) -> Option<&DateTime<Tz>> {
        match self {
            Resolved::Local(dt) => Some(dt),
            Resolved::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolved::Local(_))
    }

    /// Offset from UTC in seconds, east positive.
    pub fn utc_offset_seconds(&self) -> Option<i32> {
        self.local()
            .map(|dt| dt.offset().fix().local_minus_utc())
    }
}

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&TimeResolver::format(self))
    }
}

/// Maps timezone ids and UTC instants to local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeResolver;

impl TimeResolver {
    /// Parses an IANA id against the rule database.
    pub fn zone(tzid: &str) -> Result<Tz> {
        tzid.parse::<Tz>()
            .map_err(|_| TzError::UnknownTimezone(tzid.to_string()))
    }

    /// Converts `instant` to local time in `tzid`. `None` short-circuits to
    /// [`Resolved::Unresolved`] without consulting the rule database.
    pub fn resolve(tzid: Option<&str>, instant: DateTime<Utc>) -> Result<Resolved> {
        let Some(tzid) = tzid else {
            return Ok(Resolved::Unresolved);
        };
        let tz = Self::zone(tzid)?;
        Ok(Resolved::Local(instant.with_timezone(&tz)))
    }

    /// Date, time, zone abbreviation and offset; empty when unresolved.
    pub fn format(resolved: &Resolved) -> String {
        resolved
            .local()
            .map(|dt| dt.format(LOCAL_TIME_FORMAT).to_string())
            .unwrap_or_default()
    }

    /// `UTC±hhmm`; empty when unresolved.
    pub fn format_offset(resolved: &Resolved) -> String {
        resolved
            .local()
            .map(|dt| dt.format(OFFSET_FORMAT).to_string())
            .unwrap_or_default()
    }
}
