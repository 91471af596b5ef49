//! DATE / DATE-TIME values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::debug;

use super::document::Property;

/// Format as a UTC DATE-TIME (`20240101T090000Z`).
pub fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Parse a DTSTART-style property into UTC.
///
/// Handles:
/// - VALUE=DATE: `DTSTART;VALUE=DATE:20240108` (midnight UTC)
/// - TZID parameter: `DTSTART;TZID=America/New_York:20240108T100000`
/// - UTC: `DTSTART:20240108T100000Z`
/// - Floating: `DTSTART:20240108T100000` (read as UTC)
pub fn parse_datetime(prop: &Property) -> Option<DateTime<Utc>> {
    let value = prop.value.trim();

    let is_date = prop
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || value.len() == 8;
    if is_date {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
    }

    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .ok()
            .map(|dt| dt.and_utc());
    }

    if let Some((tz, local)) = zoned_local(prop) {
        return tz
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    if let Some(tzid) = prop.param("TZID") {
        debug!(
            "event=ics_time module=ics status=fallback reason=unknown_tzid tzid={}",
            tzid
        );
    }
    Some(naive.and_utc())
}

/// Wall-clock time and zone of a `TZID=` DATE-TIME whose zone is known.
pub fn zoned_local(prop: &Property) -> Option<(chrono_tz::Tz, NaiveDateTime)> {
    let tz = prop.param("TZID")?.parse::<chrono_tz::Tz>().ok()?;
    let local = NaiveDateTime::parse_from_str(prop.value.trim(), "%Y%m%dT%H%M%S").ok()?;
    Some((tz, local))
}
