//! RRULE expansion for events.
//!
//! Expands an event's rule into occurrence start times within a date range,
//! subtracting the EXRULE of every variation the event owns.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;

use crate::error::{CalStoreError, CalStoreResult, FieldError, FieldErrorKind};
use crate::field::{FieldId, FieldType};
use crate::ics;
use crate::model::{ModelKind, ModelTree, NodeId};

/// Upper bound on occurrences returned by one expansion.
pub const MAX_OCCURRENCES: u16 = 365;

/// Build an iCalendar-format rule set string for the rrule crate parser.
fn build_rrule_string(dtstart: &str, rrule: &str, exrules: &[String]) -> String {
    let mut lines = vec![dtstart.to_string(), format!("RRULE:{}", rrule)];

    for exrule in exrules {
        lines.push(format!("EXRULE:{}", exrule));
    }

    lines.join("\n")
}

fn utc_dtstart(start: &DateTime<Utc>) -> String {
    format!("DTSTART:{}", ics::format_utc(start))
}

/// DTSTART line for an event. A decoded start with a known TZID stays in
/// local time so BYDAY and BYHOUR are evaluated on the wall clock.
fn event_dtstart(tree: &ModelTree, event: NodeId, start: &DateTime<Utc>) -> String {
    let zoned = tree
        .node(event)
        .source()
        .as_component()
        .and_then(|fields| fields.component().find("DTSTART"))
        .and_then(ics::zoned_local);

    match zoned {
        Some((tz, local)) => format!(
            "DTSTART;TZID={}:{}",
            tz.name(),
            local.format("%Y%m%dT%H%M%S")
        ),
        None => utc_dtstart(start),
    }
}

fn parse_rule_set(rule_set: &str, what: &str) -> CalStoreResult<RRuleSet> {
    rule_set.parse().map_err(|e| {
        CalStoreError::IcsParse(format!("Failed to parse recurrence rule for {}: {}", what, e))
    })
}

/// Check a rule against the recurrence grammar.
pub fn validate_rule(rrule: &str, start: &DateTime<Utc>) -> CalStoreResult<()> {
    parse_rule_set(&build_rrule_string(&utc_dtstart(start), rrule, &[]), "validation")
        .map(|_| ())
}

/// Occurrence start times of `event` within `[from, to]`.
///
/// Variations with an empty rule exclude nothing. An event without a rule
/// occurs once, at its start.
pub fn occurrences(
    tree: &ModelTree,
    event: NodeId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> CalStoreResult<Vec<DateTime<Utc>>> {
    let name = tree.get_str(event, FieldId::Name)?.unwrap_or_default();
    let start = tree.get(event, FieldId::Start)?.as_date().ok_or_else(|| {
        FieldError::new(
            FieldErrorKind::IS_NULL | FieldErrorKind::WRONG_TYPE,
            ModelKind::Event,
        )
        .on_field(FieldId::Start)
        .with_types(FieldType::Date, FieldType::Null)
    })?;

    let rrule = match tree.get_str(event, FieldId::Rrule)? {
        Some(rule) if !rule.trim().is_empty() => rule,
        _ => {
            let single = if start >= from && start <= to {
                vec![start]
            } else {
                Vec::new()
            };
            return Ok(single);
        }
    };

    let mut exrules = Vec::new();
    for variation in tree.children(event) {
        if let Some(rule) = tree.get_str(variation, FieldId::Rrule)? {
            if !rule.trim().is_empty() {
                exrules.push(rule);
            }
        }
    }

    let rrule_set = parse_rule_set(
        &build_rrule_string(&event_dtstart(tree, event, &start), &rrule, &exrules),
        &format!("event '{}'", name),
    )?;

    // Subtract/add 1 second to make the range inclusive (after/before are exclusive).
    let tz: rrule::Tz = Utc.into();
    let after = (from - Duration::seconds(1)).with_timezone(&tz);
    let before = (to + Duration::seconds(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);

    Ok(result
        .dates
        .iter()
        .map(|dt| dt.with_timezone(&Utc))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EVENT_BINDINGS;
    use crate::ics::{Component, Property};
    use crate::model::{FieldSource, ModelContext};
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn tree_with(rrule: Option<&str>) -> (ModelTree, NodeId) {
        let mut tree =
            ModelTree::new_calendar(ModelContext::standard().unwrap(), "alice", "work").unwrap();
        let root = tree.root();
        let event = tree.add_event(root, "standup", utc(2024, 1, 1, 9), rrule).unwrap();
        (tree, event)
    }

    #[test]
    fn test_build_rrule_string_lists_exrules() {
        let s = build_rrule_string(
            &utc_dtstart(&utc(2024, 1, 1, 9)),
            "FREQ=DAILY",
            &["FREQ=WEEKLY;BYDAY=SA,SU".to_string()],
        );
        assert_eq!(
            s,
            "DTSTART:20240101T090000Z\nRRULE:FREQ=DAILY\nEXRULE:FREQ=WEEKLY;BYDAY=SA,SU"
        );
    }

    #[test]
    fn test_weekday_rule_expands_inclusive_range() {
        let (tree, event) = tree_with(Some("FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR"));

        let dates = occurrences(&tree, event, utc(2024, 1, 1, 9), utc(2024, 1, 7, 23)).unwrap();
        assert_eq!(dates.len(), 5);
        assert_eq!(dates[0], utc(2024, 1, 1, 9));
        assert_eq!(dates[4], utc(2024, 1, 5, 9));
    }

    #[test]
    fn test_variations_exclude_occurrences() {
        let (mut tree, event) = tree_with(Some("FREQ=DAILY"));
        tree.add_variation(event, Some("weekends"), "FREQ=WEEKLY;BYDAY=SA,SU")
            .unwrap();
        tree.add_variation(event, Some("nothing"), "").unwrap();

        let dates = occurrences(&tree, event, utc(2024, 1, 1, 0), utc(2024, 1, 14, 23)).unwrap();
        assert_eq!(dates.len(), 10);
        assert!(dates.iter().all(|d| d.format("%a").to_string() != "Sat"));
    }

    #[test]
    fn test_event_without_rule_occurs_once() {
        let (tree, event) = tree_with(None);

        let inside = occurrences(&tree, event, utc(2024, 1, 1, 0), utc(2024, 1, 2, 0)).unwrap();
        assert_eq!(inside, vec![utc(2024, 1, 1, 9)]);

        let outside = occurrences(&tree, event, utc(2024, 2, 1, 0), utc(2024, 2, 2, 0)).unwrap();
        assert!(outside.is_empty());
    }

    #[test]
    fn test_zoned_start_expands_on_local_weekdays() {
        let mut tree =
            ModelTree::new_calendar(ModelContext::standard().unwrap(), "alice", "work").unwrap();
        let root = tree.root();

        let mut component = Component::primary();
        component.push(Property::new("UID", "u1"));
        component.push(Property::new("SUMMARY", "planning"));
        component.push(Property::new("DTSTART", "20240101T080000").with_param("TZID", "Asia/Tokyo"));
        component.push(Property::new("RRULE", "FREQ=WEEKLY;BYDAY=MO"));
        let event = tree
            .attach(
                root,
                ModelKind::Event,
                FieldSource::component(component, EVENT_BINDINGS),
                Vec::new(),
                None,
            )
            .unwrap();

        assert_eq!(
            event_dtstart(&tree, event, &utc(2023, 12, 31, 23)),
            "DTSTART;TZID=Asia/Tokyo:20240101T080000"
        );

        let dates = occurrences(&tree, event, utc(2023, 12, 31, 0), utc(2024, 1, 21, 0)).unwrap();
        assert_eq!(dates.len(), 3);
        for date in &dates {
            let local = date.with_timezone(&chrono_tz::Asia::Tokyo);
            assert_eq!(local.format("%a %H:%M").to_string(), "Mon 08:00");
        }
    }

    #[test]
    fn test_expansion_is_capped() {
        let (tree, event) = tree_with(Some("FREQ=DAILY"));

        let dates = occurrences(&tree, event, utc(2024, 1, 1, 0), utc(2026, 1, 1, 0)).unwrap();
        assert_eq!(dates.len(), MAX_OCCURRENCES as usize);
    }

    #[test]
    fn test_validate_rule_rejects_garbage() {
        assert!(validate_rule("FREQ=WEEKLY;BYDAY=MO", &utc(2024, 1, 1, 9)).is_ok());
        let err = validate_rule("FREQ=SOMETIMES", &utc(2024, 1, 1, 9)).unwrap_err();
        assert!(matches!(err, CalStoreError::IcsParse(_)));
    }
}
