//! ICS generation.

use icalendar::{Calendar, Component as _};

use super::document::{Component, Document, Property};

impl Document {
    /// Render as ICS text.
    pub fn to_ics(&self) -> String {
        let mut cal = Calendar::new();

        // Calendar properties are a plain list, so repeated names are kept
        for prop in &self.properties {
            cal.append_property(to_ical_property(prop));
        }

        for component in &self.components {
            cal.push(to_ical_event(component));
        }

        let cal = cal.done();
        strip_ics_bloat(&cal.to_string())
    }
}

fn to_ical_event(component: &Component) -> icalendar::Event {
    let mut ics_event = icalendar::Event::new();

    for prop in &component.properties {
        // Repeated names (EXRULE, ATTENDEE, ...) must not overwrite each other
        let repeated = component.all(&prop.name).nth(1).is_some();
        if repeated {
            ics_event.append_multi_property(to_ical_property(prop));
        } else {
            ics_event.append_property(to_ical_property(prop));
        }
    }

    ics_event.done()
}

fn to_ical_property(prop: &Property) -> icalendar::Property {
    let mut ical = icalendar::Property::new(prop.name.as_str(), prop.value.as_str());
    for (key, value) in &prop.params {
        ical.add_parameter(key.as_str(), value.as_str());
    }
    ical
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with CALSTORE
/// - Remove CALSCALE:GREGORIAN (it's the default)
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:CALSTORE\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_document() -> Document {
        let mut event = Component::primary();
        event.push(Property::new("UID", "evt-1"));
        event.push(Property::new("SUMMARY", "standup"));
        event.push(Property::new("DTSTART", "20240101T090000Z"));
        event.push(Property::new("EXRULE", "FREQ=YEARLY").with_param("X-CALSTORE-ID", "v1"));
        event.push(Property::new("EXRULE", "FREQ=MONTHLY").with_param("X-CALSTORE-ID", "v2"));

        let mut doc = Document::new();
        doc.set("X-WR-TIMEZONE", "UTC");
        doc.components.push(event);
        doc
    }

    #[test]
    fn test_generate_keeps_repeated_properties() {
        let ics = make_test_document().to_ics();

        let exrule_count = ics.lines().filter(|l| l.starts_with("EXRULE")).count();
        assert_eq!(
            exrule_count, 2,
            "Should have 2 EXRULE lines, got {}. ICS:\n{}",
            exrule_count, ics
        );
    }

    #[test]
    fn test_generate_strips_bloat() {
        let ics = make_test_document().to_ics();

        assert!(ics.contains("PRODID:CALSTORE"), "ICS:\n{}", ics);
        assert!(!ics.contains("CALSCALE"), "ICS:\n{}", ics);
        assert!(ics.contains("X-WR-TIMEZONE:UTC"), "ICS:\n{}", ics);
    }

    #[test]
    fn test_generate_keeps_repeated_calendar_properties() {
        let mut doc = make_test_document();
        doc.properties.push(Property::new("X-LABEL", "team"));
        doc.properties.push(Property::new("X-LABEL", "ops"));

        let parsed = Document::parse(&doc.to_ics()).expect("Should parse generated ICS");
        let labels: Vec<&str> = parsed
            .properties
            .iter()
            .filter(|p| p.name == "X-LABEL")
            .map(|p| p.value.as_str())
            .collect();
        assert_eq!(labels, vec!["team", "ops"]);
    }

    #[test]
    fn test_generate_then_parse_roundtrip() {
        let doc = make_test_document();
        let parsed = Document::parse(&doc.to_ics()).expect("Should parse generated ICS");

        assert_eq!(parsed.value("X-WR-TIMEZONE"), Some("UTC"));
        let event = &parsed.components[0];
        assert_eq!(event.value("SUMMARY"), Some("standup"));
        let ids: Vec<Option<&str>> = event
            .all("EXRULE")
            .map(|p| p.param("X-CALSTORE-ID"))
            .collect();
        assert_eq!(ids, vec![Some("v1"), Some("v2")]);
    }
}
