//! ICS parsing using the icalendar crate's parser.

use icalendar::parser::{self, read_calendar, unfold};
use log::debug;

use super::document::{Component, Document, PRIMARY_COMPONENT, Property};
use crate::error::{CalStoreError, CalStoreResult};

/// Envelope properties written by every generator; not part of the model.
const ENVELOPE_PROPERTIES: [&str; 3] = ["VERSION", "PRODID", "CALSCALE"];

impl Document {
    /// Parse ICS content. Only primary (VEVENT) components are kept.
    pub fn parse(content: &str) -> CalStoreResult<Document> {
        let unfolded = unfold(content);
        let calendar =
            read_calendar(&unfolded).map_err(|e| CalStoreError::IcsParse(e.to_string()))?;

        let properties = calendar
            .properties
            .iter()
            .filter(|p| {
                !ENVELOPE_PROPERTIES
                    .iter()
                    .any(|envelope| p.name.as_ref().eq_ignore_ascii_case(envelope))
            })
            .map(to_property)
            .collect();

        let mut components = Vec::new();
        for component in &calendar.components {
            if !component.name.as_ref().eq_ignore_ascii_case(PRIMARY_COMPONENT) {
                debug!(
                    "event=ics_parse module=ics status=skip component={}",
                    component.name
                );
                continue;
            }
            if !component.components.is_empty() {
                debug!(
                    "event=ics_parse module=ics status=skip nested_components={}",
                    component.components.len()
                );
            }

            components.push(Component {
                name: PRIMARY_COMPONENT.to_string(),
                properties: component.properties.iter().map(to_property).collect(),
            });
        }

        Ok(Document {
            properties,
            components,
        })
    }
}

fn to_property(prop: &parser::Property) -> Property {
    Property {
        name: prop.name.to_string(),
        value: prop.val.to_string(),
        params: prop
            .params
            .iter()
            .map(|param| {
                (
                    param.key.to_string(),
                    param
                        .val
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_calendar_and_event_properties() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
X-WR-TIMEZONE:Europe/Berlin\r\n\
BEGIN:VEVENT\r\n\
UID:abc\r\n\
SUMMARY:standup\r\n\
DTSTART:20240101T090000Z\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO\r\n\
END:VEVENT\r\n\
BEGIN:VTODO\r\n\
UID:todo\r\n\
END:VTODO\r\n\
END:VCALENDAR\r\n";

        let doc = Document::parse(ics).expect("Should parse");

        assert_eq!(doc.value("X-WR-TIMEZONE"), Some("Europe/Berlin"));
        assert_eq!(doc.value("PRODID"), None, "Envelope properties are dropped");
        assert_eq!(doc.components.len(), 1, "Only VEVENTs are kept");
        let event = &doc.components[0];
        assert_eq!(event.value("SUMMARY"), Some("standup"));
        assert_eq!(event.value("RRULE"), Some("FREQ=WEEKLY;BYDAY=MO"));
    }

    #[test]
    fn test_parse_keeps_parameter_order() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:abc\r\n\
SUMMARY:standup\r\n\
DTSTART:20240101T090000Z\r\n\
EXRULE;X-CALSTORE-ID=v1;X-CALSTORE-NAME=holiday-week;X-COLOR=red:FREQ=YEARLY\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let doc = Document::parse(ics).expect("Should parse");
        let exrule = doc.components[0].find("EXRULE").expect("Should have EXRULE");

        let keys: Vec<&str> = exrule.params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["X-CALSTORE-ID", "X-CALSTORE-NAME", "X-COLOR"]);
        assert_eq!(exrule.param("X-COLOR"), Some("red"));
        assert_eq!(exrule.value, "FREQ=YEARLY");
    }
}
