//! Model tree <-> iCalendar document mapping.
//!
//! A calendar becomes a VCALENDAR, each event a VEVENT and each variation an
//! EXRULE on its event's VEVENT. EXRULE has no identity of its own, so the
//! variation's identifier and name travel as `X-CALSTORE-*` parameters.

use log::debug;

use crate::error::{CalStoreError, CalStoreResult, FieldError, FieldErrorKind};
use crate::field::{FieldId, FieldType, FieldValue};
use crate::ics::{self, Component, Document, Property};
use crate::model::{
    BindingShape, FieldBinding, FieldSource, ModelContext, ModelKind, ModelTree, NodeId,
};

pub const OWNER_PROPERTY: &str = "X-CALSTORE-OWNER";
pub const URI_PROPERTY: &str = "X-CALSTORE-URI";
pub const TIMEZONE_PROPERTY: &str = "X-WR-TIMEZONE";
pub const DISPLAY_NAME_PROPERTY: &str = "X-WR-CALNAME";

/// EXRULE parameter carrying the variation identifier
pub const ID_PARAM: &str = "X-CALSTORE-ID";
/// EXRULE parameter carrying the variation name
pub const NAME_PARAM: &str = "X-CALSTORE-NAME";

const EXCEPTION_RULE: &str = "EXRULE";
/// Regenerated by the ICS writer on every encode
const STAMP_PROPERTY: &str = "DTSTAMP";

const CALENDAR_PROPERTIES: [&str; 4] = [
    OWNER_PROPERTY,
    URI_PROPERTY,
    TIMEZONE_PROPERTY,
    DISPLAY_NAME_PROPERTY,
];

/// How event fields sit on a VEVENT.
pub(crate) const EVENT_BINDINGS: &[FieldBinding] = &[
    FieldBinding {
        field: FieldId::Identifier,
        property: "UID",
        shape: BindingShape::Text,
    },
    FieldBinding {
        field: FieldId::Name,
        property: "SUMMARY",
        shape: BindingShape::Text,
    },
    FieldBinding {
        field: FieldId::Start,
        property: "DTSTART",
        shape: BindingShape::DateTime,
    },
    FieldBinding {
        field: FieldId::Rrule,
        property: "RRULE",
        shape: BindingShape::Text,
    },
    FieldBinding {
        field: FieldId::Extensions,
        property: "X-",
        shape: BindingShape::Extensions,
    },
];

#[derive(Debug, Clone)]
pub struct RecurrenceCodec {
    context: ModelContext,
}

impl RecurrenceCodec {
    pub fn new(context: ModelContext) -> Self {
        RecurrenceCodec { context }
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    // ==================== Encoding ====================

    /// Render a whole calendar tree as ICS.
    pub fn encode(&self, tree: &ModelTree) -> CalStoreResult<String> {
        Ok(self.encode_calendar(tree)?.to_ics())
    }

    pub fn encode_calendar(&self, tree: &ModelTree) -> CalStoreResult<Document> {
        let root = tree.root();
        let mut doc = Document::new();

        doc.set(OWNER_PROPERTY, required_str(tree, root, FieldId::Owner)?);
        doc.set(URI_PROPERTY, required_str(tree, root, FieldId::Uri)?);
        doc.set(TIMEZONE_PROPERTY, required_str(tree, root, FieldId::Timezone)?);
        if let Some(display_name) = tree.get_str(root, FieldId::DisplayName)? {
            doc.set(DISPLAY_NAME_PROPERTY, display_name);
        }
        for (name, value) in extensions(tree, root)? {
            doc.properties.push(Property::new(name, value));
        }

        for event in tree.children(root) {
            doc.components.push(self.encode_event(tree, event)?);
        }

        Ok(doc)
    }

    /// One VEVENT with an EXRULE per variation.
    pub fn encode_event(&self, tree: &ModelTree, event: NodeId) -> CalStoreResult<Component> {
        let mut component = Component::primary();

        component.push(Property::new(
            "UID",
            required_str(tree, event, FieldId::Identifier)?,
        ));
        component.push(Property::new(
            "SUMMARY",
            required_str(tree, event, FieldId::Name)?,
        ));

        let start = tree.get(event, FieldId::Start)?.as_date().ok_or_else(|| {
            FieldError::new(
                FieldErrorKind::IS_NULL | FieldErrorKind::WRONG_TYPE,
                ModelKind::Event,
            )
            .on_field(FieldId::Start)
            .with_types(FieldType::Date, FieldType::Null)
        })?;
        // A decoded start keeps its TZID; setting Start rewrites it as UTC
        let dtstart = tree
            .node(event)
            .source()
            .as_component()
            .and_then(|fields| fields.component().find("DTSTART"))
            .cloned()
            .unwrap_or_else(|| Property::new("DTSTART", ics::format_utc(&start)));
        component.push(dtstart);

        if let Some(rrule) = tree.get_str(event, FieldId::Rrule)? {
            component.push(Property::new("RRULE", rrule));
        }

        // Properties of a decoded VEVENT that no field covers
        if let Some(fields) = tree.node(event).source().as_component() {
            for prop in fields.unbound_properties(&[EXCEPTION_RULE, STAMP_PROPERTY]) {
                component.push(prop.clone());
            }
        }

        for (name, value) in extensions(tree, event)? {
            component.push(Property::new(name, value));
        }

        for variation in tree.children(event) {
            component.push(self.encode_variation(tree, variation)?);
        }

        Ok(component)
    }

    /// EXRULE carrying the variation's rule, identity and extensions.
    pub fn encode_variation(&self, tree: &ModelTree, variation: NodeId) -> CalStoreResult<Property> {
        let rrule = tree.get_str(variation, FieldId::Rrule)?.unwrap_or_default();
        let identifier = required_str(tree, variation, FieldId::Identifier)?;

        let mut prop = Property::new(EXCEPTION_RULE, rrule).with_param(ID_PARAM, identifier);
        if let Some(name) = tree.get_str(variation, FieldId::Name)? {
            prop = prop.with_param(NAME_PARAM, name);
        }
        for (key, value) in extensions(tree, variation)? {
            prop = prop.with_param(key, value);
        }

        Ok(prop)
    }

    /// Storage document for one event: a VCALENDAR holding just its VEVENT.
    pub fn encode_primary(&self, tree: &ModelTree, event: NodeId) -> CalStoreResult<String> {
        let mut doc = Document::new();
        doc.components.push(self.encode_event(tree, event)?);
        Ok(doc.to_ics())
    }

    // ==================== Decoding ====================

    /// Parse ICS into a new, unsaved calendar tree.
    pub fn decode(&self, content: &str) -> CalStoreResult<ModelTree> {
        let doc = Document::parse(content)?;
        self.decode_document(&doc)
    }

    pub fn decode_document(&self, doc: &Document) -> CalStoreResult<ModelTree> {
        let mut values = vec![
            (FieldId::Owner, FieldValue::from(doc.value(OWNER_PROPERTY))),
            (FieldId::Uri, FieldValue::from(doc.value(URI_PROPERTY))),
        ];
        if let Some(timezone) = doc.value(TIMEZONE_PROPERTY) {
            values.push((FieldId::Timezone, timezone.into()));
        }
        if let Some(display_name) = doc.value(DISPLAY_NAME_PROPERTY) {
            values.push((FieldId::DisplayName, display_name.into()));
        }

        let extensions: Vec<(String, String)> = doc
            .properties
            .iter()
            .filter(|p| {
                p.is_extension()
                    && !CALENDAR_PROPERTIES
                        .iter()
                        .any(|known| p.name.eq_ignore_ascii_case(known))
            })
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        values.push((FieldId::Extensions, FieldValue::Object(extensions)));

        let mut tree =
            ModelTree::with_root(self.context.clone(), FieldSource::local(), values, None)?;
        let root = tree.root();

        for component in doc.primaries() {
            self.decode_event_into(&mut tree, root, component, None)?;
        }

        debug!(
            "event=decode module=codec status=ok events={} nodes={}",
            tree.children(root).count(),
            tree.len()
        );
        Ok(tree)
    }

    /// Attach the event described by `component` (and its variations) to `calendar`.
    ///
    /// `record_id` marks the event as loaded from storage; its variations share it.
    pub fn decode_event_into(
        &self,
        tree: &mut ModelTree,
        calendar: NodeId,
        component: &Component,
        record_id: Option<i64>,
    ) -> CalStoreResult<NodeId> {
        let mut stored = component.clone();
        let exrules: Vec<Property> = stored.all(EXCEPTION_RULE).cloned().collect();
        stored.remove(EXCEPTION_RULE);

        if let Some(dtstart) = stored.find("DTSTART") {
            if ics::parse_datetime(dtstart).is_none() {
                return Err(FieldError::new(FieldErrorKind::WRONG_TYPE, ModelKind::Event)
                    .on_field(FieldId::Start)
                    .with_types(FieldType::Date, format!("'{}'", dtstart.value))
                    .into());
            }
        }

        let event = tree.attach(
            calendar,
            ModelKind::Event,
            FieldSource::component(stored, EVENT_BINDINGS),
            Vec::new(),
            record_id,
        )?;

        for exrule in &exrules {
            self.decode_variation_into(tree, event, exrule, record_id)?;
        }

        Ok(event)
    }

    /// Attach the variation described by an EXRULE to `event`.
    ///
    /// A bare EXRULE gets a fresh identifier and is appended by position; an
    /// EXRULE with parameters but no identifier is rejected.
    pub fn decode_variation_into(
        &self,
        tree: &mut ModelTree,
        event: NodeId,
        exrule: &Property,
        record_id: Option<i64>,
    ) -> CalStoreResult<NodeId> {
        let rrule = FieldValue::String(exrule.value.clone());

        if exrule.params.is_empty() {
            let identifier = tree.context().identifiers.generate();
            debug!(
                "event=decode module=codec status=synthesized kind=variation identifier={}",
                identifier
            );
            let variation = tree.attach(
                event,
                ModelKind::Variation,
                FieldSource::local(),
                vec![
                    (FieldId::Identifier, identifier.into()),
                    (FieldId::Rrule, rrule),
                ],
                record_id,
            )?;
            // Identifier only exists in memory until the next write
            tree.mark_dirty(variation);
            return Ok(variation);
        }

        let identifier = exrule.param(ID_PARAM).ok_or_else(|| {
            FieldError::new(FieldErrorKind::IS_NULL, ModelKind::Variation)
                .on_field(FieldId::Identifier)
        })?;

        let mut extensions = Vec::new();
        for (key, value) in &exrule.params {
            if key.eq_ignore_ascii_case(ID_PARAM) || key.eq_ignore_ascii_case(NAME_PARAM) {
                continue;
            }
            if Property::is_extension_name(key) {
                extensions.push((key.clone(), value.clone()));
            } else {
                debug!(
                    "event=decode module=codec status=skip kind=variation param={}",
                    key
                );
            }
        }

        let variation = tree.attach(
            event,
            ModelKind::Variation,
            FieldSource::local(),
            vec![
                (FieldId::Name, FieldValue::from(exrule.param(NAME_PARAM))),
                (FieldId::Identifier, identifier.into()),
                (FieldId::Rrule, rrule),
                (FieldId::Extensions, FieldValue::Object(extensions)),
            ],
            record_id,
        )?;
        Ok(variation)
    }

    /// Attach an event from its storage document.
    pub fn decode_primary_into(
        &self,
        tree: &mut ModelTree,
        calendar: NodeId,
        document: &[u8],
        record_id: Option<i64>,
    ) -> CalStoreResult<NodeId> {
        let content = std::str::from_utf8(document)
            .map_err(|e| CalStoreError::IcsParse(format!("document is not UTF-8: {}", e)))?;
        let doc = Document::parse(content)?;

        let mut primaries = doc.primaries();
        match (primaries.next(), primaries.next()) {
            (Some(component), None) => {
                self.decode_event_into(tree, calendar, component, record_id)
            }
            _ => Err(CalStoreError::IcsParse(format!(
                "expected exactly one VEVENT, found {}",
                doc.primaries().count()
            ))),
        }
    }
}

/// Calendar URI derived from a display name, e.g. "Team Standups" -> "team-standups".
pub fn uri_for(name: &str) -> String {
    slug::slugify(name).chars().take(50).collect()
}

fn required_str(tree: &ModelTree, node: NodeId, field: FieldId) -> CalStoreResult<String> {
    tree.get_str(node, field)?.ok_or_else(|| {
        FieldError::new(
            FieldErrorKind::IS_NULL | FieldErrorKind::WRONG_TYPE,
            tree.kind(node),
        )
        .on_field(field)
        .with_types(FieldType::String, FieldType::Null)
        .into()
    })
}

/// Extension pairs of a node. Keys must carry the `X-` prefix.
fn extensions(tree: &ModelTree, node: NodeId) -> CalStoreResult<Vec<(String, String)>> {
    let value = tree.get(node, FieldId::Extensions)?;
    let pairs = value.as_object().unwrap_or_default().to_vec();

    if let Some((key, _)) = pairs.iter().find(|(k, _)| !Property::is_extension_name(k)) {
        return Err(FieldError::new(FieldErrorKind::WRONG_TYPE, tree.kind(node))
            .on_field(FieldId::Extensions)
            .with_key(key.clone())
            .with_types("X- prefixed key", format!("'{}'", key))
            .into());
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn codec() -> RecurrenceCodec {
        RecurrenceCodec::new(ModelContext::standard().unwrap())
    }

    fn standup_tree(codec: &RecurrenceCodec) -> (ModelTree, NodeId) {
        let mut tree =
            ModelTree::new_calendar(codec.context().clone(), "alice", "work").unwrap();
        let root = tree.root();
        let event = tree
            .add_event(
                root,
                "standup",
                Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
                Some("FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR"),
            )
            .unwrap();
        (tree, event)
    }

    #[test]
    fn variation_identity_travels_as_parameters() {
        let codec = codec();
        let (mut tree, event) = standup_tree(&codec);
        let variation = tree
            .add_variation(event, Some("holiday-week"), "FREQ=YEARLY;BYWEEKNO=52")
            .unwrap();

        let prop = codec.encode_variation(&tree, variation).unwrap();
        let identifier = tree.get_str(variation, FieldId::Identifier).unwrap();

        assert_eq!(prop.name, "EXRULE");
        assert_eq!(prop.value, "FREQ=YEARLY;BYWEEKNO=52");
        assert_eq!(prop.param(ID_PARAM), identifier.as_deref());
        assert_eq!(prop.param(NAME_PARAM), Some("holiday-week"));
    }

    #[test]
    fn event_without_start_cannot_be_encoded() {
        let codec = codec();
        let (mut tree, event) = standup_tree(&codec);
        tree.set_value(event, FieldId::Start, FieldValue::Null).unwrap();

        let err = codec.encode_event(&tree, event).unwrap_err();
        let field = err.as_field().expect("field error");
        assert!(field.has(FieldErrorKind::IS_NULL));
        assert_eq!(field.field(), Some(FieldId::Start));
    }

    #[test]
    fn extension_keys_need_prefix() {
        let codec = codec();
        let (mut tree, event) = standup_tree(&codec);
        tree.set_value(
            event,
            FieldId::Extensions,
            FieldValue::Object(vec![("COLOR".into(), "red".into())]),
        )
        .unwrap();

        let err = codec.encode_event(&tree, event).unwrap_err();
        assert!(err.as_field().unwrap().has(FieldErrorKind::WRONG_TYPE));
    }

    #[test]
    fn exrule_with_params_but_no_identifier_is_null() {
        let codec = codec();
        let (mut tree, event) = standup_tree(&codec);
        let exrule = Property::new("EXRULE", "FREQ=YEARLY").with_param(NAME_PARAM, "x");

        let err = codec
            .decode_variation_into(&mut tree, event, &exrule, None)
            .unwrap_err();
        let field = err.as_field().unwrap();
        assert_eq!(field.kinds(), FieldErrorKind::IS_NULL);
        assert_eq!(field.field(), Some(FieldId::Identifier));
    }

    #[test]
    fn bare_exrule_gets_an_identifier() {
        let codec = codec();
        let (mut tree, event) = standup_tree(&codec);
        let exrule = Property::new("EXRULE", "FREQ=MONTHLY");

        let variation = codec
            .decode_variation_into(&mut tree, event, &exrule, Some(3))
            .unwrap();

        assert!(tree.get_str(variation, FieldId::Identifier).unwrap().is_some());
        assert_eq!(tree.get_str(variation, FieldId::Name).unwrap(), None);
        assert!(tree.is_dirty(variation));
    }

    #[test]
    fn unreadable_start_is_wrong_type() {
        let codec = codec();
        let (mut tree, _) = standup_tree(&codec);
        let root = tree.root();

        let mut component = Component::primary();
        component.push(Property::new("UID", "u1"));
        component.push(Property::new("SUMMARY", "retro"));
        component.push(Property::new("DTSTART", "someday"));

        let err = codec
            .decode_event_into(&mut tree, root, &component, None)
            .unwrap_err();
        assert!(err.as_field().unwrap().has(FieldErrorKind::WRONG_TYPE));
    }

    #[test]
    fn primary_document_holds_one_event() {
        let codec = codec();
        let (tree, event) = standup_tree(&codec);

        let ics = codec.encode_primary(&tree, event).unwrap();
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
        assert!(!ics.contains(OWNER_PROPERTY));

        let mut other = ModelTree::new_calendar(codec.context().clone(), "alice", "work").unwrap();
        let root = other.root();
        let decoded = codec
            .decode_primary_into(&mut other, root, ics.as_bytes(), Some(9))
            .unwrap();
        assert_eq!(other.model_id(decoded), 9);
        assert!(!other.is_dirty(decoded));
        assert_eq!(
            other.get_str(decoded, FieldId::Name).unwrap().as_deref(),
            Some("standup")
        );
    }
}
