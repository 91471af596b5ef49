//! Where a model's field values live.

use std::collections::BTreeMap;

use crate::field::{FieldDefinition, FieldId, FieldValue};
use crate::ics::{self, Component, Property};

/// How a bound field maps onto component properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingShape {
    /// Property value as a string
    Text,
    /// DATE / DATE-TIME property read as UTC
    DateTime,
    /// Every `X-` property not claimed by another binding
    Extensions,
}

/// Binds a field to a component property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldBinding {
    pub field: FieldId,
    pub property: &'static str,
    pub shape: BindingShape,
}

/// Field values backed by a decoded component.
///
/// Bound fields read and write the component's properties directly; other
/// fields live in a local overlay. Properties no binding claims are left in
/// place so they survive re-encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentFields {
    component: Component,
    bindings: &'static [FieldBinding],
    overlay: BTreeMap<FieldId, FieldValue>,
}

impl ComponentFields {
    pub fn new(component: Component, bindings: &'static [FieldBinding]) -> Self {
        ComponentFields {
            component,
            bindings,
            overlay: BTreeMap::new(),
        }
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    fn binding(&self, field: FieldId) -> Option<&FieldBinding> {
        self.bindings.iter().find(|b| b.field == field)
    }

    fn is_bound_property(&self, name: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| b.shape != BindingShape::Extensions && name.eq_ignore_ascii_case(b.property))
    }

    /// Properties no binding claims, excluding extensions and the named ones.
    pub fn unbound_properties<'a>(
        &'a self,
        excluded: &'a [&'a str],
    ) -> impl Iterator<Item = &'a Property> + 'a {
        self.component.properties.iter().filter(move |p| {
            !p.is_extension()
                && !self.is_bound_property(&p.name)
                && !excluded.iter().any(|e| p.name.eq_ignore_ascii_case(e))
        })
    }

    fn get(&self, def: &FieldDefinition) -> FieldValue {
        let Some(binding) = self.binding(def.id) else {
            return self
                .overlay
                .get(&def.id)
                .cloned()
                .unwrap_or_else(|| def.default.clone());
        };

        match binding.shape {
            BindingShape::Text => self
                .component
                .value(binding.property)
                .map(|v| FieldValue::String(v.to_string()))
                .unwrap_or(FieldValue::Null),
            BindingShape::DateTime => self
                .component
                .find(binding.property)
                .and_then(ics::parse_datetime)
                .map(FieldValue::Date)
                .unwrap_or(FieldValue::Null),
            BindingShape::Extensions => FieldValue::Object(
                self.component
                    .properties
                    .iter()
                    .filter(|p| p.is_extension() && !self.is_bound_property(&p.name))
                    .map(|p| (p.name.clone(), p.value.clone()))
                    .collect(),
            ),
        }
    }

    fn set(&mut self, def: &FieldDefinition, value: FieldValue) {
        let Some(binding) = self.binding(def.id).copied() else {
            self.overlay.insert(def.id, value);
            return;
        };

        match (binding.shape, value) {
            (BindingShape::Text, FieldValue::String(text)) => {
                self.component.set(Property::new(binding.property, text));
            }
            (BindingShape::DateTime, FieldValue::Date(dt)) => {
                self.component
                    .set(Property::new(binding.property, ics::format_utc(&dt)));
            }
            (BindingShape::Extensions, FieldValue::Object(pairs)) => {
                let bindings = self.bindings;
                self.component.properties.retain(|p| {
                    !p.is_extension()
                        || bindings.iter().any(|b| {
                            b.shape != BindingShape::Extensions
                                && p.name.eq_ignore_ascii_case(b.property)
                        })
                });
                for (name, value) in pairs {
                    self.component.push(Property::new(name, value));
                }
            }
            (_, FieldValue::Null) => self.component.remove(binding.property),
            // Values are type-checked against the schema before they get here
            (_, other) => {
                self.overlay.insert(def.id, other);
            }
        }
    }
}

/// Storage for a model's field values, chosen when the model is built.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    /// Plain field table
    Local(BTreeMap<FieldId, FieldValue>),
    /// Values synced with a decoded component
    Component(ComponentFields),
}

impl FieldSource {
    pub fn local() -> Self {
        FieldSource::Local(BTreeMap::new())
    }

    pub fn component(component: Component, bindings: &'static [FieldBinding]) -> Self {
        FieldSource::Component(ComponentFields::new(component, bindings))
    }

    pub(crate) fn get(&self, def: &FieldDefinition) -> FieldValue {
        match self {
            FieldSource::Local(values) => values
                .get(&def.id)
                .cloned()
                .unwrap_or_else(|| def.default.clone()),
            FieldSource::Component(fields) => fields.get(def),
        }
    }

    pub(crate) fn set(&mut self, def: &FieldDefinition, value: FieldValue) {
        match self {
            FieldSource::Local(values) => {
                values.insert(def.id, value);
            }
            FieldSource::Component(fields) => fields.set(def, value),
        }
    }

    pub fn as_component(&self) -> Option<&ComponentFields> {
        match self {
            FieldSource::Component(fields) => Some(fields),
            FieldSource::Local(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use chrono::{TimeZone, Utc};

    const BINDINGS: &[FieldBinding] = &[
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
            field: FieldId::Extensions,
            property: "X-",
            shape: BindingShape::Extensions,
        },
    ];

    fn component() -> Component {
        let mut c = Component::primary();
        c.push(Property::new("SUMMARY", "standup"));
        c.push(Property::new("DTSTART", "20240101T090000Z"));
        c.push(Property::new("LOCATION", "Room 4"));
        c.push(Property::new("X-COLOR", "red"));
        c
    }

    #[test]
    fn bound_fields_read_component() {
        let source = FieldSource::component(component(), BINDINGS);

        let name = FieldDefinition::new(FieldId::Name, FieldType::String);
        let start = FieldDefinition::new(FieldId::Start, FieldType::Date);
        let ext = FieldDefinition::new(FieldId::Extensions, FieldType::Object);

        assert_eq!(source.get(&name), FieldValue::from("standup"));
        assert_eq!(
            source.get(&start),
            FieldValue::Date(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
        );
        assert_eq!(
            source.get(&ext),
            FieldValue::Object(vec![("X-COLOR".into(), "red".into())])
        );
    }

    #[test]
    fn writes_go_to_component_or_overlay() {
        let mut source = FieldSource::component(component(), BINDINGS);
        let start = FieldDefinition::new(FieldId::Start, FieldType::Date);
        let id = FieldDefinition::new(FieldId::Id, FieldType::Int).default_value(-1i64);

        let moved = Utc.with_ymd_and_hms(2024, 2, 5, 10, 30, 0).unwrap();
        source.set(&start, FieldValue::Date(moved));
        source.set(&id, FieldValue::Int(7));

        let fields = source.as_component().unwrap();
        assert_eq!(fields.component().value("DTSTART"), Some("20240205T103000Z"));
        assert_eq!(source.get(&id), FieldValue::Int(7));
    }

    #[test]
    fn unbound_properties_are_kept() {
        let source = FieldSource::component(component(), BINDINGS);
        let fields = source.as_component().unwrap();

        let names: Vec<&str> = fields
            .unbound_properties(&[])
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["LOCATION"]);
    }

    #[test]
    fn replacing_extensions_keeps_other_properties() {
        let mut source = FieldSource::component(component(), BINDINGS);
        let ext = FieldDefinition::new(FieldId::Extensions, FieldType::Object);

        source.set(
            &ext,
            FieldValue::Object(vec![("X-TEAM".into(), "core".into())]),
        );

        assert_eq!(
            source.get(&ext),
            FieldValue::Object(vec![("X-TEAM".into(), "core".into())])
        );
        let fields = source.as_component().unwrap();
        assert_eq!(fields.component().value("LOCATION"), Some("Room 4"));
        assert_eq!(fields.component().value("X-COLOR"), None);
    }
}
