//! Per-model-type field schemas.
//!
//! A [`ModelSchema`] is built once per [`ModelKind`] and shared by every
//! instance of that kind through the [`SchemaRegistry`]. Bit indices used by
//! [`FieldMask`] are assigned at registration: shared fields count down from
//! the top of the mask, type-specific fields count up from zero.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{FieldError, FieldErrorKind};
use crate::field::{FieldDefinition, FieldId, FieldMask, FieldType, FieldValue};
use crate::model::{ModelKind, UNSAVED_ID};

const MASK_BITS: u32 = 64;

/// Fields every model carries.
const SHARED_FIELDS: [FieldId; 4] = [
    FieldId::Id,
    FieldId::Parent,
    FieldId::Children,
    FieldId::ChildTypes,
];

#[derive(Debug, Clone)]
pub struct ModelSchema {
    kind: ModelKind,
    fields: BTreeMap<FieldId, FieldDefinition>,
    order: Vec<FieldId>,
    child_kinds: Vec<ModelKind>,
    key_field: Option<FieldId>,
}

impl ModelSchema {
    pub fn builder(kind: ModelKind) -> ModelSchemaBuilder {
        ModelSchemaBuilder::new(kind)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Look up a field definition.
    pub fn definition_of(&self, field: FieldId) -> Result<&FieldDefinition, FieldError> {
        self.fields.get(&field).ok_or_else(|| {
            FieldError::new(FieldErrorKind::NOT_FOUND, self.kind).on_field(field)
        })
    }

    /// Find a field by its serialization name.
    pub fn by_name(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.values().find(|def| def.name == Some(name))
    }

    /// Field definitions in registration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.order.iter().filter_map(|id| self.fields.get(id))
    }

    /// Kinds of child this model accepts.
    pub fn child_kinds(&self) -> &[ModelKind] {
        &self.child_kinds
    }

    pub fn accepts_child(&self, kind: ModelKind) -> bool {
        self.child_kinds.contains(&kind)
    }

    /// Field whose value keys this model inside its parent's child collection.
    pub fn key_field(&self) -> Option<FieldId> {
        self.key_field
    }

    /// Mask selecting the given fields. Fields this schema does not define are ignored.
    pub fn mask(&self, fields: &[FieldId]) -> FieldMask {
        fields
            .iter()
            .filter_map(|id| self.fields.get(id))
            .fold(FieldMask::NONE, |mask, def| mask.with_bit(def.bit))
    }

    /// Check that `value` may be stored in `field`.
    ///
    /// All violated rules are reported together. `initializing` lifts the
    /// read-only rule for construction and hydration.
    pub fn validate(
        &self,
        field: FieldId,
        value: &FieldValue,
        initializing: bool,
    ) -> Result<&FieldDefinition, FieldError> {
        let def = self.definition_of(field)?;

        let mut kinds = FieldErrorKind::empty();
        if def.is_read_only() && !initializing {
            kinds |= FieldErrorKind::READ_ONLY;
        }

        let found = value.field_type();
        if value.is_null() {
            if !def.optional && def.kind != FieldType::Null {
                kinds |= FieldErrorKind::IS_NULL | FieldErrorKind::WRONG_TYPE;
            }
        } else if found != def.kind {
            kinds |= FieldErrorKind::WRONG_TYPE;
        }

        if kinds.is_empty() {
            return Ok(def);
        }

        let mut err = FieldError::new(kinds, self.kind).on_field(field);
        if kinds.contains(FieldErrorKind::WRONG_TYPE) {
            err = err.with_types(def.kind, found);
        }
        Err(err)
    }
}

pub struct ModelSchemaBuilder {
    kind: ModelKind,
    fields: BTreeMap<FieldId, FieldDefinition>,
    order: Vec<FieldId>,
    child_kinds: Vec<ModelKind>,
    key_field: Option<FieldId>,
    next_low: u32,
    next_high: u32,
    duplicate: Option<FieldId>,
}

impl ModelSchemaBuilder {
    fn new(kind: ModelKind) -> Self {
        ModelSchemaBuilder {
            kind,
            fields: BTreeMap::new(),
            order: Vec::new(),
            child_kinds: Vec::new(),
            key_field: None,
            next_low: 0,
            next_high: MASK_BITS,
            duplicate: None,
        }
        .field(
            FieldDefinition::new(FieldId::Id, FieldType::Int)
                .read_only()
                .default_value(UNSAVED_ID),
        )
        .field(
            FieldDefinition::new(FieldId::Parent, FieldType::ModelIterator)
                .read_only()
                .transient(),
        )
        .field(
            FieldDefinition::new(FieldId::Children, FieldType::ModelIterator)
                .read_only()
                .transient(),
        )
        .field(
            FieldDefinition::new(FieldId::ChildTypes, FieldType::Array)
                .read_only()
                .transient(),
        )
    }

    /// Register a field. Registering the same id twice fails at [`build`](Self::build).
    pub fn field(mut self, mut def: FieldDefinition) -> Self {
        if self.fields.contains_key(&def.id) {
            self.duplicate.get_or_insert(def.id);
            return self;
        }

        def.bit = if SHARED_FIELDS.contains(&def.id) {
            self.next_high -= 1;
            self.next_high
        } else {
            let bit = self.next_low;
            self.next_low += 1;
            bit
        };

        self.order.push(def.id);
        self.fields.insert(def.id, def);
        self
    }

    pub fn child_kind(mut self, kind: ModelKind) -> Self {
        if !self.child_kinds.contains(&kind) {
            self.child_kinds.push(kind);
        }
        self
    }

    pub fn key_field(mut self, field: FieldId) -> Self {
        self.key_field = Some(field);
        self
    }

    pub fn build(self) -> Result<ModelSchema, FieldError> {
        if let Some(field) = self.duplicate {
            return Err(
                FieldError::new(FieldErrorKind::ALREADY_DEFINED, self.kind).on_field(field),
            );
        }
        if self.next_low > self.next_high {
            return Err(FieldError::new(FieldErrorKind::ALREADY_DEFINED, self.kind)
                .with_types(format!("at most {} fields", MASK_BITS), self.order.len()));
        }
        if let Some(key) = self.key_field {
            if !self.fields.contains_key(&key) {
                return Err(FieldError::new(FieldErrorKind::NOT_FOUND, self.kind).on_field(key));
            }
        }

        Ok(ModelSchema {
            kind: self.kind,
            fields: self.fields,
            order: self.order,
            child_kinds: self.child_kinds,
            key_field: self.key_field,
        })
    }
}

/// Schema table keyed by model kind, populated once at startup.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<ModelKind, Arc<ModelSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the calendar, event and variation schemas.
    pub fn standard() -> Result<Self, FieldError> {
        let mut registry = SchemaRegistry::new();
        registry.register(calendar_schema()?)?;
        registry.register(event_schema()?)?;
        registry.register(variation_schema()?)?;
        Ok(registry)
    }

    pub fn register(&mut self, schema: ModelSchema) -> Result<(), FieldError> {
        let kind = schema.kind();
        if self.schemas.contains_key(&kind) {
            return Err(FieldError::new(FieldErrorKind::ALREADY_DEFINED, kind));
        }
        self.schemas.insert(kind, Arc::new(schema));
        Ok(())
    }

    pub fn get(&self, kind: ModelKind) -> Result<&Arc<ModelSchema>, FieldError> {
        self.schemas
            .get(&kind)
            .ok_or_else(|| FieldError::new(FieldErrorKind::NOT_FOUND, kind))
    }
}

fn calendar_schema() -> Result<ModelSchema, FieldError> {
    ModelSchema::builder(ModelKind::Calendar)
        .field(FieldDefinition::new(FieldId::Owner, FieldType::String).read_only())
        .field(FieldDefinition::new(FieldId::Uri, FieldType::String).read_only())
        .field(FieldDefinition::new(FieldId::Timezone, FieldType::String).default_value("UTC"))
        .field(FieldDefinition::new(FieldId::DisplayName, FieldType::String).optional())
        .field(
            FieldDefinition::new(FieldId::Extensions, FieldType::Object)
                .default_value(FieldValue::Object(Vec::new())),
        )
        .child_kind(ModelKind::Event)
        .key_field(FieldId::Uri)
        .build()
}

/// Fields shared by events and variations.
fn event_shaped(kind: ModelKind, name_optional: bool) -> ModelSchemaBuilder {
    let mut name = FieldDefinition::new(FieldId::Name, FieldType::String).read_only();
    if name_optional {
        name = name.optional();
    }

    ModelSchema::builder(kind)
        .field(name)
        .field(FieldDefinition::new(FieldId::Identifier, FieldType::String).read_only())
        .field(FieldDefinition::new(FieldId::Rrule, FieldType::String).optional())
        .field(FieldDefinition::new(FieldId::Start, FieldType::Date).optional())
        .field(
            FieldDefinition::new(FieldId::IsVariation, FieldType::Bool)
                .read_only()
                .transient()
                .default_value(kind == ModelKind::Variation),
        )
        .field(
            FieldDefinition::new(FieldId::Extensions, FieldType::Object)
                .default_value(FieldValue::Object(Vec::new())),
        )
        .key_field(FieldId::Name)
}

fn event_schema() -> Result<ModelSchema, FieldError> {
    event_shaped(ModelKind::Event, false)
        .child_kind(ModelKind::Variation)
        .build()
}

fn variation_schema() -> Result<ModelSchema, FieldError> {
    event_shaped(ModelKind::Variation, true).build()
}
