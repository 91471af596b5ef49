//! Arena holding one calendar aggregate.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{FieldSource, ModelContext, ModelKind, NodeId, UNSAVED_ID};
use crate::children::{ChildKey, Kinded, UniqueChildCollection};
use crate::error::{FieldError, FieldErrorKind};
use crate::field::{FieldId, FieldMask, FieldValue};
use crate::schema::ModelSchema;

/// Child collection entry pointing back into the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildHandle {
    pub node: NodeId,
    pub kind: ModelKind,
}

impl Kinded for ChildHandle {
    fn kind(&self) -> ModelKind {
        self.kind
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    kind: ModelKind,
    schema: Arc<ModelSchema>,
    source: FieldSource,
    parent: Option<NodeId>,
    children: BTreeMap<ModelKind, UniqueChildCollection<ChildHandle>>,
    dirty: bool,
}

impl Node {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn source(&self) -> &FieldSource {
        &self.source
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// One calendar and everything under it.
///
/// The calendar is always the root node. Nodes are never removed, so a
/// [`NodeId`] handed out by a tree stays valid for that tree's lifetime.
#[derive(Debug, Clone)]
pub struct ModelTree {
    context: ModelContext,
    nodes: Vec<Node>,
}

impl ModelTree {
    /// A fresh, unsaved calendar.
    pub fn new_calendar(context: ModelContext, owner: &str, uri: &str) -> Result<Self, FieldError> {
        Self::with_root(
            context,
            FieldSource::local(),
            vec![(FieldId::Owner, owner.into()), (FieldId::Uri, uri.into())],
            None,
        )
    }

    /// A calendar rebuilt from stored values. The result is clean.
    pub fn hydrate_calendar(
        context: ModelContext,
        values: Vec<(FieldId, FieldValue)>,
        record_id: i64,
    ) -> Result<Self, FieldError> {
        Self::with_root(context, FieldSource::local(), values, Some(record_id))
    }

    pub(crate) fn with_root(
        context: ModelContext,
        source: FieldSource,
        values: Vec<(FieldId, FieldValue)>,
        record_id: Option<i64>,
    ) -> Result<Self, FieldError> {
        let mut tree = ModelTree {
            context,
            nodes: Vec::new(),
        };
        let root = tree.build_node(ModelKind::Calendar, source, values, record_id)?;
        tree.nodes.push(root);
        Ok(tree)
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    pub fn root(&self) -> NodeId {
        NodeId::new(0)
    }

    /// # Panics
    /// If `id` was not issued by this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> ModelKind {
        self.node(id).kind
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Read a field. Parent, children and child types are computed from the tree.
    pub fn get(&self, id: NodeId, field: FieldId) -> Result<FieldValue, FieldError> {
        let node = self.node(id);
        let def = node.schema.definition_of(field)?;

        Ok(match field {
            FieldId::Parent => FieldValue::ModelIterator(node.parent.into_iter().collect()),
            FieldId::Children => FieldValue::ModelIterator(self.children(id).collect()),
            FieldId::ChildTypes => FieldValue::Array(
                node.schema
                    .child_kinds()
                    .iter()
                    .map(|kind| FieldValue::from(kind.as_str()))
                    .collect(),
            ),
            _ => node.source.get(def),
        })
    }

    /// String value of a field, `None` when null.
    pub fn get_str(&self, id: NodeId, field: FieldId) -> Result<Option<String>, FieldError> {
        Ok(self.get(id, field)?.as_str().map(str::to_string))
    }

    /// Write a field and mark the node dirty.
    pub fn set_value(
        &mut self,
        id: NodeId,
        field: FieldId,
        value: impl Into<FieldValue>,
    ) -> Result<(), FieldError> {
        let value = value.into();
        let node = &mut self.nodes[id.index()];
        let def = node.schema.validate(field, &value, false)?;
        node.source.set(def, value);
        node.dirty = true;
        Ok(())
    }

    /// Backend id, or [`UNSAVED_ID`].
    pub fn model_id(&self, id: NodeId) -> i64 {
        self.get(id, FieldId::Id)
            .ok()
            .and_then(|v| v.as_int())
            .unwrap_or(UNSAVED_ID)
    }

    pub(crate) fn assign_id(&mut self, id: NodeId, record_id: i64) -> Result<(), FieldError> {
        let node = &mut self.nodes[id.index()];
        let value = FieldValue::Int(record_id);
        let def = node.schema.validate(FieldId::Id, &value, true)?;
        node.source.set(def, value);
        Ok(())
    }

    /// Add a recurring event to a calendar.
    pub fn add_event(
        &mut self,
        calendar: NodeId,
        name: &str,
        start: DateTime<Utc>,
        rrule: Option<&str>,
    ) -> Result<NodeId, FieldError> {
        self.add_entry(calendar, Some(name), rrule, Some(start))
    }

    /// Add an exception to an event. The variation gets a generated identifier.
    pub fn add_variation(
        &mut self,
        event: NodeId,
        name: Option<&str>,
        rrule: &str,
    ) -> Result<NodeId, FieldError> {
        self.add_entry(event, name, Some(rrule), None)
    }

    /// Add an event-shaped entry. Without a start time the entry is a
    /// variation of `parent`; with one it is an event of `parent`.
    pub fn add_entry(
        &mut self,
        parent: NodeId,
        name: Option<&str>,
        rrule: Option<&str>,
        start: Option<DateTime<Utc>>,
    ) -> Result<NodeId, FieldError> {
        let kind = match start {
            Some(_) => ModelKind::Event,
            None => ModelKind::Variation,
        };

        let mut values = vec![
            (FieldId::Name, FieldValue::from(name)),
            (
                FieldId::Identifier,
                FieldValue::String(self.context.identifiers.generate()),
            ),
            (FieldId::Rrule, FieldValue::from(rrule)),
        ];
        if let Some(start) = start {
            values.push((FieldId::Start, FieldValue::Date(start)));
        }

        self.attach(parent, kind, FieldSource::local(), values, None)
    }

    /// Build a node and register it in `parent`'s child collection for `kind`.
    ///
    /// Children are keyed by their schema's key field, or appended
    /// positionally when that value is null.
    pub(crate) fn attach(
        &mut self,
        parent: NodeId,
        kind: ModelKind,
        source: FieldSource,
        values: Vec<(FieldId, FieldValue)>,
        record_id: Option<i64>,
    ) -> Result<NodeId, FieldError> {
        let parent_node = self.node(parent);
        if !parent_node.schema.accepts_child(kind) {
            let accepted: Vec<&str> = parent_node
                .schema
                .child_kinds()
                .iter()
                .map(|k| k.as_str())
                .collect();
            let expected = if accepted.is_empty() {
                "no children".to_string()
            } else {
                accepted.join(" or ")
            };
            return Err(
                FieldError::new(FieldErrorKind::WRONG_TYPE, parent_node.kind)
                    .on_field(FieldId::Children)
                    .with_types(expected, kind),
            );
        }

        let mut node = self.build_node(kind, source, values, record_id)?;
        node.parent = Some(parent);

        let key = match node.schema.key_field() {
            Some(field) => node.source.get(node.schema.definition_of(field)?),
            None => FieldValue::Null,
        };

        let id = NodeId::new(self.nodes.len());
        let handle = ChildHandle { node: id, kind };
        let owner = self.node(parent).kind;
        let collection = self.nodes[parent.index()]
            .children
            .entry(kind)
            .or_insert_with(|| UniqueChildCollection::new(owner));

        match key {
            FieldValue::String(name) => collection.set(ChildKey::Name(name), handle)?,
            _ => {
                collection.append(handle)?;
            }
        }

        self.nodes.push(node);
        Ok(id)
    }

    fn build_node(
        &self,
        kind: ModelKind,
        mut source: FieldSource,
        values: Vec<(FieldId, FieldValue)>,
        record_id: Option<i64>,
    ) -> Result<Node, FieldError> {
        let schema = Arc::clone(self.context.schemas.get(kind)?);

        for (field, value) in values {
            let def = schema.validate(field, &value, true)?;
            source.set(def, value);
        }
        if let Some(record_id) = record_id {
            let value = FieldValue::Int(record_id);
            let def = schema.validate(FieldId::Id, &value, true)?;
            source.set(def, value);
        }

        // Stored fields must be populated once construction is done
        for def in schema.fields().filter(|d| d.name.is_some() && !d.optional) {
            if source.get(def).is_null() {
                return Err(FieldError::new(
                    FieldErrorKind::IS_NULL | FieldErrorKind::WRONG_TYPE,
                    kind,
                )
                .on_field(def.id)
                .with_types(def.kind, "null"));
            }
        }

        Ok(Node {
            kind,
            schema,
            source,
            parent: None,
            children: BTreeMap::new(),
            dirty: record_id.is_none(),
        })
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Children of every kind, each collection in insertion order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .children
            .values()
            .flat_map(|collection| collection.values().map(|handle| handle.node))
    }

    /// Children with the key they are registered under.
    pub fn keyed_children(&self, id: NodeId) -> impl Iterator<Item = (&ChildKey, NodeId)> + '_ {
        self.node(id)
            .children
            .values()
            .flat_map(|collection| collection.iter().map(|(key, handle)| (key, handle.node)))
    }

    pub fn child(&self, id: NodeId, key: &ChildKey) -> Option<NodeId> {
        self.node(id)
            .children
            .values()
            .find_map(|collection| collection.get(key))
            .map(|handle| handle.node)
    }

    /// `id` and everything below it, parents before children.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut children: Vec<NodeId> = self.children(next).collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.node(id).dirty
    }

    pub fn is_subtree_dirty(&self, id: NodeId) -> bool {
        self.subtree(id).into_iter().any(|n| self.node(n).dirty)
    }

    pub(crate) fn mark_dirty(&mut self, id: NodeId) {
        self.nodes[id.index()].dirty = true;
    }

    /// Clear the dirty flag on `id` and its descendants.
    pub fn mark_clean(&mut self, id: NodeId) {
        for node in self.subtree(id) {
            self.nodes[node.index()].dirty = false;
        }
    }

    /// Named fields selected by `mask`, in registration order. Transient fields are skipped.
    pub fn serializable(&self, id: NodeId, mask: FieldMask) -> Vec<(&'static str, FieldValue)> {
        let node = self.node(id);
        node.schema
            .fields()
            .filter(|def| mask.contains_bit(def.bit()))
            .filter_map(|def| def.name.map(|name| (name, node.source.get(def))))
            .collect()
    }
}
