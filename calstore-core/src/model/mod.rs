//! Calendar, event and variation models.
//!
//! Models of one calendar aggregate live in a single [`ModelTree`] arena and
//! refer to each other by [`NodeId`]. Field access is checked against the
//! kind's [`ModelSchema`](crate::schema::ModelSchema).

mod identity;
mod source;
mod tree;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::schema::SchemaRegistry;

pub use identity::{IdentifierGenerator, TimeOrderedIds};
pub use source::{BindingShape, ComponentFields, FieldBinding, FieldSource};
pub use tree::{ChildHandle, ModelTree, Node};

/// Id of a model that has never been persisted.
pub const UNSAVED_ID: i64 = -1;

/// Concrete model type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Calendar,
    Event,
    Variation,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Calendar => "calendar",
            ModelKind::Event => "event",
            ModelKind::Variation => "variation",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a node inside its [`ModelTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        NodeId(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Registries a tree needs to build models: schemas and identifier generation.
#[derive(Clone)]
pub struct ModelContext {
    pub schemas: Arc<SchemaRegistry>,
    pub identifiers: Arc<dyn IdentifierGenerator>,
}

impl ModelContext {
    pub fn new(schemas: SchemaRegistry, identifiers: Arc<dyn IdentifierGenerator>) -> Self {
        ModelContext {
            schemas: Arc::new(schemas),
            identifiers,
        }
    }

    /// Standard schemas with time-ordered identifiers.
    pub fn standard() -> Result<Self, FieldError> {
        Ok(ModelContext::new(
            SchemaRegistry::standard()?,
            Arc::new(TimeOrderedIds),
        ))
    }
}

impl fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContext")
            .field("schemas", &self.schemas)
            .finish_non_exhaustive()
    }
}
