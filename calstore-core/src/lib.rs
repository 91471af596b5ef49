//! Core of calstore: typed calendar, event and variation models stored as
//! recurrence-rule documents.
//!
//! - `schema`, `field` and `children` define the typed field contract
//! - `model` holds a calendar aggregate in an arena tree
//! - `codec` maps the tree to ICS and back
//! - `factory` creates, hydrates and persists trees through a `store` backend

pub mod children;
pub mod codec;
pub mod config;
pub mod error;
pub mod factory;
pub mod field;
pub mod ics;
pub mod model;
pub mod recurrence;
pub mod schema;
pub mod store;

pub use children::{ChildKey, UniqueChildCollection};
pub use codec::RecurrenceCodec;
pub use error::{CalStoreError, CalStoreResult, FieldError, FieldErrorKind, PersistenceError};
pub use factory::{ContractRegistry, ModelFactory};
pub use field::{FieldId, FieldMask, FieldType, FieldValue};
pub use model::{ModelContext, ModelKind, ModelTree, NodeId, UNSAVED_ID};
pub use schema::{ModelSchema, SchemaRegistry};
