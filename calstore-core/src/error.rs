//! Error types for calstore.

use std::fmt;

use bitflags::bitflags;
use thiserror::Error;

use crate::field::FieldId;
use crate::model::ModelKind;

bitflags! {
    /// Field contract violations. Several kinds can be reported by one error,
    /// e.g. assigning null to a required string field is `IS_NULL | WRONG_TYPE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldErrorKind: u8 {
        const NOT_FOUND = 1;
        const UNIQUE_VIOLATION = 1 << 1;
        const READ_ONLY = 1 << 2;
        const IS_NULL = 1 << 3;
        const WRONG_TYPE = 1 << 4;
        const ALREADY_DEFINED = 1 << 5;
    }
}

/// A field or child-collection contract violation on a model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", self.message())]
pub struct FieldError {
    kinds: FieldErrorKind,
    model: ModelKind,
    field: Option<FieldId>,
    key: Option<String>,
    expected: Option<String>,
    found: Option<String>,
}

impl FieldError {
    pub fn new(kinds: FieldErrorKind, model: ModelKind) -> Self {
        FieldError {
            kinds,
            model,
            field: None,
            key: None,
            expected: None,
            found: None,
        }
    }

    pub fn on_field(mut self, field: FieldId) -> Self {
        self.field = Some(field);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Record what was expected and what was supplied, for `WRONG_TYPE` messages.
    pub fn with_types(mut self, expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        self.expected = Some(expected.to_string());
        self.found = Some(found.to_string());
        self
    }

    pub fn kinds(&self) -> FieldErrorKind {
        self.kinds
    }

    /// True if `kind` is one of the reported violations.
    pub fn has(&self, kind: FieldErrorKind) -> bool {
        self.kinds.contains(kind)
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn field(&self) -> Option<FieldId> {
        self.field
    }

    /// One clause per reported kind, joined with "; ".
    pub fn message(&self) -> String {
        let subject = match self.field {
            Some(field) => format!("{} field '{}'", self.model, field),
            None => self.model.to_string(),
        };

        let mut clauses = Vec::new();
        if self.has(FieldErrorKind::NOT_FOUND) {
            clauses.push("is not defined".to_string());
        }
        if self.has(FieldErrorKind::UNIQUE_VIOLATION) {
            clauses.push(match &self.key {
                Some(key) => format!("already has a child keyed '{}'", key),
                None => "already has a child with that key".to_string(),
            });
        }
        if self.has(FieldErrorKind::READ_ONLY) {
            clauses.push("is read-only".to_string());
        }
        if self.has(FieldErrorKind::IS_NULL) {
            clauses.push("cannot be null".to_string());
        }
        if self.has(FieldErrorKind::WRONG_TYPE) {
            clauses.push(match (&self.expected, &self.found) {
                (Some(expected), Some(found)) => format!("expects {} but got {}", expected, found),
                _ => "received a value of the wrong type".to_string(),
            });
        }
        if self.has(FieldErrorKind::ALREADY_DEFINED) {
            clauses.push("is already defined".to_string());
        }

        if clauses.is_empty() {
            return format!("{}: invalid", subject);
        }
        format!("{} {}", subject, clauses.join("; "))
    }
}

/// Storage failures, already stripped of backend diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Storage backend failed during {operation}")]
    BackendFailure { operation: &'static str },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Schema {operation} failed")]
    SchemaOperationFailed { operation: &'static str },

    #[error("No model type implements contract '{0}'")]
    UnknownMapping(String),

    #[error("Persistence error: {0}")]
    Other(String),
}

/// Errors that can occur in calstore operations.
#[derive(Error, Debug)]
pub enum CalStoreError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("ICS generation error: {0}")]
    IcsGenerate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CalStoreError {
    /// The field violation carried by this error, if any.
    pub fn as_field(&self) -> Option<&FieldError> {
        match self {
            CalStoreError::Field(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for calstore operations.
pub type CalStoreResult<T> = Result<T, CalStoreError>;

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join("|"))
    }
}
