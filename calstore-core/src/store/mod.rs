//! Storage backends.
//!
//! A backend stores calendars as container rows and each event as one
//! serialized ICS document keyed by the event name. It knows nothing about
//! models; [`ModelFactory`](crate::factory::ModelFactory) does the mapping.

mod memory;
mod sqlite;

use thiserror::Error;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Raw backend failure. The message may contain driver diagnostics and is
/// never shown past the factory boundary.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failure(String),
}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => BackendError::NotFound(value.to_string()),
            other => BackendError::Failure(other.to_string()),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A stored calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: i64,
    pub owner: String,
    pub key: String,
    /// JSON-encoded calendar properties
    pub props: String,
}

/// A stored event without its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryMeta {
    pub id: i64,
    pub key: String,
}

/// A stored event with its ICS document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryRecord {
    pub id: i64,
    pub key: String,
    pub document: Vec<u8>,
}

/// Operations the factory needs from storage.
pub trait StorageBackend {
    fn create_schema(&mut self) -> BackendResult<()>;
    fn drop_schema(&mut self) -> BackendResult<()>;

    /// Insert a calendar and return its id.
    fn create_container(&mut self, owner: &str, key: &str, props: &str) -> BackendResult<i64>;
    fn update_container(&mut self, id: i64, props: &str) -> BackendResult<()>;

    /// Insert an event document and return its id.
    fn create_primary(&mut self, container_id: i64, key: &str, document: &[u8])
    -> BackendResult<i64>;
    fn update_primary(&mut self, id: i64, document: &[u8]) -> BackendResult<()>;

    fn list_containers_for_owner(&self, owner: &str) -> BackendResult<Vec<ContainerRecord>>;
    fn list_primaries(&self, container_id: i64) -> BackendResult<Vec<PrimaryMeta>>;

    /// Event documents for the given keys. Keys with no stored event are skipped.
    fn fetch_primaries(&self, container_id: i64, keys: &[String])
    -> BackendResult<Vec<PrimaryRecord>>;
}
