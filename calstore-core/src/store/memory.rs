//! In-process backend. Counts writes so callers can check persistence is idempotent.

use super::{
    BackendError, BackendResult, ContainerRecord, PrimaryMeta, PrimaryRecord, StorageBackend,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredPrimary {
    id: i64,
    container_id: i64,
    key: String,
    document: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    schema: bool,
    next_id: i64,
    containers: Vec<ContainerRecord>,
    primaries: Vec<StoredPrimary>,
    writes: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create/update calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn ensure_schema(&self) -> BackendResult<()> {
        if !self.schema {
            return Err(BackendError::Failure("schema has not been created".into()));
        }
        Ok(())
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl StorageBackend for MemoryBackend {
    fn create_schema(&mut self) -> BackendResult<()> {
        self.schema = true;
        Ok(())
    }

    fn drop_schema(&mut self) -> BackendResult<()> {
        self.schema = false;
        self.containers.clear();
        self.primaries.clear();
        Ok(())
    }

    fn create_container(&mut self, owner: &str, key: &str, props: &str) -> BackendResult<i64> {
        self.ensure_schema()?;
        self.writes += 1;
        if self
            .containers
            .iter()
            .any(|c| c.owner == owner && c.key == key)
        {
            return Err(BackendError::Failure(format!(
                "duplicate calendar ({}, {})",
                owner, key
            )));
        }

        let id = self.next_id();
        self.containers.push(ContainerRecord {
            id,
            owner: owner.to_string(),
            key: key.to_string(),
            props: props.to_string(),
        });
        Ok(id)
    }

    fn update_container(&mut self, id: i64, props: &str) -> BackendResult<()> {
        self.ensure_schema()?;
        self.writes += 1;
        let container = self
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("calendar {}", id)))?;
        container.props = props.to_string();
        Ok(())
    }

    fn create_primary(
        &mut self,
        container_id: i64,
        key: &str,
        document: &[u8],
    ) -> BackendResult<i64> {
        self.ensure_schema()?;
        self.writes += 1;
        if !self.containers.iter().any(|c| c.id == container_id) {
            return Err(BackendError::Failure(format!(
                "calendar {} does not exist",
                container_id
            )));
        }
        if self
            .primaries
            .iter()
            .any(|p| p.container_id == container_id && p.key == key)
        {
            return Err(BackendError::Failure(format!(
                "duplicate event ({}, {})",
                container_id, key
            )));
        }

        let id = self.next_id();
        self.primaries.push(StoredPrimary {
            id,
            container_id,
            key: key.to_string(),
            document: document.to_vec(),
        });
        Ok(id)
    }

    fn update_primary(&mut self, id: i64, document: &[u8]) -> BackendResult<()> {
        self.ensure_schema()?;
        self.writes += 1;
        let primary = self
            .primaries
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("event {}", id)))?;
        primary.document = document.to_vec();
        Ok(())
    }

    fn list_containers_for_owner(&self, owner: &str) -> BackendResult<Vec<ContainerRecord>> {
        self.ensure_schema()?;
        Ok(self
            .containers
            .iter()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect())
    }

    fn list_primaries(&self, container_id: i64) -> BackendResult<Vec<PrimaryMeta>> {
        self.ensure_schema()?;
        Ok(self
            .primaries
            .iter()
            .filter(|p| p.container_id == container_id)
            .map(|p| PrimaryMeta {
                id: p.id,
                key: p.key.clone(),
            })
            .collect())
    }

    fn fetch_primaries(
        &self,
        container_id: i64,
        keys: &[String],
    ) -> BackendResult<Vec<PrimaryRecord>> {
        self.ensure_schema()?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.primaries
                    .iter()
                    .find(|p| p.container_id == container_id && &p.key == key)
            })
            .map(|p| PrimaryRecord {
                id: p.id,
                key: p.key.clone(),
                document: p.document.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_counted() {
        let mut backend = MemoryBackend::new();
        backend.create_schema().unwrap();
        assert_eq!(backend.write_count(), 0);

        let cal = backend.create_container("alice", "work", "[]").unwrap();
        backend.create_primary(cal, "standup", b"doc").unwrap();
        backend.list_primaries(cal).unwrap();
        assert_eq!(backend.write_count(), 2);
    }

    #[test]
    fn missing_schema_fails() {
        let mut backend = MemoryBackend::new();
        assert!(backend.create_container("alice", "work", "[]").is_err());
    }
}
