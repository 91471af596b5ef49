//! Model creation, hydration and persistence.
//!
//! [`ModelFactory`] is the only component that talks to a [`StorageBackend`].
//! Backend failures are logged here and re-raised as [`PersistenceError`]
//! without the driver's diagnostics.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, error, info};

use crate::children::ChildKey;
use crate::codec::RecurrenceCodec;
use crate::error::{CalStoreError, CalStoreResult, FieldError, FieldErrorKind, PersistenceError};
use crate::field::{FieldId, FieldType, FieldValue};
use crate::model::{ModelContext, ModelKind, ModelTree, NodeId, UNSAVED_ID};
use crate::recurrence;
use crate::store::{BackendError, ContainerRecord, StorageBackend};

/// Calendar fields stored in the container row's `props` column.
const CONTAINER_PROPS: [FieldId; 3] = [
    FieldId::Timezone,
    FieldId::DisplayName,
    FieldId::Extensions,
];

/// Maps contract names to the model kind implementing them.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: HashMap<String, ModelKind>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `calendar`/`container`, `event`/`primary` and `variation`/`exception`.
    pub fn standard() -> Self {
        let mut registry = ContractRegistry::new();
        registry.register("calendar", ModelKind::Calendar);
        registry.register("container", ModelKind::Calendar);
        registry.register("event", ModelKind::Event);
        registry.register("primary", ModelKind::Event);
        registry.register("variation", ModelKind::Variation);
        registry.register("exception", ModelKind::Variation);
        registry
    }

    /// Register (or replace) a contract. Names are case-insensitive.
    pub fn register(&mut self, contract: &str, kind: ModelKind) {
        self.contracts.insert(contract.to_lowercase(), kind);
    }

    pub fn resolve(&self, contract: &str) -> Option<ModelKind> {
        self.contracts.get(&contract.to_lowercase()).copied()
    }
}

pub struct ModelFactory<B: StorageBackend> {
    backend: B,
    contracts: ContractRegistry,
    codec: RecurrenceCodec,
}

impl<B: StorageBackend> ModelFactory<B> {
    pub fn new(backend: B, context: ModelContext, contracts: ContractRegistry) -> Self {
        ModelFactory {
            backend,
            contracts,
            codec: RecurrenceCodec::new(context),
        }
    }

    /// Standard schemas, contracts and identifier generation.
    pub fn with_defaults(backend: B) -> CalStoreResult<Self> {
        Ok(Self::new(
            backend,
            ModelContext::standard()?,
            ContractRegistry::standard(),
        ))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn context(&self) -> &ModelContext {
        self.codec.context()
    }

    pub fn codec(&self) -> &RecurrenceCodec {
        &self.codec
    }

    /// Model kind implementing `contract`.
    pub fn implementing_kind(&self, contract: &str) -> Result<ModelKind, PersistenceError> {
        self.contracts
            .resolve(contract)
            .ok_or_else(|| PersistenceError::UnknownMapping(contract.to_string()))
    }

    // ==================== Schema ====================

    pub fn create_schema(&mut self) -> CalStoreResult<()> {
        self.backend
            .create_schema()
            .map_err(|err| schema_failure("create", err))?;
        info!("event=schema module=factory status=ok operation=create");
        Ok(())
    }

    pub fn drop_schema(&mut self) -> CalStoreResult<()> {
        self.backend
            .drop_schema()
            .map_err(|err| schema_failure("drop", err))?;
        info!("event=schema module=factory status=ok operation=drop");
        Ok(())
    }

    // ==================== Creation ====================

    /// An empty, unsaved calendar.
    pub fn new_calendar(&self, owner: &str, uri: &str) -> CalStoreResult<ModelTree> {
        Ok(ModelTree::new_calendar(self.context().clone(), owner, uri)?)
    }

    /// Add an entry of the kind implementing `contract` under `parent`.
    ///
    /// Events need a start time; variations must not have one. Non-empty
    /// rules are checked by the recurrence parser.
    pub fn new_entry(
        &self,
        tree: &mut ModelTree,
        parent: NodeId,
        contract: &str,
        name: Option<&str>,
        rrule: Option<&str>,
        start: Option<DateTime<Utc>>,
    ) -> CalStoreResult<NodeId> {
        let kind = self.implementing_kind(contract)?;
        match (kind, start) {
            (ModelKind::Event, None) => {
                return Err(FieldError::new(
                    FieldErrorKind::IS_NULL | FieldErrorKind::WRONG_TYPE,
                    kind,
                )
                .on_field(FieldId::Start)
                .with_types(FieldType::Date, FieldType::Null)
                .into());
            }
            (ModelKind::Variation, Some(_)) | (ModelKind::Calendar, _) => {
                return Err(FieldError::new(FieldErrorKind::WRONG_TYPE, tree.kind(parent))
                    .on_field(FieldId::Children)
                    .with_types(tree.kind(parent), kind)
                    .into());
            }
            _ => {}
        }

        let rule_start = match start {
            Some(start) => Some(start),
            None => tree.get(parent, FieldId::Start)?.as_date(),
        };
        if let (Some(rule), Some(rule_start)) = (rrule, rule_start) {
            if !rule.trim().is_empty() {
                recurrence::validate_rule(rule, &rule_start)?;
            }
        }

        Ok(tree.add_entry(parent, name, rrule, start)?)
    }

    // ==================== Hydration ====================

    /// Rebuild a calendar (without its events) from its container row.
    pub fn hydrate_calendar(&self, record: &ContainerRecord) -> CalStoreResult<ModelTree> {
        let stored: Vec<(String, FieldValue)> =
            serde_json::from_str(&record.props).map_err(|e| {
                debug!(
                    "event=hydrate module=factory status=error kind=calendar id={} detail={}",
                    record.id, e
                );
                PersistenceError::Other(format!("calendar {} has unreadable properties", record.id))
            })?;

        let schema = self.context().schemas.get(ModelKind::Calendar)?;
        let mut values = vec![
            (FieldId::Owner, FieldValue::from(record.owner.as_str())),
            (FieldId::Uri, FieldValue::from(record.key.as_str())),
        ];
        for (name, value) in stored {
            match schema.by_name(&name) {
                Some(def) if CONTAINER_PROPS.contains(&def.id) => values.push((def.id, value)),
                _ => debug!(
                    "event=hydrate module=factory status=skip kind=calendar id={} field={}",
                    record.id, name
                ),
            }
        }

        Ok(ModelTree::hydrate_calendar(
            self.context().clone(),
            values,
            record.id,
        )?)
    }

    /// Load the stored children of `node` that are not in the tree yet.
    ///
    /// Events are fetched for a calendar and registered under their name.
    /// Variations are stored inside their event's document, so for an event
    /// this returns the variations already present. `child_contract` limits
    /// the kind; `None` loads every kind.
    pub fn new_hydrated_children(
        &self,
        tree: &mut ModelTree,
        node: NodeId,
        child_contract: Option<&str>,
    ) -> CalStoreResult<Vec<NodeId>> {
        let parent_kind = tree.kind(node);
        if let Some(contract) = child_contract {
            let kind = self.implementing_kind(contract)?;
            if !tree.node(node).schema().accepts_child(kind) {
                return Err(FieldError::new(FieldErrorKind::WRONG_TYPE, parent_kind)
                    .on_field(FieldId::Children)
                    .with_types("a child kind", kind)
                    .into());
            }
        }

        if parent_kind != ModelKind::Calendar {
            return Ok(tree.children(node).collect());
        }

        let calendar_id = tree.model_id(node);
        if calendar_id == UNSAVED_ID {
            return Ok(Vec::new());
        }

        let metas = self
            .backend
            .list_primaries(calendar_id)
            .map_err(|err| backend_failure("list_primaries", err))?;
        let keys: Vec<String> = metas
            .into_iter()
            .map(|meta| meta.key)
            .filter(|key| tree.child(node, &ChildKey::Name(key.clone())).is_none())
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let records = self
            .backend
            .fetch_primaries(calendar_id, &keys)
            .map_err(|err| backend_failure("fetch_primaries", err))?;
        if let Some(missing) = keys.iter().find(|k| !records.iter().any(|r| &r.key == *k)) {
            return Err(PersistenceError::RecordNotFound(format!(
                "event '{}' in calendar {}",
                missing, calendar_id
            ))
            .into());
        }

        let mut added = Vec::with_capacity(records.len());
        for record in &records {
            let event =
                self.codec
                    .decode_primary_into(tree, node, &record.document, Some(record.id))?;
            if tree.get_str(event, FieldId::Name)?.as_deref() != Some(record.key.as_str()) {
                debug!(
                    "event=hydrate module=factory status=mismatch kind=event id={} key={}",
                    record.id, record.key
                );
            }
            added.push(event);
        }

        debug!(
            "event=hydrate module=factory status=ok kind=calendar id={} events={}",
            calendar_id,
            added.len()
        );
        Ok(added)
    }

    /// Every calendar `owner` has, with events loaded.
    pub fn load_calendars(&self, owner: &str) -> CalStoreResult<Vec<ModelTree>> {
        let records = self
            .backend
            .list_containers_for_owner(owner)
            .map_err(|err| backend_failure("list_containers_for_owner", err))?;

        let mut trees = Vec::with_capacity(records.len());
        for record in &records {
            trees.push(self.load_record(record)?);
        }
        Ok(trees)
    }

    pub fn load_calendar(&self, owner: &str, uri: &str) -> CalStoreResult<ModelTree> {
        let records = self
            .backend
            .list_containers_for_owner(owner)
            .map_err(|err| backend_failure("list_containers_for_owner", err))?;

        let record = records.iter().find(|r| r.key == uri).ok_or_else(|| {
            PersistenceError::RecordNotFound(format!("calendar '{}' of owner '{}'", uri, owner))
        })?;
        self.load_record(record)
    }

    fn load_record(&self, record: &ContainerRecord) -> CalStoreResult<ModelTree> {
        let mut tree = self.hydrate_calendar(record)?;
        let root = tree.root();
        self.new_hydrated_children(&mut tree, root, None)?;
        Ok(tree)
    }

    // ==================== Persistence ====================

    /// Write `node` and its dirty descendants. Returns the number of backend writes.
    ///
    /// Unsaved models are inserted and receive their backend id; saved ones
    /// are updated. A clean subtree costs no writes. Variations are stored in
    /// their event's document, so persisting one writes the event.
    pub fn persist(&mut self, tree: &mut ModelTree, node: NodeId) -> CalStoreResult<usize> {
        if !tree.is_subtree_dirty(node) {
            debug!(
                "event=persist module=factory status=skip reason=clean kind={} id={}",
                tree.kind(node),
                tree.model_id(node)
            );
            return Ok(0);
        }

        match tree.kind(node) {
            ModelKind::Calendar => self.persist_calendar(tree, node),
            ModelKind::Event => {
                let calendar_id = self.saved_parent_id(tree, node)?;
                self.persist_event(tree, node, calendar_id)
            }
            ModelKind::Variation => {
                let event = tree.parent(node).ok_or_else(|| {
                    PersistenceError::Other("variation is not attached to an event".into())
                })?;
                let calendar_id = self.saved_parent_id(tree, event)?;
                self.persist_event(tree, event, calendar_id)
            }
        }
    }

    fn saved_parent_id(&self, tree: &ModelTree, node: NodeId) -> CalStoreResult<i64> {
        let parent = tree.parent(node).map(|p| tree.model_id(p));
        match parent {
            Some(id) if id != UNSAVED_ID => Ok(id),
            _ => Err(PersistenceError::Other(format!(
                "{} must be persisted after its parent",
                tree.kind(node)
            ))
            .into()),
        }
    }

    fn persist_calendar(&mut self, tree: &mut ModelTree, calendar: NodeId) -> CalStoreResult<usize> {
        let mut writes = 0;

        if tree.is_dirty(calendar) {
            let mask = tree.node(calendar).schema().mask(&CONTAINER_PROPS);
            let props = serde_json::to_string(&tree.serializable(calendar, mask))
                .map_err(|e| PersistenceError::Other(format!("cannot encode calendar: {}", e)))?;

            let id = tree.model_id(calendar);
            if id == UNSAVED_ID {
                let owner = tree.get_str(calendar, FieldId::Owner)?.unwrap_or_default();
                let uri = tree.get_str(calendar, FieldId::Uri)?.unwrap_or_default();
                let new_id = self
                    .backend
                    .create_container(&owner, &uri, &props)
                    .map_err(|err| backend_failure("create_container", err))?;
                tree.assign_id(calendar, new_id)?;
                info!(
                    "event=persist module=factory status=ok kind=calendar op=insert id={}",
                    new_id
                );
            } else {
                self.backend
                    .update_container(id, &props)
                    .map_err(|err| backend_failure("update_container", err))?;
                info!(
                    "event=persist module=factory status=ok kind=calendar op=update id={}",
                    id
                );
            }
            writes += 1;
        }

        let calendar_id = tree.model_id(calendar);
        let events: Vec<NodeId> = tree.children(calendar).collect();
        for event in events {
            writes += self.persist_event(tree, event, calendar_id)?;
        }

        tree.mark_clean(calendar);
        Ok(writes)
    }

    fn persist_event(
        &mut self,
        tree: &mut ModelTree,
        event: NodeId,
        calendar_id: i64,
    ) -> CalStoreResult<usize> {
        if !tree.is_subtree_dirty(event) {
            return Ok(0);
        }

        let document = self.codec.encode_primary(tree, event)?;
        let id = tree.model_id(event);
        let row_id = if id == UNSAVED_ID {
            let key = tree.get_str(event, FieldId::Name)?.unwrap_or_default();
            let new_id = self
                .backend
                .create_primary(calendar_id, &key, document.as_bytes())
                .map_err(|err| backend_failure("create_primary", err))?;
            tree.assign_id(event, new_id)?;
            info!(
                "event=persist module=factory status=ok kind=event op=insert id={} calendar_id={}",
                new_id, calendar_id
            );
            new_id
        } else {
            self.backend
                .update_primary(id, document.as_bytes())
                .map_err(|err| backend_failure("update_primary", err))?;
            info!(
                "event=persist module=factory status=ok kind=event op=update id={}",
                id
            );
            id
        };

        let variations: Vec<NodeId> = tree.children(event).collect();
        for variation in variations {
            tree.assign_id(variation, row_id)?;
        }

        tree.mark_clean(event);
        Ok(1)
    }
}

fn backend_failure(operation: &'static str, err: BackendError) -> CalStoreError {
    error!(
        "event=persist module=factory status=error operation={}",
        operation
    );
    debug!(
        "event=persist module=factory operation={} detail={}",
        operation, err
    );
    match err {
        BackendError::NotFound(what) => PersistenceError::RecordNotFound(what).into(),
        BackendError::Failure(_) => PersistenceError::BackendFailure { operation }.into(),
    }
}

fn schema_failure(operation: &'static str, err: BackendError) -> CalStoreError {
    error!(
        "event=schema module=factory status=error operation={}",
        operation
    );
    debug!(
        "event=schema module=factory operation={} detail={}",
        operation, err
    );
    PersistenceError::SchemaOperationFailed { operation }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use chrono::TimeZone;

    #[test]
    fn contracts_resolve_case_insensitively() {
        let registry = ContractRegistry::standard();
        assert_eq!(registry.resolve("Exception"), Some(ModelKind::Variation));
        assert_eq!(registry.resolve("PRIMARY"), Some(ModelKind::Event));
        assert_eq!(registry.resolve("container"), Some(ModelKind::Calendar));
        assert_eq!(registry.resolve("todo"), None);
    }

    #[test]
    fn unknown_contract_is_unknown_mapping() {
        let factory = ModelFactory::with_defaults(MemoryBackend::new()).unwrap();
        let err = factory.implementing_kind("journal").unwrap_err();
        assert_eq!(err, PersistenceError::UnknownMapping("journal".into()));
    }

    #[test]
    fn new_entry_checks_start_against_kind() {
        let factory = ModelFactory::with_defaults(MemoryBackend::new()).unwrap();
        let mut tree = factory.new_calendar("alice", "work").unwrap();
        let root = tree.root();

        let err = factory
            .new_entry(&mut tree, root, "event", Some("standup"), None, None)
            .unwrap_err();
        assert!(err.as_field().unwrap().has(FieldErrorKind::IS_NULL));

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let event = factory
            .new_entry(&mut tree, root, "primary", Some("standup"), Some("FREQ=DAILY"), Some(start))
            .unwrap();
        let variation = factory
            .new_entry(&mut tree, event, "exception", Some("holiday-week"), Some(""), None)
            .unwrap();
        assert_eq!(tree.kind(variation), ModelKind::Variation);
    }

    #[test]
    fn new_entry_rejects_bad_rules() {
        let factory = ModelFactory::with_defaults(MemoryBackend::new()).unwrap();
        let mut tree = factory.new_calendar("alice", "work").unwrap();
        let root = tree.root();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();

        let err = factory
            .new_entry(&mut tree, root, "event", Some("x"), Some("FREQ=NEVER"), Some(start))
            .unwrap_err();
        assert!(matches!(err, CalStoreError::IcsParse(_)));
        assert_eq!(tree.children(root).count(), 0);
    }

    #[test]
    fn schema_failure_hides_detail() {
        let err = schema_failure("create", BackendError::Failure("disk I/O error at 0x1f".into()));
        assert_eq!(err.to_string(), "Schema create failed");
    }
}
