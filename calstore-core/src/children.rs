//! Keyed, type-homogeneous child storage.

use std::collections::HashMap;
use std::fmt;

use crate::error::{FieldError, FieldErrorKind};
use crate::field::FieldId;
use crate::model::ModelKind;

/// Anything that can report the concrete model kind it stands for.
pub trait Kinded {
    fn kind(&self) -> ModelKind;
}

/// Key of a child inside a [`UniqueChildCollection`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildKey {
    /// Business key (event or variation name)
    Name(String),
    /// Position assigned by [`UniqueChildCollection::append`]
    Index(usize),
}

impl ChildKey {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            ChildKey::Name(name) => Some(name),
            ChildKey::Index(_) => None,
        }
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildKey::Name(name) => f.write_str(name),
            ChildKey::Index(i) => write!(f, "#{}", i),
        }
    }
}

impl From<&str> for ChildKey {
    fn from(name: &str) -> Self {
        ChildKey::Name(name.to_string())
    }
}

impl From<String> for ChildKey {
    fn from(name: String) -> Self {
        ChildKey::Name(name)
    }
}

/// Ordered child store with unique keys.
///
/// The first insertion pins the collection to that child's kind; later
/// insertions of another kind are rejected.
#[derive(Debug, Clone)]
pub struct UniqueChildCollection<V> {
    owner: ModelKind,
    pinned: Option<ModelKind>,
    entries: Vec<(ChildKey, V)>,
    positions: HashMap<ChildKey, usize>,
}

impl<V: Kinded> UniqueChildCollection<V> {
    /// An empty collection; `owner` is the kind of the model holding it.
    pub fn new(owner: ModelKind) -> Self {
        UniqueChildCollection {
            owner,
            pinned: None,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Insert `value` under `key`.
    pub fn set(&mut self, key: ChildKey, value: V) -> Result<(), FieldError> {
        let mut kinds = FieldErrorKind::empty();
        if !self.valid_value(&value) {
            kinds |= FieldErrorKind::WRONG_TYPE;
        }
        if !self.valid_key(&key) {
            kinds |= FieldErrorKind::UNIQUE_VIOLATION;
        }

        if !kinds.is_empty() {
            let mut err = FieldError::new(kinds, self.owner)
                .on_field(FieldId::Children)
                .with_key(key.to_string());
            if let Some(pinned) = self.pinned {
                if pinned != value.kind() {
                    err = err.with_types(pinned, value.kind());
                }
            }
            return Err(err);
        }

        self.pinned.get_or_insert(value.kind());
        self.positions.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    /// Insert `value` under the next positional index.
    pub fn append(&mut self, value: V) -> Result<ChildKey, FieldError> {
        let key = ChildKey::Index(self.entries.len());
        self.set(key.clone(), value)?;
        Ok(key)
    }

    pub fn exists(&self, key: &ChildKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn get(&self, key: &ChildKey) -> Option<&V> {
        self.positions.get(key).map(|&pos| &self.entries[pos].1)
    }

    /// True if `key` is still free.
    pub fn valid_key(&self, key: &ChildKey) -> bool {
        !self.exists(key)
    }

    /// True if `value` matches the pinned kind (or nothing is pinned yet).
    pub fn valid_value(&self, value: &V) -> bool {
        self.pinned.is_none_or(|pinned| pinned == value.kind())
    }

    pub fn valid_kvp(&self, key: &ChildKey, value: &V) -> bool {
        self.valid_key(key) && self.valid_value(value)
    }

    /// Kind fixed by the first insertion.
    pub fn pinned_kind(&self) -> Option<ModelKind> {
        self.pinned
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ChildKey, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ChildKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Stub(ModelKind, &'static str);

    impl Kinded for Stub {
        fn kind(&self) -> ModelKind {
            self.0
        }
    }

    #[test]
    fn empty_collection_accepts_any_kind_then_pins_it() {
        let mut children = UniqueChildCollection::new(ModelKind::Calendar);
        assert!(children.pinned_kind().is_none());

        children
            .set("standup".into(), Stub(ModelKind::Variation, "a"))
            .unwrap();
        assert_eq!(children.pinned_kind(), Some(ModelKind::Variation));

        let err = children
            .set("retro".into(), Stub(ModelKind::Event, "b"))
            .unwrap_err();
        assert!(err.has(FieldErrorKind::WRONG_TYPE));
        assert!(!err.has(FieldErrorKind::UNIQUE_VIOLATION));
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn taken_key_is_unique_violation_regardless_of_kind() {
        let mut children = UniqueChildCollection::new(ModelKind::Calendar);
        children
            .set("standup".into(), Stub(ModelKind::Event, "a"))
            .unwrap();

        let same_kind = children
            .set("standup".into(), Stub(ModelKind::Event, "b"))
            .unwrap_err();
        assert_eq!(same_kind.kinds(), FieldErrorKind::UNIQUE_VIOLATION);

        let other_kind = children
            .set("standup".into(), Stub(ModelKind::Variation, "c"))
            .unwrap_err();
        assert!(other_kind.has(FieldErrorKind::UNIQUE_VIOLATION));
        assert!(other_kind.has(FieldErrorKind::WRONG_TYPE));

        assert_eq!(children.get(&"standup".into()), Some(&Stub(ModelKind::Event, "a")));
    }

    #[test]
    fn append_uses_next_position() {
        let mut children = UniqueChildCollection::new(ModelKind::Event);
        children
            .set("holiday-week".into(), Stub(ModelKind::Variation, "a"))
            .unwrap();
        let key = children.append(Stub(ModelKind::Variation, "b")).unwrap();

        assert_eq!(key, ChildKey::Index(1));
        let keys: Vec<String> = children.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["holiday-week", "#1"]);
    }

    #[test]
    fn validity_checks_match_insertion_rules() {
        let mut children = UniqueChildCollection::new(ModelKind::Event);
        let first = Stub(ModelKind::Variation, "a");
        assert!(children.valid_kvp(&"x".into(), &first));
        children.set("x".into(), first).unwrap();

        let other = Stub(ModelKind::Event, "b");
        assert!(!children.valid_key(&"x".into()));
        assert!(children.valid_key(&"y".into()));
        assert!(!children.valid_value(&other));
        assert!(!children.valid_kvp(&"y".into(), &other));
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut children = UniqueChildCollection::new(ModelKind::Calendar);
        for name in ["zeta", "alpha", "mid"] {
            children.set(name.into(), Stub(ModelKind::Event, name)).unwrap();
        }
        let names: Vec<&str> = children.values().map(|s| s.1).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }
}
