use std::path::Path;

use anyhow::Result;
use calstore_core::config::StoreConfig;
use calstore_core::store::StorageBackend;
use calstore_core::{FieldId, ModelFactory, ModelTree};
use owo_colors::OwoColorize;

use super::{ensure_absent, open_factory};
use crate::render::Render;

pub fn run(
    cfg: &mut StoreConfig,
    config_path: &Path,
    database: &Path,
    owner: &str,
    uri: &str,
    name: Option<&str>,
    timezone: Option<&str>,
) -> Result<()> {
    let timezone = timezone.unwrap_or(&cfg.default_timezone).to_string();

    let mut factory = open_factory(database)?;
    let tree = create(&mut factory, owner, uri, name, &timezone)?;
    println!("{} {}", "Created".green(), tree.render());

    if cfg.set_default_owner_if_unset(owner, config_path)? {
        println!("   {} {}", "Default owner set to".dimmed(), owner);
    }
    Ok(())
}

/// Save an empty calendar for `owner` at `uri`.
fn create<B: StorageBackend>(
    factory: &mut ModelFactory<B>,
    owner: &str,
    uri: &str,
    name: Option<&str>,
    timezone: &str,
) -> Result<ModelTree> {
    if timezone.parse::<chrono_tz::Tz>().is_err() {
        anyhow::bail!("Unknown timezone '{}'", timezone);
    }
    ensure_absent(factory, owner, uri)?;

    let mut tree = factory.new_calendar(owner, uri)?;
    let root = tree.root();
    tree.set_value(root, FieldId::Timezone, timezone)?;
    if let Some(name) = name {
        tree.set_value(root, FieldId::DisplayName, name)?;
    }
    factory.persist(&mut tree, root)?;

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calstore_core::store::MemoryBackend;

    fn factory() -> ModelFactory<MemoryBackend> {
        let mut factory = ModelFactory::with_defaults(MemoryBackend::new()).unwrap();
        factory.create_schema().unwrap();
        factory
    }

    #[test]
    fn created_calendar_can_be_loaded() {
        let mut factory = factory();
        create(&mut factory, "alice", "work", Some("Work"), "Europe/Berlin").unwrap();

        let loaded = factory.load_calendar("alice", "work").unwrap();
        let root = loaded.root();
        assert_eq!(
            loaded.get_str(root, FieldId::Timezone).unwrap().as_deref(),
            Some("Europe/Berlin")
        );
        assert_eq!(
            loaded.get_str(root, FieldId::DisplayName).unwrap().as_deref(),
            Some("Work")
        );
        assert_eq!(loaded.children(root).count(), 0);
    }

    #[test]
    fn existing_calendar_is_refused() {
        let mut factory = factory();
        create(&mut factory, "alice", "work", None, "UTC").unwrap();

        let err = create(&mut factory, "alice", "work", None, "UTC").unwrap_err();
        assert!(err.to_string().contains("already exists"), "got: {}", err);

        // Same uri for another owner is fine
        create(&mut factory, "bob", "work", None, "UTC").unwrap();
    }

    #[test]
    fn unknown_timezone_is_refused() {
        let mut factory = factory();
        let err = create(&mut factory, "alice", "work", None, "Mars/Olympus").unwrap_err();
        assert!(err.to_string().contains("Unknown timezone"));
        assert!(factory.load_calendars("alice").unwrap().is_empty());
    }

    #[test]
    fn first_calendar_sets_the_default_owner() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let database = dir.path().join("calstore.db");
        open_factory(&database).unwrap().create_schema().unwrap();

        let mut cfg = StoreConfig::default();
        run(&mut cfg, &config_path, &database, "alice", "work", None, None).unwrap();
        assert_eq!(cfg.default_owner.as_deref(), Some("alice"));

        let factory = open_factory(&database).unwrap();
        let tree = factory.load_calendar("alice", "work").unwrap();
        assert_eq!(
            tree.get_str(tree.root(), FieldId::Timezone).unwrap().as_deref(),
            Some("UTC")
        );
        assert!(ensure_absent(&factory, "alice", "work").is_err());
    }
}
