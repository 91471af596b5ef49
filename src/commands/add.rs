use std::path::Path;

use anyhow::Result;
use calstore_core::ChildKey;
use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;

use super::open_factory;

pub fn event(
    database: &Path,
    owner: &str,
    calendar: &str,
    name: &str,
    start: DateTime<Utc>,
    rrule: Option<&str>,
) -> Result<()> {
    let mut factory = open_factory(database)?;
    let mut tree = factory.load_calendar(owner, calendar)?;
    let root = tree.root();

    factory.new_entry(&mut tree, root, "event", Some(name), rrule, Some(start))?;
    factory.persist(&mut tree, root)?;

    println!("{} {} in {}/{}", "Created".green(), name, owner, calendar);
    Ok(())
}

pub fn variation(
    database: &Path,
    owner: &str,
    calendar: &str,
    event: &str,
    name: Option<&str>,
    rrule: &str,
) -> Result<()> {
    let mut factory = open_factory(database)?;
    let mut tree = factory.load_calendar(owner, calendar)?;
    let root = tree.root();

    let event_node = tree
        .child(root, &ChildKey::from(event))
        .ok_or_else(|| anyhow::anyhow!("Event '{}' not found in {}/{}", event, owner, calendar))?;
    factory.new_entry(&mut tree, event_node, "variation", name, Some(rrule), None)?;
    factory.persist(&mut tree, event_node)?;

    println!(
        "{} variation {} of {}",
        "Created".green(),
        name.unwrap_or("(unnamed)"),
        event
    );
    Ok(())
}
