use std::path::Path;

use anyhow::Result;
use calstore_core::{ChildKey, recurrence};
use chrono::{DateTime, Duration, Utc};

use super::open_factory;
use crate::render::render_occurrences;

pub fn run(
    database: &Path,
    owner: &str,
    calendar: &str,
    event: &str,
    from: DateTime<Utc>,
    within: Duration,
) -> Result<()> {
    let factory = open_factory(database)?;
    let tree = factory.load_calendar(owner, calendar)?;

    let node = tree
        .child(tree.root(), &ChildKey::from(event))
        .ok_or_else(|| anyhow::anyhow!("Event '{}' not found in {}/{}", event, owner, calendar))?;
    let occurrences = recurrence::occurrences(&tree, node, from, from + within)?;

    println!("{}", render_occurrences(event, &occurrences));
    Ok(())
}
