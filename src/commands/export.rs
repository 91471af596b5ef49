use std::path::Path;

use anyhow::{Context, Result};

use super::open_factory;

pub fn run(database: &Path, owner: &str, calendar: &str, output: Option<&Path>) -> Result<()> {
    let factory = open_factory(database)?;
    let tree = factory.load_calendar(owner, calendar)?;
    let ics = factory.codec().encode(&tree)?;

    match output {
        Some(path) => {
            std::fs::write(path, ics)
                .with_context(|| format!("Could not write {}", path.display()))?;
            eprintln!("Exported {}/{} to {}", owner, calendar, path.display());
        }
        None => print!("{}", ics),
    }

    Ok(())
}
