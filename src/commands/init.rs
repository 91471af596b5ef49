use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use super::open_factory;

pub fn run(database: &Path) -> Result<()> {
    let mut factory = open_factory(database)?;
    factory.create_schema()?;

    println!("{} {}", "Initialized".green(), database.display());
    Ok(())
}
