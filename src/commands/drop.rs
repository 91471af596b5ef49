use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use super::open_factory;

pub fn run(database: &Path, force: bool) -> Result<()> {
    if !force {
        anyhow::bail!(
            "Refusing to drop every calendar in {}.\n\
             If this is intentional, use: calstore drop --force",
            database.display()
        );
    }

    let mut factory = open_factory(database)?;
    factory.drop_schema()?;

    println!("{} {}", "Dropped".red(), database.display());
    Ok(())
}
