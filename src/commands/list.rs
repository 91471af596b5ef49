use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use super::open_factory;
use crate::render::{Render, render_entries};

pub fn run(database: &Path, owner: &str) -> Result<()> {
    let factory = open_factory(database)?;
    let calendars = factory.load_calendars(owner)?;

    if calendars.is_empty() {
        println!("{}", format!("No calendars for {}", owner).dimmed());
        return Ok(());
    }

    for (i, tree) in calendars.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", tree.render());
        println!("{}", render_entries(tree));
    }

    Ok(())
}
