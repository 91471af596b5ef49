use std::path::Path;

use anyhow::Result;
use calstore_core::config::StoreConfig;
use owo_colors::OwoColorize;

pub fn run(cfg: &StoreConfig, database: &Path) -> Result<()> {
    let config_path = StoreConfig::config_path()?;

    println!("{}", "Paths".bold());
    println!("  Config:    {}", config_path.display());
    println!("  Database:  {}", database.display());

    println!();
    println!("{}", "Defaults".bold());
    println!(
        "  Owner:     {}",
        cfg.default_owner.as_deref().unwrap_or("(none)")
    );
    println!("  Timezone:  {}", cfg.default_timezone);

    Ok(())
}
