use std::path::Path;

use anyhow::{Context, Result};
use calstore_core::codec::{
    self, DISPLAY_NAME_PROPERTY, OWNER_PROPERTY, TIMEZONE_PROPERTY, URI_PROPERTY,
};
use calstore_core::config::StoreConfig;
use calstore_core::ics::Document;
use owo_colors::OwoColorize;

use super::{ensure_absent, open_factory};
use crate::render::Render;

pub fn run(
    cfg: &StoreConfig,
    database: &Path,
    file: &Path,
    owner: Option<String>,
    uri: Option<String>,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Could not read {}", file.display()))?;
    let mut doc = Document::parse(&content)?;

    let owner = owner
        .or_else(|| doc.value(OWNER_PROPERTY).map(String::from))
        .or_else(|| cfg.default_owner.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "{} names no owner and no default_owner is configured.\n\
                Use --owner <name> or set default_owner in config.toml",
                file.display()
            )
        })?;
    let uri = uri
        .or_else(|| doc.value(URI_PROPERTY).map(String::from))
        .unwrap_or_else(|| default_uri(&doc, file));

    doc.set(OWNER_PROPERTY, owner.as_str());
    doc.set(URI_PROPERTY, uri.as_str());
    if doc.value(TIMEZONE_PROPERTY).is_none() {
        doc.set(TIMEZONE_PROPERTY, cfg.default_timezone.as_str());
    }

    let mut factory = open_factory(database)?;
    ensure_absent(&factory, &owner, &uri)?;

    let mut tree = factory.codec().decode_document(&doc)?;
    let root = tree.root();
    factory.persist(&mut tree, root)?;

    println!("{} {}", "Imported".green(), tree.render());
    Ok(())
}

/// URI for a file that does not carry one: its calendar name, else its file name.
fn default_uri(doc: &Document, file: &Path) -> String {
    let from_name = doc
        .value(DISPLAY_NAME_PROPERTY)
        .map(codec::uri_for)
        .filter(|uri| !uri.is_empty());

    from_name.unwrap_or_else(|| {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match codec::uri_for(&stem) {
            uri if uri.is_empty() => "calendar".to_string(),
            uri => uri,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_prefers_calendar_name() {
        let mut doc = Document::new();
        doc.set(DISPLAY_NAME_PROPERTY, "Team Standups");

        assert_eq!(default_uri(&doc, Path::new("export.ics")), "team-standups");
    }

    #[test]
    fn uri_falls_back_to_file_name() {
        let doc = Document::new();

        assert_eq!(default_uri(&doc, Path::new("/tmp/Work Calendar.ics")), "work-calendar");
        assert_eq!(default_uri(&doc, Path::new("/tmp/!!!.ics")), "calendar");
    }
}
