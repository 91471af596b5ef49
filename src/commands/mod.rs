pub mod add;
pub mod config;
pub mod drop;
pub mod export;
pub mod import;
pub mod init;
pub mod list;
pub mod new_calendar;
pub mod occurrences;

use std::path::Path;

use anyhow::{Context, Result};
use calstore_core::config::StoreConfig;
use calstore_core::store::{SqliteBackend, StorageBackend};
use calstore_core::{CalStoreError, ModelFactory, PersistenceError};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::debug;

/// Open the database at `path`, creating its directory on first use.
pub fn open_factory(path: &Path) -> Result<ModelFactory<SqliteBackend>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }

    debug!("event=cli_open module=cli path={}", path.display());
    let backend = SqliteBackend::open(path)
        .with_context(|| format!("Could not open database {}", path.display()))?;
    Ok(ModelFactory::with_defaults(backend)?)
}

/// Fail if `owner` already has a calendar at `uri`.
pub fn ensure_absent<B: StorageBackend>(
    factory: &ModelFactory<B>,
    owner: &str,
    uri: &str,
) -> Result<()> {
    match factory.load_calendar(owner, uri) {
        Ok(_) => anyhow::bail!("Calendar '{}' of {} already exists", uri, owner),
        Err(CalStoreError::Persistence(PersistenceError::RecordNotFound(_))) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// `--owner`, falling back to default_owner from config.toml.
pub fn resolve_owner(cfg: &StoreConfig, owner: Option<String>) -> Result<String> {
    owner.or_else(|| cfg.default_owner.clone()).ok_or_else(|| {
        anyhow::anyhow!(
            "No owner specified and no default_owner in config.\n\
            Use --owner <name> or set default_owner in config.toml"
        )
    })
}

/// Parse a CLI date/time. Values without an offset are read in `timezone`.
///
/// Accepts RFC 3339 ("2024-01-01T09:00:00Z"), "2024-01-01T09:00",
/// "2024-01-01 09:00" and plain dates (midnight).
pub fn parse_cli_datetime(s: &str, timezone: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid date/time '{}'. Use YYYY-MM-DD, YYYY-MM-DDTHH:MM or RFC 3339",
                s
            )
        })?;

    let tz: chrono_tz::Tz = timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown timezone '{}'", timezone))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow::anyhow!("'{}' does not exist in {}", s, timezone))
}

/// Parse a window length such as "30days" or "2weeks".
pub fn parse_window(s: &str) -> Result<Duration> {
    let std_duration =
        humantime::parse_duration(s).with_context(|| format!("Invalid duration '{}'", s))?;
    Duration::from_std(std_duration).with_context(|| format!("Duration '{}' is too long", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_times_use_the_configured_timezone() {
        let dt = parse_cli_datetime("2024-01-01T10:00", "Europe/Berlin").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());

        let date = parse_cli_datetime("2024-01-01", "UTC").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn offsets_win_over_the_configured_timezone() {
        let dt = parse_cli_datetime("2024-01-01T09:00:00+02:00", "UTC").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_cli_datetime("next tuesday", "UTC").is_err());
        assert!(parse_cli_datetime("2024-01-01", "Mars/Olympus").is_err());
    }

    #[test]
    fn windows_parse_with_humantime() {
        assert_eq!(parse_window("30days").unwrap(), Duration::days(30));
        assert_eq!(parse_window("2weeks").unwrap(), Duration::days(14));
        assert!(parse_window("soon").is_err());
    }

    #[test]
    fn owner_falls_back_to_config() {
        let cfg = StoreConfig {
            default_owner: Some("alice".into()),
            ..StoreConfig::default()
        };
        assert_eq!(resolve_owner(&cfg, None).unwrap(), "alice");
        assert_eq!(resolve_owner(&cfg, Some("bob".into())).unwrap(), "bob");
        assert!(resolve_owner(&StoreConfig::default(), None).is_err());
    }

    #[test]
    fn open_factory_creates_the_database_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/calstore.db");

        open_factory(&path).unwrap();
        assert!(path.exists());
    }
}
