mod commands;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use calstore_core::config::StoreConfig;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "calstore")]
#[command(about = "Store recurring calendars, events and their exception rules")]
struct Cli {
    /// Increase log output (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Database file (overrides database_path from config.toml)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the storage schema
    Init,
    /// Remove the storage schema and every stored calendar
    Drop {
        /// Required, this deletes all data
        #[arg(long)]
        force: bool,
    },
    /// Create an empty calendar
    NewCalendar {
        /// Calendar URI (e.g. "work")
        uri: String,

        #[arg(short, long)]
        owner: Option<String>,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Calendar timezone (defaults to default_timezone)
        #[arg(short, long)]
        timezone: Option<String>,
    },
    /// Import an .ics file as a new calendar
    Import {
        file: PathBuf,

        /// Owner of the calendar (defaults to the file's owner, then default_owner)
        #[arg(short, long)]
        owner: Option<String>,

        /// Calendar URI (defaults to the file's URI, then a slug of its name)
        #[arg(short, long)]
        uri: Option<String>,
    },
    /// Print a stored calendar as ICS
    Export {
        /// Calendar URI
        #[arg(short, long)]
        calendar: String,

        #[arg(short, long)]
        owner: Option<String>,

        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List an owner's calendars with their events
    List {
        #[arg(short, long)]
        owner: Option<String>,
    },
    /// Add a recurring event to a calendar
    AddEvent {
        name: String,

        /// Calendar URI
        #[arg(short, long)]
        calendar: String,

        /// First occurrence (e.g. "2024-01-01T09:00", read in default_timezone)
        #[arg(short, long)]
        start: String,

        /// Recurrence rule (e.g. "FREQ=WEEKLY;BYDAY=MO")
        #[arg(short, long)]
        rrule: Option<String>,

        #[arg(short, long)]
        owner: Option<String>,
    },
    /// Add a variation (exception rule) to an event
    AddVariation {
        /// Exception rule; an empty rule excludes nothing
        rrule: String,

        /// Calendar URI
        #[arg(short, long)]
        calendar: String,

        /// Event name
        #[arg(short, long)]
        event: String,

        /// Variation name
        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        owner: Option<String>,
    },
    /// Show when an event occurs
    Occurrences {
        /// Calendar URI
        #[arg(short, long)]
        calendar: String,

        /// Event name
        #[arg(short, long)]
        event: String,

        /// Start of the window (defaults to now)
        #[arg(long)]
        from: Option<String>,

        /// Window length (e.g. "30days", "2weeks")
        #[arg(long, default_value = "30days")]
        within: String,

        #[arg(short, long)]
        owner: Option<String>,
    },
    /// Show configuration paths and values
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cfg = StoreConfig::load()?;
    let database = cli.database.unwrap_or_else(|| cfg.database_path());

    match cli.command {
        Commands::Init => commands::init::run(&database),
        Commands::Drop { force } => commands::drop::run(&database, force),
        Commands::NewCalendar {
            uri,
            owner,
            name,
            timezone,
        } => {
            let owner = commands::resolve_owner(&cfg, owner)?;
            let config_path = StoreConfig::config_path()?;
            commands::new_calendar::run(
                &mut cfg,
                &config_path,
                &database,
                &owner,
                &uri,
                name.as_deref(),
                timezone.as_deref(),
            )
        }
        Commands::Import { file, owner, uri } => {
            commands::import::run(&cfg, &database, &file, owner, uri)
        }
        Commands::Export {
            calendar,
            owner,
            output,
        } => {
            let owner = commands::resolve_owner(&cfg, owner)?;
            commands::export::run(&database, &owner, &calendar, output.as_deref())
        }
        Commands::List { owner } => {
            let owner = commands::resolve_owner(&cfg, owner)?;
            commands::list::run(&database, &owner)
        }
        Commands::AddEvent {
            name,
            calendar,
            start,
            rrule,
            owner,
        } => {
            let owner = commands::resolve_owner(&cfg, owner)?;
            let start = commands::parse_cli_datetime(&start, &cfg.default_timezone)?;
            commands::add::event(&database, &owner, &calendar, &name, start, rrule.as_deref())
        }
        Commands::AddVariation {
            rrule,
            calendar,
            event,
            name,
            owner,
        } => {
            let owner = commands::resolve_owner(&cfg, owner)?;
            commands::add::variation(&database, &owner, &calendar, &event, name.as_deref(), &rrule)
        }
        Commands::Occurrences {
            calendar,
            event,
            from,
            within,
            owner,
        } => {
            let owner = commands::resolve_owner(&cfg, owner)?;
            let from = match from {
                Some(from) => commands::parse_cli_datetime(&from, &cfg.default_timezone)?,
                None => chrono::Utc::now(),
            };
            let within = commands::parse_window(&within)?;
            commands::occurrences::run(&database, &owner, &calendar, &event, from, within)
        }
        Commands::Config => commands::config::run(&cfg, &database),
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}
