//! Command-line front end for the debitor core.
//!
//! # Responsibility
//! - Resolve settings, start logging, and wire guard + repository.
//! - Map one subcommand onto one repository operation.
//! - Surface the one-time "store unreachable" notice.

use clap::{Args, Parser, Subcommand};
use debitor_core::{
    create_database, default_log_level, init_logging, init_stderr_logging, is_valid_email,
    parse_debitor_id, AppSettings, Debitor, DebitorId, DebitorRepository,
    SqliteDebitorRepository, SqliteDriver, SqliteGuard,
};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Console level when no log directory is configured.
const STDERR_LOG_LEVEL: &str = "warn";

#[derive(Debug, Parser)]
#[command(name = "debitor", version, about = "Debitor master data access")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// JSON settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite path or `file:` URI; overrides settings.
    #[arg(long, global = true, env = "DEBITOR_CONNECTION_STRING")]
    db: Option<String>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Absolute directory for rolling log files.
    #[arg(long, global = true)]
    log_dir: Option<String>,
    /// Print records as JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database file and the debitors table if missing.
    Init,
    /// List all debitors ordered by name.
    List,
    /// Show one debitor.
    Get {
        #[arg(allow_negative_numbers = true, value_parser = parse_id)]
        id: DebitorId,
    },
    /// Insert a new debitor.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Filter debitors by name or email (case-insensitive).
    Search {
        #[arg(default_value = "")]
        term: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    let settings = match &cli.global.config {
        Some(path) => AppSettings::load(path).map_err(|err| err.to_string())?,
        None => AppSettings::default(),
    };

    let level = cli.global.log_level.clone().or(settings.logging.level.clone());
    match cli.global.log_dir.clone().or(settings.logging.dir.clone()) {
        Some(log_dir) => {
            let level = level.unwrap_or_else(|| default_log_level().to_string());
            init_logging(&level, &log_dir)?;
        }
        None => init_stderr_logging(level.as_deref().unwrap_or(STDERR_LOG_LEVEL))?,
    }

    let connection_string = cli
        .global
        .db
        .clone()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| settings.connection_string());

    info!("event=cli_command module=cli status=start command={:?}", cli.command);

    let guard = Arc::new(SqliteGuard::new(SqliteDriver::new()));
    let repo = SqliteDebitorRepository::try_new(connection_string, Arc::clone(&guard))
        .map_err(|err| err.to_string())?;

    let result = execute(&repo, cli.command, cli.global.json);

    if guard.take_unreachable_notice() {
        eprintln!("notice: the debitor database cannot be reached; further access is disabled");
    }

    result
}

fn execute(
    repo: &SqliteDebitorRepository,
    command: Command,
    json: bool,
) -> Result<ExitCode, String> {
    match command {
        Command::Init => {
            create_database(repo.connection_string()).map_err(|err| err.to_string())?;
            println!("initialized {}", repo.connection_string());
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            let debitors = repo.get_all().map_err(|err| err.to_string())?;
            print_debitors(&debitors, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Get { id } => match repo.get_by_id(id).map_err(|err| err.to_string())? {
            Some(debitor) => {
                print_debitors(std::slice::from_ref(&debitor), json)?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("debitor {id} not found");
                Ok(ExitCode::from(2))
            }
        },
        Command::Create { name, email } => {
            let mut debitor = Debitor::new(name);
            if let Some(email) = email.filter(|value| !value.is_empty()) {
                if !is_valid_email(&email) {
                    return Err(format!("invalid email address `{email}`"));
                }
                debitor = debitor.with_email(email);
            }

            if repo.create(Some(&debitor)).map_err(|err| err.to_string())? {
                println!("created debitor `{}`", debitor.name);
                Ok(ExitCode::SUCCESS)
            } else {
                Err(format!("debitor `{}` was not stored", debitor.name))
            }
        }
        Command::Search { term } => {
            let found = repo.search_and_filter(&term);
            print_debitors(&found, json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn parse_id(value: &str) -> Result<DebitorId, String> {
    parse_debitor_id(value).map_err(|err| err.to_string())
}

fn print_debitors(debitors: &[Debitor], json: bool) -> Result<(), String> {
    if json {
        let rendered = serde_json::to_string_pretty(debitors).map_err(|err| err.to_string())?;
        println!("{rendered}");
        return Ok(());
    }

    for debitor in debitors {
        match debitor.email() {
            Some(email) => println!("{:>6}  {}  <{}>", debitor.id, debitor.name, email),
            None => println!("{:>6}  {}", debitor.id, debitor.name),
        }
    }
    Ok(())
}
