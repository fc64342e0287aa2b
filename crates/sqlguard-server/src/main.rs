//! SQLGuard - security administration tool.

use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlguard_core::audit::get_events_filtered;
use sqlguard_core::auth::{hash_password, DEFAULT_BCRYPT_COST};
use sqlguard_core::{AuditEventType, AuditFilter, AuditResult};
use sqlguard_server::ConfigArgs;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(name = "sqlguard")]
#[command(version, about = "SQLGuard security administration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a bcrypt hash for a password.
    HashPassword {
        /// Password to hash.
        password: String,

        /// bcrypt work factor.
        #[arg(long, default_value_t = DEFAULT_BCRYPT_COST)]
        cost: u32,
    },

    /// Print audit log lines matching a time range and filters.
    AuditScan {
        /// JSON-lines audit log.
        path: PathBuf,

        /// Range start (RFC 3339). Defaults to the beginning of time.
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Range end (RFC 3339). Defaults to the end of time.
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        /// Only this user.
        #[arg(long)]
        username: Option<String>,

        /// Only this event type (e.g. AUTHENTICATION, DDL).
        #[arg(long = "type")]
        event_type: Option<AuditEventType>,

        /// Only this result (SUCCESS, FAILURE, DENIED).
        #[arg(long)]
        result: Option<AuditResult>,
    },

    /// Load configuration, apply overrides, and print the effective settings.
    CheckConfig(ConfigArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlguard=info,sqlguard_core=info,sqlguard_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::HashPassword { password, cost } => {
            let hash = hash_password(&password, cost)?;
            println!("{}", hash);
        }
        Command::AuditScan {
            path,
            start,
            end,
            username,
            event_type,
            result,
        } => {
            let filter = AuditFilter {
                username,
                event_type,
                result,
            };
            let start = start.unwrap_or(DateTime::<Utc>::MIN_UTC);
            let end = end.unwrap_or(DateTime::<Utc>::MAX_UTC);

            tracing::info!(path = %path.display(), %start, %end, "scanning audit log");
            let events = get_events_filtered(&path, start, end, &filter)?;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for event in &events {
                writeln!(out, "{}", event.to_json_line()?)?;
            }
            tracing::info!(matched = events.len(), "scan complete");
        }
        Command::CheckConfig(args) => {
            let config = args.into_config()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
