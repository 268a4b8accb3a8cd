//! Lumen Control - drive the reward engine against a SQLite database
//!
//! Prints JSON on stdout, logs on stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use lumenctl::commands::{self, Context};
use lumenctl::LOG_ENV_VAR;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumenctl")]
#[command(about = "Lumen rewards - XP, streaks and levels", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = "lumen-rewards.db")]
    db: PathBuf,

    /// Rewards config file (defaults to $LUMEN_CONFIG, user, then system config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Create a game profile for a user
    AddUser {
        user: i64,
    },

    /// Trigger one activity event
    Event {
        user: i64,

        /// Event name, e.g. DAILY_LOGIN
        event: String,

        /// Metadata entry (key=value), repeatable
        #[arg(long = "meta")]
        meta: Vec<String>,
    },

    /// Submit a graded assessment
    Assessment {
        user: i64,

        #[arg(long)]
        id: String,

        #[arg(long)]
        correct: u32,

        #[arg(long)]
        total: u32,
    },

    /// Show XP, level and streak
    Profile {
        user: i64,
    },

    /// Show recent activity and streak history
    History {
        user: i64,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Recompute stored levels after changing the level step
    Rederive,

    /// Print the effective configuration as TOML
    Config {
        /// Print shipped defaults instead
        #[arg(long)]
        defaults: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::load(cli.db, cli.config.as_deref())?;

    let output = match cli.command {
        Commands::Init => commands::init(&ctx).await?,
        Commands::AddUser { user } => commands::add_user(&ctx, user).await?,
        Commands::Event { user, event, meta } => commands::event(&ctx, user, &event, &meta).await?,
        Commands::Assessment {
            user,
            id,
            correct,
            total,
        } => commands::assessment(&ctx, user, id, correct, total).await?,
        Commands::Profile { user } => commands::profile(&ctx, user).await?,
        Commands::History { user, limit } => commands::history(&ctx, user, limit).await?,
        Commands::Rederive => commands::rederive(&ctx).await?,
        Commands::Config { defaults } => {
            print!("{}", commands::config(&ctx, defaults)?);
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    if output.get("success") == Some(&serde_json::Value::Bool(false)) {
        std::process::exit(2);
    }
    Ok(())
}
