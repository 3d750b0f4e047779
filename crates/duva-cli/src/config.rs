use clap::{Parser, Subcommand};

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "duva")]
#[command(author, version, about = "Operator tools for the duva sync service")]
#[command(after_help = "Examples:
  duva gen-key
  duva migrate
  duva worker --batch-size 8
  duva sync 42
  duva schedule-all")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Base64 encoded 32 byte key used to decrypt stored secrets
    #[arg(long, env = "DUVA_SECRET_KEY", hide_env_values = true, global = true)]
    pub secret_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the scheduler worker until Ctrl+C
    Worker {
        /// Identifier shown in logs, random when omitted
        #[arg(long)]
        worker_id: Option<String>,
        /// Seconds between polls when no job is due
        #[arg(long, default_value = "5")]
        poll_interval_secs: u64,
        /// Maximum jobs claimed and run concurrently
        #[arg(long, default_value = "4")]
        batch_size: u32,
        /// Skip scheduling active files that have no job
        #[arg(long)]
        no_schedule: bool,
    },
    /// Run one sync now, in this process
    #[command(after_help = "Example: duva sync 42")]
    Sync {
        /// Tracked file ID
        file_id: i64,
    },
    /// Register the recurring job of every active file that lacks one
    ScheduleAll,
    /// Apply database migrations
    Migrate,
    /// Print a fresh DUVA_SECRET_KEY
    GenKey,
}

impl Command {
    /// Commands that work without a database.
    pub fn is_offline(&self) -> bool {
        matches!(self, Command::GenKey)
    }
}
