use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum HistoryCommands {
    /// Show history summary (default)
    Summary {
        /// Time period: today, week, month, all
        #[arg(short, long, default_value = "week")]
        period: String,
    },

    /// List battery samples
    Battery {
        /// Time period: today, week, month, all
        #[arg(short, long, default_value = "today")]
        period: String,

        /// Show only the most recent N samples
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List suspend, hibernate and shutdown intervals
    Events {
        /// Time period: today, week, month, all
        #[arg(short, long, default_value = "week")]
        period: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Prune old data
    Prune {
        /// Delete data older than N days (defaults to the configured retention)
        #[arg(long)]
        older_than: Option<u64>,

        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
}
