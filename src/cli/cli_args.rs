use clap::{Parser, Subcommand, ValueEnum};

/// Querygate CLI - dispatch time-series query batches to data source plugins
#[derive(Parser, Debug)]
#[command(name = "querygate")]
#[command(about = "Time-series query dispatch for expression and plugin backed data sources")]
#[command(version = "0.1.0")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a query batch
    Query {
        /// Service configuration file
        #[arg(short, long)]
        config: String,

        /// Batch file (JSON), or `-` for stdin
        #[arg(short, long, default_value = "-")]
        batch: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Send expression batches to the plugin path as-is
        #[arg(long)]
        no_expressions: bool,

        /// Bypass the data source cache
        #[arg(long)]
        skip_cache: bool,

        /// Organisation to run as
        #[arg(long, default_value_t = 1)]
        org_id: i64,

        /// Login to run as
        #[arg(long, default_value = "admin")]
        login: String,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List configured data sources
    Sources {
        /// Service configuration file
        #[arg(short, long)]
        config: String,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,
    },

    /// Validate a configuration file
    Check {
        /// Service configuration file
        #[arg(short, long)]
        config: String,
    },
}

/// Output format options
#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    /// Formatted table output
    Table,
    /// JSON output
    Json,
    /// CSV output
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
