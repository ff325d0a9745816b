//! Strata CLI
//!
//! Command-line tools for the strata table client.
//!
//! # Commands
//!
//! - `backoff` - Print the delay schedule a retry policy would produce
//! - `uri` - Merge query parameters into a URI
//! - `simulate` - Run a paged query against an in-process service with injected faults

mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;
use strata_client::{ExponentialRetry, RetryPolicy};
use strata_protocol::{LocationMode, PayloadFormat, StorageLocation};
use tracing_subscriber::EnvFilter;

/// Strata table client tools.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Retry policy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    /// Single attempt
    None,
    /// Fixed delay
    Linear,
    /// Exponential delay with jitter
    Exponential,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON
    Json,
}

/// Retry policy parameters shared by commands.
#[derive(Debug, Clone, Args)]
pub struct PolicyArgs {
    /// Retry policy
    #[arg(long, value_enum, default_value = "exponential")]
    policy: PolicyKind,

    /// Total attempts, the first one included
    #[arg(long, default_value = "4")]
    attempts: u32,

    /// Base delay in milliseconds
    #[arg(long, default_value = "4000")]
    delta_ms: u64,

    /// Delay cap in milliseconds (exponential only)
    #[arg(long, default_value = "90000")]
    max_ms: u64,
}

impl PolicyArgs {
    /// Builds the retry policy.
    pub fn policy(&self) -> RetryPolicy {
        let delta = Duration::from_millis(self.delta_ms);
        match self.policy {
            PolicyKind::None => RetryPolicy::NoRetry,
            PolicyKind::Linear => RetryPolicy::linear(self.attempts, delta),
            PolicyKind::Exponential => RetryPolicy::Exponential(
                ExponentialRetry::new(self.attempts, delta)
                    .with_max_backoff(Duration::from_millis(self.max_ms)),
            ),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the delay schedule a retry policy would produce
    Backoff {
        #[command(flatten)]
        policy: PolicyArgs,

        /// Location mode used to pick replicas
        #[arg(long, default_value = "primary-only")]
        mode: LocationMode,

        /// Client request id seeding the jitter
        #[arg(long, default_value = "strata-cli")]
        request_id: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Merge query parameters into a URI
    Uri {
        /// Base URI
        base: String,

        /// Parameter as name=value, or a bare name
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Run a paged query against an in-process service with injected faults
    Simulate {
        #[command(flatten)]
        policy: PolicyArgs,

        /// Rows to seed, in partitions of 100
        #[arg(long, default_value = "1500")]
        rows: usize,

        /// Take count
        #[arg(long)]
        take: Option<i64>,

        /// Faults for the first requests: a status code, `network` or `hang`
        #[arg(long, value_delimiter = ',')]
        fail: Vec<String>,

        /// Replica held in a 503 outage
        #[arg(long)]
        outage: Option<StorageLocation>,

        /// Location mode
        #[arg(long, default_value = "primary-only")]
        mode: LocationMode,

        /// Payload format
        #[arg(long, default_value = "json")]
        payload: PayloadFormat,

        /// Per-attempt timeout in milliseconds
        #[arg(long, default_value = "2000")]
        attempt_timeout_ms: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Backoff {
            policy,
            mode,
            request_id,
            format,
        } => {
            commands::backoff::run(&policy.policy(), policy.attempts, mode, &request_id, format)?;
        }
        Commands::Uri { base, params } => {
            commands::uri::run(&base, &params)?;
        }
        Commands::Simulate {
            policy,
            rows,
            take,
            fail,
            outage,
            mode,
            payload,
            attempt_timeout_ms,
            format,
        } => {
            let settings = commands::simulate::Settings {
                policy: policy.policy(),
                rows,
                take,
                faults: commands::simulate::parse_faults(&fail)?,
                outage,
                mode,
                payload,
                attempt_timeout: Duration::from_millis(attempt_timeout_ms),
            };
            commands::simulate::run(settings, format)?;
        }
        Commands::Version => {
            println!("Strata CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Service version {}", strata_protocol::SERVICE_VERSION);
        }
    }

    Ok(())
}
