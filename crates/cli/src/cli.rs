//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Single-node event collector runner
#[derive(Parser, Debug)]
#[command(
    name = "cdc-collector",
    author,
    version,
    about = "Run or validate a change-data-capture event collector node",
    long_about = "Runs an event collector on an in-process message center.\n\n\
                  Table dispatchers are registered with a built-in demo event \n\
                  service that streams synthetic transactions, and every \n\
                  dispatcher is drained into a log sink."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CDC_COLLECTOR_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (overrides the configuration file)
    #[arg(long, value_enum, global = true, env = "CDC_COLLECTOR_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log filter implied by `-v` / `-q`, if any
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("warn");
        }
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the collector until Ctrl+C or the timeout
    Run(RunArgs),

    /// Validate a configuration file without running
    Validate(ValidateArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "node.toml", env = "CDC_COLLECTOR_CONFIG")]
    pub config: PathBuf,

    /// Number of table dispatchers to register
    #[arg(long, default_value = "2")]
    pub tables: u32,

    /// Also register a table-trigger dispatcher
    #[arg(long)]
    pub with_trigger: bool,

    /// Interval between demo feeds per dispatcher, in milliseconds
    #[arg(long, default_value = "200")]
    pub feed_interval_ms: u64,

    /// Run time in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "CDC_COLLECTOR_TIMEOUT")]
    pub timeout: u64,

    /// Override the Prometheus port from configuration (0 = disabled)
    #[arg(long, env = "CDC_COLLECTOR_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "node.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "cdc-collector",
            "-v",
            "run",
            "--config",
            "n1.toml",
            "--tables",
            "4",
            "--with-trigger",
        ])
        .unwrap();
        assert_eq!(cli.log_level_override(), Some("debug"));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("n1.toml"));
                assert_eq!(args.tables, 4);
                assert!(args.with_trigger);
                assert_eq!(args.timeout, 0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["cdc-collector", "-q", "-v", "validate"]).is_err());
        let cli = Cli::try_parse_from(["cdc-collector", "-q", "validate"]).unwrap();
        assert_eq!(cli.log_level_override(), Some("warn"));
    }
}
