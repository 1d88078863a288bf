//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use config_loader::{ConfigLoader, NodeConfig};
use observability::ObservabilityConfig;

use crate::cli::{Cli, ValidateArgs};

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    server_id: String,
    global_memory_quota: u64,
    dispatcher_memory_quota: Option<u64>,
    sync_point_interval_secs: Option<u64>,
    log_format: String,
    metrics_port: Option<u16>,
}

pub fn run_validate(cli: &Cli, args: &ValidateArgs) -> Result<()> {
    // Logging cannot come from the file under test
    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.map(Into::into).unwrap_or(observability::LogFormat::Compact),
        metrics_port: None,
        default_log_level: cli.log_level_override().unwrap_or("warn").to_string(),
    })?;
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: Vec::new(),
            summary: None,
        };
    }

    match ConfigLoader::load_from_path(&args.config) {
        Ok(config) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&config),
            summary: Some(summarize(&config)),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

fn summarize(config: &NodeConfig) -> ConfigSummary {
    ConfigSummary {
        server_id: config.server_id.to_string(),
        global_memory_quota: config.collector.global_memory_quota,
        dispatcher_memory_quota: config.collector.dispatcher_memory_quota,
        sync_point_interval_secs: config
            .sync_point_config()
            .map(|sp| sp.interval.as_secs()),
        log_format: config.observability.log_format.to_string(),
        metrics_port: config.observability.metrics_port,
    }
}

/// Non-fatal configuration issues
fn collect_warnings(config: &NodeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.collector.dispatcher_memory_quota.is_none() {
        warnings.push(
            "collector.dispatcher_memory_quota is unset - speed-ratio feedback disabled"
                .to_string(),
        );
    }

    if config.observability.metrics_port.is_none() {
        warnings.push("observability.metrics_port is unset - metrics not exported".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Server: {}", summary.server_id);
            println!("  Global memory quota: {} bytes", summary.global_memory_quota);
            match summary.dispatcher_memory_quota {
                Some(quota) => println!("  Dispatcher memory quota: {quota} bytes"),
                None => println!("  Dispatcher memory quota: -"),
            }
            match summary.sync_point_interval_secs {
                Some(secs) => println!("  Sync points: every {secs}s"),
                None => println!("  Sync points: disabled"),
            }
            println!("  Log format: {}", summary.log_format);
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {warning}");
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
    }
}
