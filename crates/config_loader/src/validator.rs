//! Configuration validation
//!
//! Rules:
//! - server_id is not blank
//! - global_memory_quota > 0
//! - dispatcher_memory_quota in (0, global_memory_quota]
//! - sync-point interval > 0 when enabled
//! - log_level is not blank

use contracts::ContractError;

use crate::NodeConfig;

/// Validate a node configuration.
///
/// Returns the first error encountered.
pub fn validate(config: &NodeConfig) -> Result<(), ContractError> {
    validate_server_id(config)?;
    validate_memory_quotas(config)?;
    validate_sync_point(config)?;
    validate_observability(config)?;
    Ok(())
}

fn validate_server_id(config: &NodeConfig) -> Result<(), ContractError> {
    if config.server_id.trim().is_empty() {
        return Err(ContractError::config_validation(
            "server_id",
            "server_id cannot be empty",
        ));
    }
    Ok(())
}

fn validate_memory_quotas(config: &NodeConfig) -> Result<(), ContractError> {
    let collector = &config.collector;

    if collector.global_memory_quota == 0 {
        return Err(ContractError::config_validation(
            "collector.global_memory_quota",
            "global_memory_quota must be > 0",
        ));
    }

    if let Some(quota) = collector.dispatcher_memory_quota {
        if quota == 0 || quota > collector.global_memory_quota {
            return Err(ContractError::config_validation(
                "collector.dispatcher_memory_quota",
                format!(
                    "dispatcher_memory_quota ({quota}) must be > 0 and <= global_memory_quota ({})",
                    collector.global_memory_quota
                ),
            ));
        }
    }

    Ok(())
}

fn validate_sync_point(config: &NodeConfig) -> Result<(), ContractError> {
    if config.sync_point.enabled && config.sync_point.interval_secs == 0 {
        return Err(ContractError::config_validation(
            "sync_point.interval_secs",
            "interval_secs must be > 0 when sync points are enabled",
        ));
    }
    Ok(())
}

fn validate_observability(config: &NodeConfig) -> Result<(), ContractError> {
    if config.observability.log_level.trim().is_empty() {
        return Err(ContractError::config_validation(
            "observability.log_level",
            "log_level cannot be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> NodeConfig {
        NodeConfig::new("n1")
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn test_blank_server_id() {
        let config = NodeConfig::new("  ");
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("server_id cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_zero_global_quota() {
        let mut config = minimal_config();
        config.collector.global_memory_quota = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("global_memory_quota must be > 0"), "got: {err}");
    }

    #[test]
    fn test_dispatcher_quota_above_global() {
        let mut config = minimal_config();
        config.collector.global_memory_quota = 100;
        config.collector.dispatcher_memory_quota = Some(101);
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("dispatcher_memory_quota"), "got: {err}");

        config.collector.dispatcher_memory_quota = Some(100);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_interval_only_matters_when_enabled() {
        let mut config = minimal_config();
        config.sync_point.interval_secs = 0;
        assert!(validate(&config).is_ok());

        config.sync_point.enabled = true;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("interval_secs"), "got: {err}");
    }

    #[test]
    fn test_blank_log_level() {
        let mut config = minimal_config();
        config.observability.log_level = String::new();
        assert!(matches!(
            validate(&config),
            Err(ContractError::ConfigValidation { .. })
        ));
    }
}
