use crate::config::types::{Config, EventsConfig, JobConfig, OutputConfig, PacingConfig, StorageConfig};
use crate::ConfigError;

/// Longest poll interval that still makes pause/stop feel immediate
const MAX_POLL_INTERVAL_MS: u64 = 100;

/// Upper bound on snapshot write attempts
const MAX_WRITE_ATTEMPTS: u32 = 50;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_job_config(&config.job)?;
    validate_output_config(&config.output)?;
    validate_pacing_config(&config.pacing)?;
    validate_storage_config(&config.storage)?;
    validate_events_config(&config.events)?;
    Ok(())
}

/// Validates job configuration
fn validate_job_config(config: &JobConfig) -> Result<(), ConfigError> {
    if config.name.trim().is_empty() {
        return Err(ConfigError::Validation("job name cannot be empty".to_string()));
    }

    if config.identity_fields.is_empty() {
        return Err(ConfigError::Validation(
            "identity_fields must name at least one field".to_string(),
        ));
    }

    if let Some(blank) = config.identity_fields.iter().find(|f| f.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "identity_fields contains a blank field name: '{}'",
            blank
        )));
    }

    if config.expected_items_per_page < 1 {
        return Err(ConfigError::Validation(format!(
            "expected_items_per_page must be >= 1, got {}",
            config.expected_items_per_page
        )));
    }

    if config.assumed_total_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "assumed_total_pages must be >= 1, got {}",
            config.assumed_total_pages
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.export_path, Some(p) if p.is_empty()) {
        return Err(ConfigError::Validation(
            "export_path cannot be empty when set".to_string(),
        ));
    }

    if config.export_path() == std::path::Path::new(&config.database_path) {
        return Err(ConfigError::Validation(format!(
            "export_path must differ from database_path '{}'",
            config.database_path
        )));
    }

    Ok(())
}

/// Validates pacing configuration
fn validate_pacing_config(config: &PacingConfig) -> Result<(), ConfigError> {
    validate_delay_range("item_delay_ms", config.item_delay_ms)?;
    validate_delay_range("page_delay_ms", config.page_delay_ms)?;

    if config.poll_interval_ms < 1 || config.poll_interval_ms > MAX_POLL_INTERVAL_MS {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be between 1 and {}, got {}",
            MAX_POLL_INTERVAL_MS, config.poll_interval_ms
        )));
    }

    Ok(())
}

/// Validates a `[min, max]` delay pair
fn validate_delay_range(name: &str, range: [u64; 2]) -> Result<(), ConfigError> {
    let [min, max] = range;
    if min > max {
        return Err(ConfigError::Validation(format!(
            "{} minimum ({}ms) exceeds maximum ({}ms)",
            name, min, max
        )));
    }
    Ok(())
}

/// Validates storage retry configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.write_attempts < 1 || config.write_attempts > MAX_WRITE_ATTEMPTS {
        return Err(ConfigError::Validation(format!(
            "write_attempts must be between 1 and {}, got {}",
            MAX_WRITE_ATTEMPTS, config.write_attempts
        )));
    }
    Ok(())
}

/// Validates event delivery configuration
fn validate_events_config(config: &EventsConfig) -> Result<(), ConfigError> {
    if config.capacity < 1 {
        return Err(ConfigError::Validation(
            "event capacity must be >= 1".to_string(),
        ));
    }
    Ok(())
}
