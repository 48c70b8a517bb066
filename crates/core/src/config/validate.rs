use super::{types::Config, ConfigError};
use crate::provider::{SortField, SortPreference, KNOWN_PROVIDERS};

/// Validate configuration
/// Currently validates:
/// - Enabled providers are known
/// - Timeouts are not 0
/// - Debrid batch size is within 1..=100
/// - Debrid retry attempts are within 1..=10
/// - Sort fields and preference are recognised
/// - Duplicate threshold lies within [0, 1]
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    for name in &config.providers.enabled {
        if !KNOWN_PROVIDERS.contains(&name.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "providers.enabled: unknown provider '{}'",
                name
            )));
        }
    }

    if config.providers.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "providers.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.debrid.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "debrid.timeout_secs cannot be 0".to_string(),
        ));
    }

    if !(1..=100).contains(&config.debrid.batch_size) {
        return Err(ConfigError::ValidationError(format!(
            "debrid.batch_size must be between 1 and 100, got {}",
            config.debrid.batch_size
        )));
    }

    if !(1..=10).contains(&config.debrid.max_retries) {
        return Err(ConfigError::ValidationError(format!(
            "debrid.max_retries must be between 1 and 10, got {}",
            config.debrid.max_retries
        )));
    }

    for field in config.selection.sort_order.split(',') {
        let field = field.trim();
        if !field.is_empty() && field.parse::<SortField>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "selection.sort_order: unknown field '{}'",
                field
            )));
        }
    }

    if config.selection.sort_prefer.parse::<SortPreference>().is_err() {
        return Err(ConfigError::ValidationError(format!(
            "selection.sort_prefer: unknown preference '{}'",
            config.selection.sort_prefer
        )));
    }

    let threshold = config.selection.duplicate_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::ValidationError(format!(
            "selection.duplicate_threshold must be within [0, 1], got {}",
            threshold
        )));
    }

    if config.scanner.enabled && config.scanner.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "scanner.interval_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
