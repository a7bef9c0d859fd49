//! Configuration validation support.

use crate::core::{MonitorConfig, MonitorConfigUpdate};
use crate::error::ValidationError;
use std::time::Duration;

/// Trait for configuration validation.
///
/// Implemented by the monitor's configuration types and checked before an
/// update is applied.
///
/// # Examples
///
/// ```rust
/// use app_monitor::core::{MonitorConfigUpdate, Validate};
/// use std::time::Duration;
///
/// let update = MonitorConfigUpdate::new().with_polling_rate(Duration::ZERO);
/// assert!(update.validate().is_err());
/// ```
pub trait Validate {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}

fn check_polling_rate(rate: Duration) -> Option<ValidationError> {
    rate.is_zero()
        .then(|| ValidationError::invalid_field("pollingRate", "must be greater than 0"))
}

fn check_location(location: &str) -> Option<ValidationError> {
    location
        .trim()
        .is_empty()
        .then(|| ValidationError::invalid_field("dropins", "must not be empty"))
}

fn collect(mut errors: Vec<ValidationError>) -> Result<(), ValidationError> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

impl Validate for MonitorConfigUpdate {
    fn validate(&self) -> Result<(), ValidationError> {
        let errors = [
            self.polling_rate.and_then(check_polling_rate),
            self.dropins_location.as_deref().and_then(check_location),
        ];
        collect(errors.into_iter().flatten().collect())
    }
}

impl Validate for MonitorConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let errors = [
            check_polling_rate(self.polling_rate),
            check_location(&self.dropins_location),
        ];
        collect(errors.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_update_is_valid() {
        assert!(MonitorConfigUpdate::new().validate().is_ok());
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_single_error() {
        let update = MonitorConfigUpdate::new().with_dropins_location("  ");
        assert!(matches!(
            update.validate(),
            Err(ValidationError::InvalidField { ref field, .. }) if field == "dropins"
        ));
    }

    #[test]
    fn test_multiple_errors() {
        let config = MonitorConfig {
            polling_rate: Duration::ZERO,
            dropins_location: String::new(),
            ..MonitorConfig::default()
        };
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected two errors, got {other:?}"),
        }
    }
}
