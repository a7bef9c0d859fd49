//! Error types for app-monitor.

use std::fmt;

/// Result type alias for app-monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while monitoring applications.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Failed to load monitor configuration from a source.
    #[error("Failed to load monitor configuration: {0}")]
    LoadError(String),

    /// Failed to deserialize monitor configuration.
    #[error("Failed to deserialize monitor configuration: {0}")]
    DeserializationError(String),

    /// Monitor configuration validation failed.
    #[error("Monitor configuration validation failed: {0}")]
    ValidationError(String),

    /// A path could not be bound to the notification mechanism.
    #[error("Failed to watch {path}: {reason}")]
    WatchError {
        /// The path that was being watched
        path: String,
        /// Why the binding failed
        reason: String,
    },

    /// The notification mechanism does not know the given watch.
    #[error("Unknown watch id: {0}")]
    UnknownWatch(u64),

    /// The configuration-record store rejected an operation.
    #[error("Record store error: {0}")]
    StoreError(String),

    /// Error raised by the underlying file watcher.
    #[cfg(feature = "file-watch")]
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("Monitor error: {0}")]
    Other(String),
}

impl MonitorError {
    /// Create a watch error for `path`.
    pub fn watch(path: impl AsRef<std::path::Path>, reason: impl Into<String>) -> Self {
        Self::WatchError {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }
}

/// Validation error for monitor configuration.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for MonitorError {
    fn from(err: ValidationError) -> Self {
        MonitorError::ValidationError(err.to_string())
    }
}
