//! Unified error handling for the trajectory-stats library.
//!
//! This module provides a consistent error type for all analytics operations.
//! Failures here are configuration or programming defects, never transient
//! conditions: the engine operates on already-validated in-memory data, so
//! there is nothing to retry.

use std::fmt;

/// Unified error type for trajectory analytics operations.
#[derive(Debug, Clone)]
pub enum AnalyticsError {
    /// A partition, ordering or aggregation key names a field absent from
    /// the row schema. Raised while building a spec, before any data is
    /// processed.
    InvalidPartitionKey {
        field: String,
        row_type: &'static str,
    },
    /// Configuration error (e.g. inverted geofence bounds)
    ConfigError { message: String },
    /// Generic internal error
    Internal { message: String },
}

impl fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyticsError::InvalidPartitionKey { field, row_type } => {
                write!(f, "Unknown field '{}' for row type {}", field, row_type)
            }
            AnalyticsError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            AnalyticsError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for AnalyticsError {}

/// Result type alias for trajectory analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Extension trait for converting Option to AnalyticsError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AnalyticsError::Internal {
            message: message.to_string(),
        })
    }
}
