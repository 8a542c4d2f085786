//! Error classification shared across the crate
//!
//! Module error types implement [`ErrorClassification`] so callers can apply
//! uniform retry and monitoring logic without matching on concrete variants.

use std::fmt;

/// Severity level for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, expected conditions
    Info,
    /// Degraded but operational
    Warning,
    /// Failure requiring attention
    Error,
    /// System integrity at risk
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Check if the failed operation can be retried
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}
