//! Error types for schedlet

use thiserror::Error;

/// Main error type for the scheduler extensions
#[derive(Error, Debug)]
pub enum SchedletError {
    /// Node capacity does not match a supported card topology
    #[error("Invalid device topology: {0}")]
    InvalidTopology(String),

    /// Requested core count matches neither shared nor exclusive granularity
    #[error("Device request not legal: {0}")]
    RequestNotLegal(String),

    /// No combination of cards satisfies the demand
    #[error("Insufficient capacity: {0}")]
    InsufficientCapacity(String),

    /// Cluster node lock denied
    #[error("Node lock unavailable: {0}")]
    LockUnavailable(String),

    /// Writing workload-unit metadata failed
    #[error("Metadata persist failed: {0}")]
    MetadataPersist(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for schedlet operations
pub type SchedletResult<T> = Result<T, SchedletError>;

impl From<serde_json::Error> for SchedletError {
    fn from(err: serde_json::Error) -> Self {
        SchedletError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SchedletError {
    fn from(err: serde_yaml::Error) -> Self {
        SchedletError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedletError::RequestNotLegal("5 cores".to_string());
        assert_eq!(err.to_string(), "Device request not legal: 5 cores");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<Vec<u32>>("not json").unwrap_err();
        let err: SchedletError = json_err.into();
        assert!(matches!(err, SchedletError::Serialization(_)));
    }
}
