//! Error types for the registration registry

use thiserror::Error;

/// Errors that can occur in registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Caller supplied an unusable registration (both identities missing)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Seed list could not be fetched or decoded
    #[error("Seed list error: {0}")]
    Seed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}

impl From<ureq::Error> for RegistryError {
    fn from(err: ureq::Error) -> Self {
        RegistryError::Seed(err.to_string())
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::InvalidArgument("no identity".to_string());
        assert_eq!(err.to_string(), "Invalid argument: no identity");

        let err: RegistryError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, RegistryError::Serialization(_)));
    }
}
