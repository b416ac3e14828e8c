//! Unified error system for Armada
//!
//! A single error enum shared by the registry, the campaign runner, and the
//! upgrade coordinator. Errors are never retried inside the library; they
//! bubble up to the entry point which logs them and exits non-zero.

use serde::{Deserialize, Serialize};

/// Unified error type for all Armada operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ArmadaError {
    /// Store or chain unreachable at initialization
    #[error("Connection failed: {message}")]
    Connection {
        /// What could not be reached
        message: String,
    },

    /// Requested contract or version is absent
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up
        message: String,
    },

    /// Persisted or on-chain state disagrees with what an operation requires
    #[error("Consistency failure: {message}")]
    Consistency {
        /// Description of the disagreement
        message: String,
    },

    /// A multi-write sequence failed after some of its writes were applied
    #[error("Partial write after {applied} of {total} writes: {message}")]
    PartialWrite {
        /// Writes applied before the failure
        applied: usize,
        /// Writes in the sequence
        total: usize,
        /// Underlying failure
        message: String,
    },

    /// Storage backend operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message from the backend
        message: String,
    },

    /// Chain collaborator call failed
    #[error("Chain error: {message}")]
    Chain {
        /// Error message from the chain layer
        message: String,
    },

    /// Invalid input
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration problem
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl ArmadaError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Create a partial write error
    pub fn partial_write(applied: usize, total: usize, message: impl Into<String>) -> Self {
        Self::PartialWrite {
            applied,
            total,
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a chain error
    pub fn chain(message: impl Into<String>) -> Self {
        Self::Chain {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error means a lookup found nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Standard Result type for Armada operations
pub type Result<T> = std::result::Result<T, ArmadaError>;

impl From<serde_json::Error> for ArmadaError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ArmadaError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<std::io::Error> for ArmadaError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::storage(err.to_string()),
        }
    }
}
