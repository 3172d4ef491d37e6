//! Error types for the Asgard Mail sync core

use std::path::PathBuf;

/// Result type alias for sync core operations
pub type AsgardResult<T> = Result<T, AsgardError>;

/// Main error type for the sync core
#[derive(Debug, thiserror::Error)]
pub enum AsgardError {
    /// A remote mail-store call failed (network, authentication, protocol)
    #[error("Remote access error: {0}")]
    Access(String),

    /// A tree operation violated the tree's structural contract
    #[error("Structural conflict: {0}")]
    StructuralConflict(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stop request was observed at a cooperative checkpoint
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to create configuration directory
    #[error("Failed to create configuration directory: {0}")]
    ConfigDirCreateFailed(PathBuf),

    /// Invalid state errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl AsgardError {
    /// Create a new remote access error
    pub fn access(msg: impl Into<String>) -> Self {
        Self::Access(msg.into())
    }

    /// Create a new structural conflict error
    pub fn structural_conflict(msg: impl Into<String>) -> Self {
        Self::StructuralConflict(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Check if this error came from the remote mail store
    pub fn is_access_error(&self) -> bool {
        matches!(self, Self::Access(_))
    }

    /// Check if this is a stop request rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if retrying on the next cycle can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Access(_) | Self::Io(_))
    }
}
