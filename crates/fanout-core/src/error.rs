//! Error types for Fanout

use std::path::PathBuf;
use thiserror::Error;

use crate::project::TargetId;

/// Result type alias using FanoutError
pub type Result<T> = std::result::Result<T, FanoutError>;

/// Main error type for Fanout operations
#[derive(Debug, Error)]
pub enum FanoutError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Dependency-graph errors
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Fingerprint-store errors
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// A subproject was declared more than once
    #[error("Subproject declared twice: {0}")]
    DuplicateProject(TargetId),

    /// A declared dependency names no known subproject
    #[error("Subproject '{project}' depends on unknown subproject '{dependency}'")]
    UnknownDependency { project: TargetId, dependency: String },

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Dependency-graph errors
#[derive(Debug, Error)]
pub enum GraphError {
    /// Circular dependency among subprojects
    #[error("Circular dependency detected among subprojects: {0}")]
    CyclicDependency(String),

    /// A name matched no candidate target
    #[error("No subproject matches '{0}'")]
    UnresolvedTarget(String),

    /// A bare name matched more than one candidate target
    #[error("'{name}' is ambiguous; candidates: {candidates}")]
    AmbiguousTarget { name: String, candidates: String },
}

/// Fingerprint-store errors
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// IO error
    #[error("Fingerprint IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Fingerprint serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FanoutError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}
