//! Domain-level error taxonomy for unitforge.

use std::path::PathBuf;

/// unitforge domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("no eligible source files found under {0}")]
    NoSourcesFound(PathBuf),

    #[error("no test artifacts could be generated ({attempted} source units attempted)")]
    NoArtifactsGenerated { attempted: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("toolchain error: {0}")]
    Toolchain(String),

    #[error("oracle error: {0}")]
    Oracle(#[from] crate::oracle::OracleError),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("unexpected pipeline failure: {0}")]
    Unexpected(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for unitforge domain operations.
pub type Result<T> = std::result::Result<T, ForgeError>;
