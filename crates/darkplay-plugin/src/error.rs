//! Plugin runtime error types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure while turning a file on disk into a plugin instance.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to open {}: {reason}", path.display())]
    OpenFailed { path: PathBuf, reason: String },

    #[error("{} does not export `{symbol}`", path.display())]
    NoEntryPoint { path: PathBuf, symbol: String },

    #[error("invalid plugin interface in {}: {reason}", path.display())]
    InvalidInterface { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("validation failed: {0}")]
    ValidationFailure(String),

    #[error("plugin already loaded: {0}")]
    DuplicateName(String),

    #[error("plugin {name} failed to initialize: {reason}")]
    InitializationFailure { name: String, reason: String },

    #[error("shutdown error in plugin {name}: {reason}")]
    ShutdownError { name: String, reason: String },

    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("plugins directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Serializable classification carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    OpenFailed,
    NoEntryPoint,
    InvalidInterface,
    ValidationFailure,
    DuplicateName,
    InitializationFailure,
    ShutdownError,
    NotFound,
    DirectoryNotFound,
    Io,
    Config,
    /// Raised by the plugin itself through its signal handle.
    PluginReported,
}

impl PluginError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PluginError::Load(LoadError::OpenFailed { .. }) => ErrorKind::OpenFailed,
            PluginError::Load(LoadError::NoEntryPoint { .. }) => ErrorKind::NoEntryPoint,
            PluginError::Load(LoadError::InvalidInterface { .. }) => ErrorKind::InvalidInterface,
            PluginError::ValidationFailure(_) => ErrorKind::ValidationFailure,
            PluginError::DuplicateName(_) => ErrorKind::DuplicateName,
            PluginError::InitializationFailure { .. } => ErrorKind::InitializationFailure,
            PluginError::ShutdownError { .. } => ErrorKind::ShutdownError,
            PluginError::NotFound(_) => ErrorKind::NotFound,
            PluginError::DirectoryNotFound(_) => ErrorKind::DirectoryNotFound,
            PluginError::Io(_) => ErrorKind::Io,
            PluginError::Config(_) | PluginError::TomlParse(_) => ErrorKind::Config,
        }
    }
}
