//! Error types for the localizer

use crate::lifecycle::State;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while configuring or running the localizer
#[derive(Debug, Error)]
pub enum LocalizationError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("failed to read config {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid map: {0}")]
    InvalidMap(String),

    #[error("lifecycle transition {from:?} -> {to:?} is not allowed")]
    InvalidTransition { from: State, to: State },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("localization worker failed: {0}")]
    WorkerFailed(String),
}

impl LocalizationError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        LocalizationError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, LocalizationError>;
