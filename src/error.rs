use std::io;
use thiserror::Error;

/// Custom error type for the HUD core
#[derive(Error, Debug)]
pub enum HudError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Poll failed for module '{id}': {message}")]
    Poll { id: String, message: String },

    #[error("Duplicate module id: {0}")]
    DuplicateModuleId(String),

    #[error("Unknown module id: {0}")]
    UnknownModuleId(String),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("Payload for '{id}' does not fit template '{template}': {reason}")]
    TemplateMismatch {
        id: String,
        template: String,
        reason: String,
    },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for the HUD core
pub type Result<T> = std::result::Result<T, HudError>;

impl HudError {
    /// Create a poll error for a module
    pub fn poll<I: Into<String>, S: Into<String>>(id: I, msg: S) -> Self {
        HudError::Poll {
            id: id.into(),
            message: msg.into(),
        }
    }

    pub fn duplicate_module<S: Into<String>>(id: S) -> Self {
        HudError::DuplicateModuleId(id.into())
    }

    pub fn unknown_module<S: Into<String>>(id: S) -> Self {
        HudError::UnknownModuleId(id.into())
    }

    /// Create a config validation error
    pub fn config_validation<S: Into<String>>(msg: S) -> Self {
        HudError::ConfigValidation(msg.into())
    }

    pub fn template_mismatch<I, T, R>(id: I, template: T, reason: R) -> Self
    where
        I: Into<String>,
        T: Into<String>,
        R: Into<String>,
    {
        HudError::TemplateMismatch {
            id: id.into(),
            template: template.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_setting<S: Into<String>>(msg: S) -> Self {
        HudError::InvalidSetting(msg.into())
    }

    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        HudError::Runtime(msg.into())
    }
}
