//! Error types for msgpass
//!
//! Mailbox operations report [`MailError`] directly; everything around them
//! (configuration, files, serialisation) is folded into [`MsgPassError`].

use crate::mail::{AddressError, MailError};
use thiserror::Error;

/// Result type alias for msgpass operations
pub type Result<T> = std::result::Result<T, MsgPassError>;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum MsgPassError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Mailbox errors
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    /// Address parsing errors
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
