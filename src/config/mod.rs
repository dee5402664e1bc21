//! Configuration system
//!
//! Loads ~/.config/msgpass/config.yaml with support for:
//! - Mailbox sizing (address count, message capacity)
//! - The stress demo workload

mod msgpass_config;
pub mod validation;

pub use msgpass_config::{MailConfig, MsgPassConfig, StressConfig};
pub use validation::{validate_config, validate_config_result, ValidationError};
