//! Configuration validation
//!
//! Validates msgpass configuration for correctness:
//! - Address count within `1..=256`
//! - Non-zero message capacity
//! - A stress workload with at least one producer and one consumer

use super::msgpass_config::{MailConfig, MsgPassConfig, StressConfig};
use crate::mail::MAX_ADDRESSES;
use crate::MsgPassError;

/// Validation error details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a full msgpass configuration
pub fn validate_config(config: &MsgPassConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if let Err(mut mail_errors) = validate_mail_config(&config.mail) {
        errors.append(&mut mail_errors);
    }
    if let Err(mut stress_errors) = validate_stress_config(&config.stress) {
        errors.append(&mut stress_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate mailbox sizing
pub fn validate_mail_config(config: &MailConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.address_count == 0 || config.address_count > MAX_ADDRESSES {
        errors.push(ValidationError::new(
            "mail.address_count",
            format!(
                "Must be between 1 and {}, got {}",
                MAX_ADDRESSES, config.address_count
            ),
        ));
    }

    if config.message_capacity == 0 {
        errors.push(ValidationError::new(
            "mail.message_capacity",
            "Must be greater than 0",
        ));
    }

    // Slot indices are u32
    if u32::try_from(config.message_capacity).is_err() {
        errors.push(ValidationError::new(
            "mail.message_capacity",
            format!("Must be at most {}", u32::MAX),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_stress_config(config: &StressConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.producers == 0 {
        errors.push(ValidationError::new(
            "stress.producers",
            "At least one producer is required",
        ));
    }

    if config.consumers == 0 {
        errors.push(ValidationError::new(
            "stress.consumers",
            "At least one consumer is required",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn into_config_error(errors: Vec<ValidationError>) -> MsgPassError {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    MsgPassError::Config(format!(
        "Configuration validation failed:\n  - {}",
        messages.join("\n  - ")
    ))
}

/// Validate and convert to a crate error
pub fn validate_config_result(config: &MsgPassConfig) -> crate::Result<()> {
    validate_config(config).map_err(into_config_error)
}

/// Validate mailbox sizing and convert to a crate error
pub fn validate_mail_config_result(config: &MailConfig) -> crate::Result<()> {
    validate_mail_config(config).map_err(into_config_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&MsgPassConfig::new()).is_ok());
    }

    #[test]
    fn test_address_count_bounds() {
        let mut config = MsgPassConfig::new();

        config.mail.address_count = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "mail.address_count");

        config.mail.address_count = 257;
        assert!(validate_config(&config).is_err());

        config.mail.address_count = 256;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_capacity() {
        let mut config = MsgPassConfig::new();
        config.mail.message_capacity = 0;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "mail.message_capacity"));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = MsgPassConfig::new();
        config.mail.address_count = 0;
        config.mail.message_capacity = 0;
        config.stress.producers = 0;
        config.stress.consumers = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_result_message() {
        let mut config = MsgPassConfig::new();
        config.stress.consumers = 0;

        let err = validate_config_result(&config).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Configuration validation failed"));
        assert!(text.contains("stress.consumers"));
    }
}
