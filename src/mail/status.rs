//! Mailbox operation outcomes
//!
//! Every public mailbox operation reports failure as a [`MailError`] value.
//! Callers that want the flat numeric status surface can map any result onto
//! a [`Status`].

use super::{Address, MessageHandle};
use serde_repr::{Deserialize_repr, Serialize_repr};
use thiserror::Error;

/// Mailbox errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailError {
    #[error("invalid address {address}: valid addresses are #0..#{}", .limit.saturating_sub(1))]
    InvalidAddress { address: Address, limit: u16 },

    #[error("invalid message handle {0}: null or already deleted")]
    InvalidHandle(MessageHandle),

    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("mailbox {0} is empty")]
    QueueEmpty(Address),

    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}

impl MailError {
    /// Numeric status for this error
    pub fn status(&self) -> Status {
        Status::from(self)
    }

    /// True for the normal "nothing to receive" signal
    pub fn is_empty(&self) -> bool {
        matches!(self, MailError::QueueEmpty(_))
    }
}

/// Result type for mailbox operations
pub type Result<T> = std::result::Result<T, MailError>;

/// Flat status code for a mailbox operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Status {
    Success = 0,
    InvalidHandle = 1,
    InvalidAddress = 2,
    AllocationFailure = 3,
    QueueEmpty = 4,
    PayloadTooLarge = 5,
}

impl Status {
    /// Status of an arbitrary mailbox result
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::InvalidHandle => "invalid_handle",
            Status::InvalidAddress => "invalid_address",
            Status::AllocationFailure => "allocation_failure",
            Status::QueueEmpty => "queue_empty",
            Status::PayloadTooLarge => "payload_too_large",
        }
    }
}

impl From<&MailError> for Status {
    fn from(err: &MailError) -> Self {
        match err {
            MailError::InvalidAddress { .. } => Status::InvalidAddress,
            MailError::InvalidHandle(_) => Status::InvalidHandle,
            MailError::AllocationFailure(_) => Status::AllocationFailure,
            MailError::QueueEmpty(_) => Status::QueueEmpty,
            MailError::PayloadTooLarge { .. } => Status::PayloadTooLarge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let ok: Result<()> = Ok(());
        assert_eq!(Status::of(&ok), Status::Success);

        let empty: Result<()> = Err(MailError::QueueEmpty(Address::new(1)));
        assert_eq!(Status::of(&empty), Status::QueueEmpty);
        assert!(empty.unwrap_err().is_empty());

        let bad = MailError::InvalidAddress {
            address: Address::new(40),
            limit: 32,
        };
        assert_eq!(bad.status(), Status::InvalidAddress);
        assert!(!bad.status().is_success());
    }

    #[test]
    fn test_status_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Status::Success).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Status::QueueEmpty).unwrap(), "4");

        let parsed: Status = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, Status::InvalidAddress);
    }

    #[test]
    fn test_error_messages() {
        let err = MailError::InvalidAddress {
            address: Address::new(32),
            limit: 32,
        };
        assert_eq!(
            err.to_string(),
            "invalid address #32: valid addresses are #0..#31"
        );

        let err = MailError::InvalidHandle(MessageHandle::NULL);
        assert!(err.to_string().contains("null"));
    }
}
