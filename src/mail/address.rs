//! Mailbox addressing
//!
//! Destinations are small unsigned integers drawn from a dense range `[0, N)`
//! that is fixed when the [`Postmaster`](super::Postmaster) is built.
//!
//! # Examples
//!
//! ```
//! use msgpass::mail::{Address, AddressSpace};
//!
//! let addr: Address = "#7".parse().unwrap();
//! assert_eq!(addr.index(), 7);
//!
//! let space = AddressSpace::new(32).unwrap();
//! assert!(space.contains(addr));
//! assert!(!space.contains(Address::new(32)));
//! ```

use super::MailError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest address space a postmaster can be configured with
pub const MAX_ADDRESSES: u16 = 256;

/// Address space used when no configuration says otherwise
pub const DEFAULT_ADDRESSES: u16 = 32;

/// Error type for address parsing and address-space construction
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address format: expected a number like '3' or '#3', got '{0}'")]
    InvalidFormat(String),

    #[error("address cannot be empty")]
    Empty,

    #[error("address space must hold between 1 and {max} mailboxes, got {count}")]
    InvalidSpace { count: u16, max: u16 },
}

/// A mailbox address
///
/// An address is only meaningful relative to an [`AddressSpace`]; constructing
/// one never fails, validation happens when it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(u16);

impl Address {
    /// Create an address from its raw value
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Raw numeric value
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Position of this address's mailbox in the mailbox array
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u16> for Address {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<u8> for Address {
    fn from(value: u8) -> Self {
        Self(u16::from(value))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);

        if digits.is_empty() {
            return Err(AddressError::Empty);
        }

        digits
            .parse::<u16>()
            .map(Self)
            .map_err(|_| AddressError::InvalidFormat(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The fixed range of valid addresses, `[0, count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSpace {
    count: u16,
}

impl AddressSpace {
    /// Create an address space holding `count` mailboxes
    ///
    /// # Errors
    /// Returns an error if `count` is zero or larger than [`MAX_ADDRESSES`].
    pub fn new(count: u16) -> Result<Self, AddressError> {
        if count == 0 || count > MAX_ADDRESSES {
            return Err(AddressError::InvalidSpace {
                count,
                max: MAX_ADDRESSES,
            });
        }
        Ok(Self { count })
    }

    /// Number of addresses in the space
    pub fn len(&self) -> usize {
        usize::from(self.count)
    }

    /// Always false; an address space holds at least one mailbox
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check whether `address` falls inside the space
    pub fn contains(&self, address: Address) -> bool {
        address.0 < self.count
    }

    /// Validate `address`, returning its mailbox index
    pub fn check(&self, address: Address) -> Result<usize, MailError> {
        if self.contains(address) {
            Ok(address.index())
        } else {
            Err(MailError::InvalidAddress {
                address,
                limit: self.count,
            })
        }
    }

    /// All addresses in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Address> {
        (0..self.count).map(Address)
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self {
            count: DEFAULT_ADDRESSES,
        }
    }
}
