//! Message handles and payload storage
//!
//! Messages live in the [`Registry`](super::Registry) arena and are referred
//! to everywhere else by a [`MessageHandle`]: a slot index plus the generation
//! the slot carried when the message was created. Reusing a slot bumps its
//! generation, so a handle to a deleted message can never alias its successor.

use super::{MailError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum payload length in bytes
pub const MAX_PAYLOAD: usize = 255;

/// Generation-checked reference to a registered message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    slot: u32,
    generation: u64,
}

impl MessageHandle {
    /// The null handle; never refers to a message
    pub const NULL: MessageHandle = MessageHandle {
        slot: 0,
        generation: 0,
    };

    pub(crate) fn new(slot: u32, generation: u64) -> Self {
        debug_assert!(generation != 0, "generation 0 is reserved for NULL");
        Self { slot, generation }
    }

    pub fn is_null(&self) -> bool {
        self.generation == 0
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot as usize
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for MessageHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "msg-null")
        } else {
            write!(f, "msg-{}v{}", self.slot, self.generation)
        }
    }
}

/// Message body: a zero-initialised buffer of [`MAX_PAYLOAD`] bytes and the
/// number of them in use
#[derive(Clone, PartialEq, Eq)]
pub struct Payload {
    len: u8,
    data: Vec<u8>,
}

impl Payload {
    /// Allocate an empty payload with every byte zeroed
    ///
    /// # Errors
    /// Returns [`MailError::AllocationFailure`] if the buffer cannot be reserved.
    pub fn zeroed() -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(MAX_PAYLOAD)
            .map_err(|e| MailError::AllocationFailure(format!("payload buffer: {}", e)))?;
        data.resize(MAX_PAYLOAD, 0);
        Ok(Self { len: 0, data })
    }

    /// Replace the contents with `bytes`
    ///
    /// Bytes past the new length are zeroed so a shorter write never exposes
    /// the tail of an older one.
    pub fn set(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > MAX_PAYLOAD {
            return Err(MailError::PayloadTooLarge {
                len: bytes.len(),
                max: MAX_PAYLOAD,
            });
        }

        self.data[..bytes.len()].copy_from_slice(bytes);
        self.data[bytes.len()..].fill(0);
        // MAX_PAYLOAD fits in u8
        self.len = bytes.len() as u8;
        Ok(())
    }

    /// Reset to length zero with every byte zeroed
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.len = 0;
    }

    /// Bytes in use
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.len)
            .field("data", &self.as_bytes())
            .finish()
    }
}
