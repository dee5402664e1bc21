//! Concurrent mailboxes
//!
//! Message registry, per-address FIFOs and the Postmaster that coordinates
//! them.
//!
//! # Overview
//!
//! - **Registry**: owns every message from `new_message` to `delete_message`
//! - **Mailboxes**: one FIFO of message handles per address
//! - **Postmaster**: the public API over both
//!
//! A message is never owned by a mailbox. Sending files a handle, receiving
//! consumes that handle's entry, and deleting the message strips every entry
//! still pointing at it before the payload is freed.
//!
//! # Addressing
//!
//! Addresses are integers in `[0, N)`; `N` comes from
//! [`MailConfig`](crate::config::MailConfig) and defaults to 32.

mod address;
mod mailbox;
mod message;
mod postmaster;
mod registry;
mod status;

pub use address::{Address, AddressError, AddressSpace, DEFAULT_ADDRESSES, MAX_ADDRESSES};
pub use mailbox::{Entry, Mailboxes};
pub use message::{MessageHandle, Payload, MAX_PAYLOAD};
pub use postmaster::{MailStats, Postmaster};
pub use registry::{Liveness, Registry};
pub use status::{MailError, Result, Status};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// No critical section in this module can panic half way through a mutation,
// so a poisoned lock still guards consistent data.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}
