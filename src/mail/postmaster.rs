//! Postmaster - the public mailbox API
//!
//! Ties the [`Registry`] and the [`Mailboxes`] together behind four core
//! operations: [`new_message`](Postmaster::new_message),
//! [`delete_message`](Postmaster::delete_message), [`send`](Postmaster::send)
//! and [`recv`](Postmaster::recv). A `Postmaster` is `Sync`; share it between
//! threads with `Arc` or scoped borrows.
//!
//! # Lock order
//!
//! 1. registry lock (create, delete, bulk teardown)
//! 2. mailbox locks, one at a time, ascending address
//! 3. payload lock of a single message
//!
//! `send` and `recv` take a single mailbox lock and read the message's atomic
//! generation word; they never touch the registry lock.
//!
//! # Example
//!
//! ```
//! use msgpass::mail::{Address, MailError, Postmaster};
//!
//! let postmaster = Postmaster::default();
//!
//! let msg = postmaster.new_message().unwrap();
//! postmaster.write_payload(msg, b"ping").unwrap();
//! postmaster.send(Address::new(1), msg).unwrap();
//!
//! let received = postmaster.recv(Address::new(1)).unwrap();
//! assert_eq!(postmaster.payload(received).unwrap().as_bytes(), b"ping");
//! assert!(matches!(postmaster.recv(Address::new(1)), Err(MailError::QueueEmpty(_))));
//!
//! postmaster.delete_message(msg).unwrap();
//! ```

use super::{
    Address, AddressSpace, Liveness, MailError, Mailboxes, MessageHandle, Payload, Registry,
    Result, Status,
};
use crate::config::MailConfig;
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Point-in-time view of a postmaster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailStats {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Number of addresses
    pub address_count: usize,
    /// Maximum number of simultaneously live messages
    pub capacity: usize,
    /// Messages created and not yet deleted
    pub live_messages: usize,
    /// Entries pending across all mailboxes
    pub pending_total: usize,
    /// Entries pending per address, ascending
    pub pending: Vec<usize>,
}

/// The mailbox facility
#[derive(Debug)]
pub struct Postmaster {
    registry: Registry,
    mailboxes: Mailboxes,
}

impl Default for Postmaster {
    fn default() -> Self {
        Self::build(AddressSpace::default(), MailConfig::default().message_capacity)
    }
}

impl Postmaster {
    /// Create a postmaster with one mailbox per address in `space` and room
    /// for `capacity` live messages
    ///
    /// # Errors
    /// Returns a configuration error if `capacity` is zero or exceeds the
    /// slot index range (`u32::MAX`).
    pub fn new(space: AddressSpace, capacity: usize) -> crate::Result<Self> {
        let config = MailConfig {
            // AddressSpace holds at most MAX_ADDRESSES, which fits in u16
            address_count: space.len() as u16,
            message_capacity: capacity,
        };
        config.validate()?;
        Ok(Self::build(space, capacity))
    }

    /// Create a postmaster from validated configuration
    pub fn from_config(config: &MailConfig) -> crate::Result<Self> {
        config.validate()?;
        let space = AddressSpace::new(config.address_count)?;
        Ok(Self::build(space, config.message_capacity))
    }

    fn build(space: AddressSpace, capacity: usize) -> Self {
        debug!(addresses = space.len(), capacity, "creating postmaster");
        Self {
            registry: Registry::new(capacity),
            mailboxes: Mailboxes::new(space),
        }
    }

    pub fn address_space(&self) -> AddressSpace {
        self.mailboxes.space()
    }

    pub fn capacity(&self) -> usize {
        self.registry.capacity()
    }

    /// Create a zero-length, zero-filled message
    ///
    /// # Errors
    /// [`MailError::AllocationFailure`] if no message can be allocated.
    pub fn new_message(&self) -> Result<MessageHandle> {
        match self.registry.create() {
            Ok(handle) => {
                metrics::record_created();
                debug!(%handle, "new message");
                Ok(handle)
            }
            Err(e) => {
                warn!(error = %e, "failed to create message");
                Err(e)
            }
        }
    }

    /// Delete a message, first removing every pending entry that refers to it
    ///
    /// A message may be deleted whether it was delivered zero, one or many
    /// times. Once this returns, no mailbox will ever yield `handle` again.
    ///
    /// # Errors
    /// [`MailError::InvalidHandle`] for a null or already-deleted handle; the
    /// call is then a no-op.
    pub fn delete_message(&self, handle: MessageHandle) -> Result<()> {
        if handle.is_null() {
            warn!("delete_message called with a null handle");
            return Err(MailError::InvalidHandle(handle));
        }

        match self
            .registry
            .destroy(handle, |h| self.mailboxes.purge(h))
        {
            Ok(purged) => {
                metrics::record_deleted(purged);
                info!(%handle, purged, "deleted message");
                Ok(())
            }
            Err(e) => {
                warn!(%handle, error = %e, "delete_message rejected");
                Err(e)
            }
        }
    }

    /// Queue `handle` for delivery to `destination`
    ///
    /// The same message may be sent any number of times to the same or other
    /// addresses; each send creates an independent entry. No receiver needs to
    /// exist yet.
    ///
    /// # Errors
    /// [`MailError::InvalidAddress`], [`MailError::InvalidHandle`] or
    /// [`MailError::AllocationFailure`]; nothing is queued on error.
    pub fn send(&self, destination: Address, handle: MessageHandle) -> Result<()> {
        let result = self.mailboxes.enqueue(destination, handle, &self.registry);
        metrics::record_send(Status::of(&result));
        match &result {
            Ok(()) => debug!(%destination, %handle, "sent"),
            Err(e) => warn!(%destination, %handle, error = %e, "send rejected"),
        }
        result
    }

    /// Take the oldest pending message for `receiver`
    ///
    /// Never blocks. The returned message stays registered; only the mailbox
    /// entry is consumed.
    ///
    /// # Errors
    /// [`MailError::QueueEmpty`] when nothing is pending,
    /// [`MailError::InvalidAddress`] for an out-of-range receiver.
    pub fn recv(&self, receiver: Address) -> Result<MessageHandle> {
        let result = self.mailboxes.dequeue(receiver, &self.registry);
        metrics::record_recv(Status::of(&result));
        match &result {
            Ok(handle) => debug!(%receiver, %handle, "received"),
            Err(MailError::QueueEmpty(_)) => {}
            Err(e) => warn!(%receiver, error = %e, "recv rejected"),
        }
        result
    }

    /// Send `handle` to each of `destinations`
    ///
    /// Every address is validated before anything is queued. Returns the number
    /// of entries queued. If the message is deleted part way through, the
    /// entries already queued are removed by that delete and
    /// [`MailError::InvalidHandle`] is returned.
    pub fn fan_out(&self, destinations: &[Address], handle: MessageHandle) -> Result<usize> {
        let space = self.address_space();
        for &destination in destinations {
            if let Err(e) = space.check(destination) {
                warn!(%destination, %handle, error = %e, "fan_out rejected");
                return Err(e);
            }
        }

        for &destination in destinations {
            self.send(destination, handle)?;
        }
        Ok(destinations.len())
    }

    /// Replace a live message's payload
    pub fn write_payload(&self, handle: MessageHandle, bytes: &[u8]) -> Result<()> {
        self.registry.write(handle, bytes)
    }

    /// Copy of a live message's payload
    pub fn payload(&self, handle: MessageHandle) -> Result<Payload> {
        self.registry.read(handle)
    }

    /// Borrow a live message's payload for the duration of `f`
    ///
    /// `f` runs under the message's payload read lock. Use
    /// [`payload`](Self::payload) for a copy that holds no lock.
    ///
    /// # Deadlocks
    /// Calling [`delete_message`](Self::delete_message) or
    /// [`write_payload`](Self::write_payload) for the same handle from inside
    /// `f` deadlocks, as does anything else that waits on a thread doing so.
    pub fn with_payload<R, F>(&self, handle: MessageHandle, f: F) -> Result<R>
    where
        F: FnOnce(&Payload) -> R,
    {
        self.registry.with_payload(handle, f)
    }

    /// Whether `handle` still refers to a registered message
    pub fn is_live(&self, handle: MessageHandle) -> bool {
        self.registry.is_live(handle)
    }

    /// Handles of every registered message
    pub fn live_messages(&self) -> Vec<MessageHandle> {
        self.registry.live_handles()
    }

    /// Entries pending for `address`
    pub fn pending(&self, address: Address) -> Result<usize> {
        self.mailboxes.pending(address)
    }

    /// Snapshot of message and mailbox counts
    pub fn stats(&self) -> MailStats {
        let pending = self.mailboxes.depths();
        MailStats {
            taken_at: Utc::now(),
            address_count: self.address_space().len(),
            capacity: self.capacity(),
            live_messages: self.registry.live_count(),
            pending_total: pending.iter().sum(),
            pending,
        }
    }

    /// Delete every message and empty every mailbox
    ///
    /// Returns the number of messages deleted.
    pub fn clear(&self) -> usize {
        let mut purged = 0;
        let deleted = self
            .registry
            .destroy_all(|| purged = self.mailboxes.clear());
        metrics::record_cleared(deleted, purged);
        if deleted > 0 {
            info!(deleted, purged, "cleared postmaster");
        }
        deleted
    }
}

impl Drop for Postmaster {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_postmaster() -> Postmaster {
        Postmaster::new(AddressSpace::new(4).unwrap(), 8).unwrap()
    }

    #[test]
    fn test_send_and_receive() {
        let postmaster = create_test_postmaster();
        let msg = postmaster.new_message().unwrap();
        postmaster.write_payload(msg, b"Hello!").unwrap();

        postmaster.send(Address::new(2), msg).unwrap();
        assert_eq!(postmaster.pending(Address::new(2)), Ok(1));

        let received = postmaster.recv(Address::new(2)).unwrap();
        assert_eq!(received, msg);
        assert_eq!(postmaster.payload(received).unwrap().as_bytes(), b"Hello!");

        // Delivery does not delete
        assert!(postmaster.is_live(msg));
    }

    #[test]
    fn test_delete_purges_pending_entries() {
        let postmaster = create_test_postmaster();
        let msg = postmaster.new_message().unwrap();
        let other = postmaster.new_message().unwrap();

        postmaster.send(Address::new(0), msg).unwrap();
        postmaster.send(Address::new(0), other).unwrap();
        postmaster.send(Address::new(0), msg).unwrap();
        postmaster.send(Address::new(3), msg).unwrap();

        postmaster.delete_message(msg).unwrap();

        assert_eq!(postmaster.stats().pending, vec![1, 0, 0, 0]);
        assert_eq!(postmaster.recv(Address::new(0)), Ok(other));
        assert_eq!(
            postmaster.recv(Address::new(3)),
            Err(MailError::QueueEmpty(Address::new(3)))
        );
    }

    #[test]
    fn test_send_after_delete_is_rejected() {
        let postmaster = create_test_postmaster();
        let msg = postmaster.new_message().unwrap();
        postmaster.delete_message(msg).unwrap();

        assert_eq!(
            postmaster.send(Address::new(1), msg),
            Err(MailError::InvalidHandle(msg))
        );
        assert_eq!(
            postmaster.delete_message(msg),
            Err(MailError::InvalidHandle(msg))
        );
    }

    #[test]
    fn test_fan_out_validates_every_address_first() {
        let postmaster = create_test_postmaster();
        let msg = postmaster.new_message().unwrap();

        let result = postmaster.fan_out(&[Address::new(0), Address::new(9)], msg);
        assert!(matches!(result, Err(MailError::InvalidAddress { .. })));
        assert_eq!(postmaster.stats().pending_total, 0);

        let sent = postmaster
            .fan_out(&[Address::new(0), Address::new(1), Address::new(2)], msg)
            .unwrap();
        assert_eq!(sent, 3);
        assert_eq!(postmaster.stats().pending, vec![1, 1, 1, 0]);
    }

    #[test]
    fn test_stats() {
        let postmaster = create_test_postmaster();
        let msg = postmaster.new_message().unwrap();
        postmaster.send(Address::new(1), msg).unwrap();

        let stats = postmaster.stats();
        assert_eq!(stats.address_count, 4);
        assert_eq!(stats.capacity, 8);
        assert_eq!(stats.live_messages, 1);
        assert_eq!(stats.pending_total, 1);

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"live_messages\":1"));
    }

    #[test]
    fn test_clear() {
        let postmaster = create_test_postmaster();
        let a = postmaster.new_message().unwrap();
        let b = postmaster.new_message().unwrap();
        postmaster.send(Address::new(0), a).unwrap();
        postmaster.send(Address::new(1), b).unwrap();

        assert_eq!(postmaster.clear(), 2);
        assert!(postmaster.live_messages().is_empty());
        assert_eq!(postmaster.stats().pending_total, 0);
        assert!(!postmaster.is_live(a));
    }

    #[test]
    fn test_new_rejects_out_of_range_capacity() {
        let space = AddressSpace::new(4).unwrap();

        let err = Postmaster::new(space, 0).unwrap_err();
        assert!(err.to_string().contains("mail.message_capacity"));

        #[cfg(target_pointer_width = "64")]
        {
            let too_many = u32::MAX as usize + 1;
            let err = Postmaster::new(space, too_many).unwrap_err();
            assert!(err.to_string().contains("mail.message_capacity"));
        }

        assert!(Postmaster::new(space, 1).is_ok());
    }

    #[test]
    fn test_capacity_caps_live_messages() {
        let config = MailConfig {
            address_count: 2,
            message_capacity: 2,
        };
        let postmaster = Postmaster::from_config(&config).unwrap();
        let first = postmaster.new_message().unwrap();
        postmaster.new_message().unwrap();

        match postmaster.new_message() {
            Err(MailError::AllocationFailure(reason)) => assert!(reason.contains("registry full")),
            other => panic!("expected allocation failure, got {:?}", other),
        }

        postmaster.delete_message(first).unwrap();
        assert!(postmaster.new_message().is_ok());
    }

    #[test]
    fn test_with_payload_reads_other_messages() {
        let postmaster = create_test_postmaster();
        let a = postmaster.new_message().unwrap();
        let b = postmaster.new_message().unwrap();
        postmaster.write_payload(a, b"outer").unwrap();
        postmaster.write_payload(b, b"inner").unwrap();

        let (outer, inner) = postmaster
            .with_payload(a, |p| (p.len(), postmaster.payload(b).unwrap().len()))
            .unwrap();
        assert_eq!((outer, inner), (5, 5));

        // The lock is released once the closure returns
        postmaster.write_payload(a, b"again").unwrap();
        postmaster.delete_message(a).unwrap();
    }

    #[test]
    fn test_from_config() {
        let config = MailConfig {
            address_count: 8,
            message_capacity: 16,
        };
        let postmaster = Postmaster::from_config(&config).unwrap();
        assert_eq!(postmaster.address_space().len(), 8);
        assert_eq!(postmaster.capacity(), 16);

        let bad = MailConfig {
            address_count: 0,
            message_capacity: 16,
        };
        assert!(Postmaster::from_config(&bad).is_err());
    }
}
